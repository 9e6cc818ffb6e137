//! HTTP Request Serialization
use bytes::{BufMut, Bytes, BytesMut};

use crate::headers::HeaderMap;
use crate::http::{Method, Version};

/// Write the request line and header block, including the terminating empty line.
///
/// Header names are written in title case, e.g: `content-length` as `Content-Length`.
pub fn encode_head(method: Method, target: &str, headers: &HeaderMap) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + headers.len() * 32);

    buf.put_slice(method.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(target.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(Version::HTTP_11.as_str().as_bytes());
    buf.put_slice(b"\r\n");

    for field in headers {
        put_title_case(&mut buf, field.name().as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(field.value().as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Returns the decimal representation of `len`, for `Content-Length`.
pub fn content_length(len: u64) -> String {
    itoa::Buffer::new().format(len).to_owned()
}

fn put_title_case(buf: &mut BytesMut, name: &[u8]) {
    let mut upper = true;
    for &b in name {
        buf.put_u8(if upper { b.to_ascii_uppercase() } else { b });
        upper = b == b'-';
    }
}

#[cfg(test)]
mod test {
    use super::encode_head;
    use crate::headers::HeaderMap;
    use crate::http::Method;

    #[test]
    fn encode_request_head() {
        let headers: HeaderMap = [("host", "example.com"), ("x-www-thing", "1")].into_iter().collect();
        let head = encode_head(Method::GET, "/a?b=c", &headers);
        assert_eq!(
            &head[..],
            b"GET /a?b=c HTTP/1.1\r\nHost: example.com\r\nX-Www-Thing: 1\r\n\r\n"
        );
    }
}
