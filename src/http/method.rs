/// HTTP Method.
///
/// Only the methods of [RFC9110] and PATCH from [RFC5789] are supported.
///
/// [RFC5789]: https://www.rfc-editor.org/rfc/rfc5789
/// [RFC9110]: <https://www.rfc-editor.org/rfc/rfc9110.html#name-methods>
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Method(u8);

struct Props {
    value: &'static [u8],
    /// An empty request body must still be announced with `Content-Length: 0`.
    announce_empty: bool,
}

props! {
    static PROPS: [9];

    /// [GET](https://www.rfc-editor.org/rfc/rfc9110.html#name-get)
    pub const GET = (0, b"GET", );
    /// [HEAD](https://www.rfc-editor.org/rfc/rfc9110.html#name-head), the response never carries
    /// content.
    pub const HEAD = (1, b"HEAD", );
    /// [POST](https://www.rfc-editor.org/rfc/rfc9110.html#name-post)
    pub const POST = (2, b"POST", announce);
    /// [PUT](https://www.rfc-editor.org/rfc/rfc9110.html#name-put)
    pub const PUT = (3, b"PUT", announce);
    /// [DELETE](https://www.rfc-editor.org/rfc/rfc9110.html#name-delete)
    pub const DELETE = (4, b"DELETE", );
    /// [CONNECT](https://www.rfc-editor.org/rfc/rfc9110.html#name-connect)
    pub const CONNECT = (5, b"CONNECT", );
    /// [OPTIONS](https://www.rfc-editor.org/rfc/rfc9110.html#name-options)
    pub const OPTIONS = (6, b"OPTIONS", );
    /// [TRACE](https://www.rfc-editor.org/rfc/rfc9110.html#name-trace)
    pub const TRACE = (7, b"TRACE", );
    /// [PATCH](https://www.rfc-editor.org/rfc/rfc5789#section-2)
    pub const PATCH = (8, b"PATCH", );
}

impl Method {
    /// Returns string representation of the method.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match std::str::from_utf8(PROPS[self.0 as usize].value) {
            Ok(ok) => ok,
            Err(_) => unreachable!(),
        }
    }

    #[inline]
    pub(crate) const fn as_bytes(&self) -> &'static [u8] {
        PROPS[self.0 as usize].value
    }

    /// Returns `true` if an empty body must be sent with explicit `Content-Length: 0`.
    #[inline]
    pub const fn announces_empty_body(&self) -> bool {
        PROPS[self.0 as usize].announce_empty
    }
}

impl std::str::FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Method::from_bytes(upper.as_bytes()).ok_or(UnknownMethod)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMethod;

impl std::error::Error for UnknownMethod {}

impl std::fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unknown method")
    }
}

macro_rules! props {
    (
        static $props:ident: [$len:literal];
        $(
           $(#[$doc:meta])*
           pub const $name:ident = ($idx:literal, $val:literal, $($announce:ident)?);
        )*
    ) => {
        impl Method {
            $(
               $(#[$doc])*
               pub const $name: Self = Self($idx);
            )*

            /// Create [`Method`] from bytes.
            #[inline]
            pub const fn from_bytes(src: &[u8]) -> Option<Method> {
                match src {
                    $(
                        $val => Some(Self::$name),
                    )*
                    _ => None,
                }
            }
        }

        static $props: [Props; $len] = [
            $(
                Props { value: $val, announce_empty: prop!($($announce)?) },
            )*
        ];
    };
}

macro_rules! prop {
    (announce) => { true };
    () => { false };
}

use {props, prop};

#[cfg(test)]
mod test {
    use super::Method;

    #[test]
    fn parse_method() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::GET);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::PATCH);
        assert!("BREW".parse::<Method>().is_err());
        assert_eq!(Method::OPTIONS.as_str(), "OPTIONS");
        assert!(Method::POST.announces_empty_body());
        assert!(Method::PUT.announces_empty_body());
        assert!(!Method::GET.announces_empty_body());
    }
}
