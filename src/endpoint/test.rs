use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use super::machine::{Action, Machine};
use super::{Endpoint, EndpointConfig};
use crate::auth::Credentials;
use crate::body::Payload;
use crate::cookie::CookieJar;
use crate::error::{CloseReason, Error};
use crate::http::{Method, Target};
use crate::proto::ParseError;
use crate::request::{Request, RequestOptions};
use crate::response::{Response, ResponseFuture};

// ===== Machine =====

struct Harness {
    machine: Machine,
    config: EndpointConfig,
    target: Target,
    jar: CookieJar,
    /// Every written header block.
    written: Vec<String>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    fn with_config(config: EndpointConfig) -> Self {
        let jar = CookieJar::new();
        Self {
            machine: Machine::new(jar.clone(), config.pipeline_limit),
            config,
            target: Target::parse("http://example.com").unwrap(),
            jar,
            written: Vec::new(),
        }
    }

    fn submit(&mut self, method: Method, options: RequestOptions) -> ResponseFuture {
        let (request, future) =
            Request::new(&self.config, &self.target, method, options).unwrap();
        self.machine.submit(request);
        future
    }

    fn get(&mut self, path: &str) -> ResponseFuture {
        self.submit(Method::GET, RequestOptions::new().path(path))
    }

    fn pipelined(&mut self, path: &str) -> ResponseFuture {
        self.submit(Method::GET, RequestOptions::new().path(path).pipeline(true))
    }

    /// Drain queued actions, except timer ones.
    fn actions(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(action) = self.machine.poll_action() {
            match action {
                Action::Connect { id } => out.push(format!("connect {id}")),
                Action::Write { id, head, .. } => {
                    let head = String::from_utf8(head.to_vec()).unwrap();
                    let line = head.lines().next().unwrap();
                    let line = line.strip_suffix(" HTTP/1.1").unwrap();
                    out.push(format!("write {id} {line}"));
                    self.written.push(head);
                }
                Action::Close { id, after_writing: true } => {
                    out.push(format!("close {id} after writing"))
                }
                Action::Close { id, after_writing: false } => out.push(format!("close {id}")),
                Action::ArmTimer | Action::DisarmTimer => {}
            }
        }
        out
    }

    /// Connect and drain actions.
    fn connect(&mut self, id: u64) -> Vec<String> {
        self.machine.on_connect(id);
        self.actions()
    }

    fn read(&mut self, id: u64, data: &[u8]) -> Vec<String> {
        self.machine.on_read(id, data);
        self.actions()
    }

    fn close(&mut self, id: u64, reason: CloseReason) -> Vec<String> {
        self.machine.on_close(id, reason);
        self.actions()
    }
}

fn outcome(future: &mut ResponseFuture) -> Option<Result<Response, Error>> {
    future.rx.try_recv().ok()
}

fn ok(future: &mut ResponseFuture) -> Response {
    match outcome(future) {
        Some(Ok(res)) => res,
        Some(Err(err)) => panic!("request failed: {err}"),
        None => panic!("request is not settled"),
    }
}

fn err(future: &mut ResponseFuture) -> Error {
    match outcome(future) {
        Some(Ok(res)) => panic!("request succeeded with {}", res.status()),
        Some(Err(err)) => err,
        None => panic!("request is not settled"),
    }
}

const OK_A: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na";
const OK_B: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb";
const OK_C: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nc";

#[test]
fn fifo_without_pipelining() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    let mut c = h.get("/c");

    assert_eq!(h.actions(), ["connect 1"]);
    assert_eq!(h.connect(1), ["write 1 GET /a"]);
    assert!(outcome(&mut b).is_none());

    assert_eq!(h.read(1, OK_A), ["write 1 GET /b"]);
    assert!(h.read(1, b"HTTP/1.1 200 OK\r\nContent-Le").is_empty());
    assert_eq!(h.read(1, b"ngth: 1\r\n\r\nb"), ["write 1 GET /c"]);
    assert!(h.read(1, OK_C).is_empty());

    assert_eq!(ok(&mut a).body().as_ref(), b"a");
    assert_eq!(ok(&mut b).body().as_ref(), b"b");
    assert_eq!(ok(&mut c).body().as_ref(), b"c");
    assert_eq!(h.machine.outstanding(), 0);
}

#[test]
fn keep_alive_reuse() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    assert_eq!(h.actions(), ["connect 1"]);
    assert_eq!(h.connect(1), ["write 1 GET /a"]);
    h.read(1, b"HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nContent-Length: 1\r\n\r\na");
    assert!(ok(&mut a).keep_alive());

    let mut b = h.get("/b");
    assert_eq!(h.actions(), ["write 1 GET /b"]);
    assert!(h.read(1, OK_B).is_empty());
    assert_eq!(ok(&mut b).text(), "b");
}

#[test]
fn pipelining() {
    let mut h = Harness::with_config(EndpointConfig {
        pipeline_limit: 2,
        ..Default::default()
    });
    let mut a = h.pipelined("/a");
    let mut b = h.pipelined("/b");
    let mut c = h.pipelined("/c");

    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /a", "write 1 GET /b"]);
    assert_eq!(h.read(1, OK_A), ["write 1 GET /c"]);

    let mut both = OK_B.to_vec();
    both.extend_from_slice(OK_C);
    assert!(h.read(1, &both).is_empty());

    assert_eq!(ok(&mut a).text(), "a");
    assert_eq!(ok(&mut b).text(), "b");
    assert_eq!(ok(&mut c).text(), "c");
}

#[test]
fn no_pipelining_after_plain_request() {
    let mut h = Harness::new();
    let _a = h.get("/a");
    let _b = h.pipelined("/b");
    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /a"]);
    assert_eq!(h.read(1, OK_A), ["write 1 GET /b"]);
}

#[test]
fn connection_close_reconnects() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    h.actions();
    h.connect(1);

    let actions = h.read(1, b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 1\r\n\r\na");
    assert_eq!(actions, ["close 1 after writing"]);
    assert!(!ok(&mut a).keep_alive());
    assert!(outcome(&mut b).is_none());

    assert_eq!(h.close(1, CloseReason::Local), ["connect 2"]);
    assert_eq!(h.connect(2), ["write 2 GET /b"]);

    // HTTP/1.0 defaults to close
    let actions = h.read(2, b"HTTP/1.0 200 OK\r\nContent-Length: 1\r\n\r\nb");
    assert_eq!(actions, ["close 2 after writing"]);
    assert_eq!(ok(&mut b).text(), "b");
    assert!(h.close(2, CloseReason::Local).is_empty());
}

#[test]
fn request_without_keepalive() {
    let mut h = Harness::new();
    let mut a = h.submit(Method::GET, RequestOptions::new().keepalive(false));
    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /"]);
    assert!(h.written[0].contains("\r\nConnection: close\r\n"));

    assert_eq!(h.read(1, OK_A), ["close 1 after writing"]);
    assert_eq!(ok(&mut a).text(), "a");
}

#[test]
fn digest_retry() {
    let mut h = Harness::new();
    let options = RequestOptions::new()
        .path("/secret")
        .credentials(Credentials::digest("Mufasa", "Circle Of Life"));
    let mut a = h.submit(Method::GET, options);
    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /secret"]);
    assert!(!h.written[0].contains("Authorization"));

    let challenge = b"HTTP/1.1 401 Unauthorized\r\n\
        WWW-Authenticate: Digest realm=\"x\",qop=\"auth\",nonce=\"n\"\r\n\
        Content-Length: 6\r\n\r\ndenied";
    assert_eq!(h.read(1, challenge), ["write 1 GET /secret"]);
    assert!(outcome(&mut a).is_none());
    assert!(h.written[1].contains(
        "\r\nAuthorization: Digest username=\"Mufasa\", realm=\"x\", nonce=\"n\", uri=\"/secret\""
    ));
    assert!(h.written[1].contains("qop=auth, nc=00000001"));

    assert!(h.read(1, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi").is_empty());
    let res = ok(&mut a);
    assert_eq!(res.status(), 200);
    assert_eq!(res.text(), "hi");
    assert_eq!(h.written.len(), 2);
}

#[test]
fn digest_retry_exactly_once() {
    let mut h = Harness::new();
    let options = RequestOptions::new().credentials(Credentials::digest("u", "wrong"));
    let mut a = h.submit(Method::GET, options);
    h.actions();
    h.connect(1);

    let challenge = b"HTTP/1.1 401 Unauthorized\r\n\
        WWW-Authenticate: Digest realm=\"x\", nonce=\"n\"\r\n\
        Content-Length: 0\r\n\r\n";
    assert_eq!(h.read(1, challenge), ["write 1 GET /"]);
    assert!(h.read(1, challenge).is_empty());

    assert_eq!(ok(&mut a).status(), 401);
    assert_eq!(h.written.len(), 2);
}

#[test]
fn auth_retry_on_new_connection() {
    let mut h = Harness::new();
    let options = RequestOptions::new().credentials(Credentials::digest("u", "p"));
    let mut a = h.submit(Method::GET, options);
    h.actions();
    h.connect(1);

    let challenge = b"HTTP/1.1 401 Unauthorized\r\n\
        WWW-Authenticate: Digest realm=\"x\", nonce=\"n\"\r\n\
        Connection: close\r\nContent-Length: 0\r\n\r\n";
    assert_eq!(h.read(1, challenge), ["close 1 after writing"]);
    assert_eq!(h.close(1, CloseReason::Local), ["connect 2"]);
    assert_eq!(h.connect(2), ["write 2 GET /"]);
    assert!(h.written[1].contains("\r\nAuthorization: Digest username=\"u\""));

    h.read(2, OK_A);
    assert_eq!(ok(&mut a).status(), 200);
}

#[test]
fn auth_without_matching_challenge() {
    let mut h = Harness::new();
    let options = RequestOptions::new().credentials(Credentials::digest("u", "p"));
    let mut a = h.submit(Method::GET, options);
    h.actions();
    h.connect(1);

    let challenge = b"HTTP/1.1 401 Unauthorized\r\n\
        WWW-Authenticate: Basic realm=\"x\"\r\nContent-Length: 0\r\n\r\n";
    assert!(h.read(1, challenge).is_empty());
    assert!(matches!(err(&mut a), Error::Auth(_)));
}

#[test]
fn ntlm_negotiates_first() {
    let mut h = Harness::new();
    let options = RequestOptions::new().credentials(Credentials::ntlm("user", "pass", "DOMAIN"));
    let _a = h.submit(Method::GET, options);
    h.actions();
    h.connect(1);
    assert!(h.written[0].contains("\r\nAuthorization: NTLM TlRMTVNTUAAB"));
}

#[test]
fn ntlm_handshake_keeps_connection() {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let mut h = Harness::new();
    let options = RequestOptions::new()
        .keepalive(false)
        .credentials(Credentials::ntlm("user", "pass", "DOMAIN"));
    let mut a = h.submit(Method::GET, options);
    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /"]);
    assert!(!h.written[0].contains("\r\nConnection: close\r\n"));

    let mut type2 = Vec::new();
    type2.extend_from_slice(b"NTLMSSP\0");
    type2.extend_from_slice(&2u32.to_le_bytes());
    type2.extend_from_slice(&[0, 0, 0, 0, 32, 0, 0, 0]);
    type2.extend_from_slice(&1u32.to_le_bytes());
    type2.extend_from_slice(&[7; 8]);
    let challenge = format!(
        "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: NTLM {}\r\nContent-Length: 0\r\n\r\n",
        STANDARD.encode(&type2),
    );

    // the authenticate message follows on the same connection, then asks for close
    assert_eq!(h.read(1, challenge.as_bytes()), ["write 1 GET /"]);
    assert!(h.written[1].contains("\r\nAuthorization: NTLM TlRMTVNTUAAD"));
    assert!(h.written[1].contains("\r\nConnection: close\r\n"));

    assert_eq!(h.read(1, OK_A), ["close 1 after writing"]);
    assert_eq!(ok(&mut a).text(), "a");
}

#[test]
fn timeout_mid_request() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.connect(1);

    h.machine.on_timeout();
    assert_eq!(h.actions(), ["close 1"]);
    assert!(matches!(err(&mut a), Error::Timeout));

    // pending queue is empty, no reconnect
    assert!(h.close(1, CloseReason::Local).is_empty());

    let _b = h.get("/b");
    assert_eq!(h.actions(), ["connect 2"]);
}

#[test]
fn timeout_keeps_queued_requests() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    h.actions();
    h.connect(1);

    h.machine.on_timeout();
    assert_eq!(h.actions(), ["close 1"]);
    assert!(matches!(err(&mut a), Error::Timeout));
    assert!(outcome(&mut b).is_none());

    assert_eq!(h.close(1, CloseReason::Local), ["connect 2"]);
    assert_eq!(h.connect(2), ["write 2 GET /b"]);
}

#[test]
fn timeout_while_connecting() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    assert_eq!(h.actions(), ["connect 1"]);

    h.machine.on_timeout();
    assert_eq!(h.actions(), ["close 1"]);
    assert!(matches!(err(&mut a), Error::Timeout));

    assert_eq!(h.close(1, CloseReason::Local), ["connect 2"]);
    // a late connect of the abandoned connection is ignored
    assert!(h.connect(1).is_empty());
    assert_eq!(h.connect(2), ["write 2 GET /b"]);
    assert!(outcome(&mut b).is_none());
}

#[test]
fn idle_timeout_closes_connection() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.connect(1);
    h.read(1, OK_A);
    ok(&mut a);

    h.machine.on_timeout();
    assert_eq!(h.actions(), ["close 1 after writing"]);
    assert!(h.close(1, CloseReason::Local).is_empty());
}

#[test]
fn connect_failure() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    assert_eq!(h.actions(), ["connect 1"]);

    let refused = CloseReason::Refused("connection refused".to_owned());
    assert_eq!(h.close(1, refused), ["connect 2"]);
    assert!(matches!(err(&mut a), Error::ConnectionRefused(_)));
    assert!(outcome(&mut b).is_none());

    let failure = CloseReason::Failure("failed to resolve".to_owned());
    assert!(h.close(2, failure).is_empty());
    assert!(matches!(err(&mut b), Error::ConnectionFailure(_)));
}

#[test]
fn cancel_all_is_idempotent() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    h.actions();
    h.connect(1);

    h.machine.cancel_all();
    assert_eq!(h.actions(), ["close 1"]);
    assert!(matches!(err(&mut a), Error::Cancelled));
    assert!(matches!(err(&mut b), Error::Cancelled));
    assert_eq!(h.machine.outstanding(), 0);

    h.machine.cancel_all();
    assert!(h.actions().is_empty());
    assert!(outcome(&mut a).is_none());
    assert!(outcome(&mut b).is_none());

    assert!(h.close(1, CloseReason::Local).is_empty());
}

#[test]
fn close_delimited_body() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.connect(1);

    assert!(h.read(1, b"HTTP/1.1 200 OK\r\n\r\nhello ").is_empty());
    assert!(h.read(1, b"world").is_empty());
    assert!(outcome(&mut a).is_none());

    assert!(h.close(1, CloseReason::Eof).is_empty());
    let res = ok(&mut a);
    assert_eq!(res.text(), "hello world");
    assert!(!res.keep_alive());
}

#[test]
fn reset_during_close_delimited_body() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let mut b = h.get("/b");
    h.actions();
    h.connect(1);

    assert!(h.read(1, b"HTTP/1.1 200 OK\r\n\r\ntrunc").is_empty());
    assert_eq!(h.close(1, CloseReason::Reset), ["connect 2"]);
    assert!(matches!(err(&mut a), Error::Reset));

    assert_eq!(h.connect(2), ["write 2 GET /b"]);
    h.read(2, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");
    let broken = CloseReason::Io(std::io::ErrorKind::BrokenPipe, "broken pipe".to_owned());
    assert!(h.close(2, broken).is_empty());
    assert!(matches!(err(&mut b), Error::Io(_)));
}

#[test]
fn truncated_response() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.connect(1);
    h.read(1, b"HTTP/1.1 200 OK\r\nContent-Le");
    h.close(1, CloseReason::Eof);
    assert!(matches!(err(&mut a), Error::PartialResponse));

    let mut b = h.get("/b");
    h.actions();
    h.connect(2);
    h.read(2, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");
    h.close(2, CloseReason::Eof);
    assert!(matches!(err(&mut b), Error::PartialResponse));
}

#[test]
fn disconnect_rejects_in_flight_only() {
    let mut h = Harness::new();
    let mut a = h.pipelined("/a");
    let mut b = h.pipelined("/b");
    let mut c = h.get("/c");
    h.actions();
    assert_eq!(h.connect(1), ["write 1 GET /a", "write 1 GET /b"]);

    assert_eq!(h.close(1, CloseReason::Reset), ["connect 2"]);
    assert!(matches!(err(&mut a), Error::Reset));
    assert!(matches!(err(&mut b), Error::Reset));
    assert!(outcome(&mut c).is_none());
    assert_eq!(h.connect(2), ["write 2 GET /c"]);
}

#[test]
fn malformed_response() {
    let mut h = Harness::new();
    let mut a = h.pipelined("/a");
    let mut b = h.pipelined("/b");
    h.actions();
    h.connect(1);

    assert_eq!(h.read(1, b"HTTP/1.1 2xx OK\r\n\r\n"), ["close 1"]);
    assert!(matches!(err(&mut a), Error::Parse(ParseError::InvalidStatus)));
    assert!(matches!(err(&mut b), Error::Disconnected));

    // remaining bytes are discarded
    assert!(h.read(1, OK_A).is_empty());
}

#[test]
fn unsolicited_response() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.connect(1);
    h.read(1, OK_A);
    ok(&mut a);

    assert_eq!(h.read(1, b"HTTP/1.1 200 OK\r\n"), ["close 1"]);
}

#[test]
fn stale_connection_events() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    h.actions();
    h.close(1, CloseReason::Refused("refused".to_owned()));
    err(&mut a);

    let mut b = h.get("/b");
    assert_eq!(h.actions(), ["connect 2"]);
    assert!(h.read(1, OK_A).is_empty());
    assert!(h.close(1, CloseReason::Eof).is_empty());
    assert_eq!(h.connect(2), ["write 2 GET /b"]);
    h.read(2, OK_B);
    assert_eq!(ok(&mut b).text(), "b");
}

#[test]
fn cookies() {
    let mut h = Harness::new();
    let mut a = h.get("/a");
    let _b = h.get("/b");
    h.actions();
    h.connect(1);

    let res = b"HTTP/1.1 200 OK\r\nSet-Cookie: sid=abc; Path=/\r\nContent-Length: 0\r\n\r\n";
    assert_eq!(h.read(1, res), ["write 1 GET /b"]);

    let res = ok(&mut a);
    assert_eq!(res.cookies().get("sid").map(String::as_str), Some("abc"));
    assert!(!res.headers().contains_key("set-cookie"));
    assert_eq!(h.jar.get("http://example.com/"), ["sid=abc"]);
    assert!(h.written[1].contains("\r\nCookie: sid=abc\r\n"));
}

#[test]
fn head_response_has_no_body() {
    let mut h = Harness::new();
    let mut a = h.submit(Method::HEAD, RequestOptions::new());
    let mut b = h.get("/b");
    h.actions();
    assert_eq!(h.connect(1), ["write 1 HEAD /"]);

    assert_eq!(
        h.read(1, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"),
        ["write 1 GET /b"]
    );
    assert!(ok(&mut a).body().is_empty());
    h.read(1, OK_B);
    assert_eq!(ok(&mut b).text(), "b");
}

// ===== Socket =====

/// Serve every accepted connection with `handler`, which receives each request head and returns
/// the response and whether to close the connection after it.
fn serve(listener: TcpListener, handler: fn(&str) -> Option<(Vec<u8>, bool)>) -> Rc<Cell<usize>> {
    let accepted = Rc::new(Cell::new(0));
    let count = Rc::clone(&accepted);

    tokio::task::spawn_local(async move {
        while let Ok((mut io, _)) = listener.accept().await {
            count.set(count.get() + 1);
            tokio::task::spawn_local(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    while let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8(buf.drain(..end + 4).collect()).unwrap();
                        let Some((response, close)) = handler(&head) else {
                            continue;
                        };
                        if io.write_all(&response).await.is_err() || close {
                            return;
                        }
                    }
                    match io.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => buf.extend_from_slice(&chunk[..read]),
                    }
                }
            });
        }
    });

    accepted
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn reply(body: &str) -> Option<(Vec<u8>, bool)> {
    let res = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}", body.len());
    Some((res.into_bytes(), false))
}

#[tokio::test]
async fn socket_keep_alive() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            let accepted = serve(listener, |head| {
                let path = head.split(' ').nth(1).unwrap_or_default();
                reply(path)
            });

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let a = endpoint.get(RequestOptions::new().path("/one")).await.unwrap();
            let b = endpoint.get(RequestOptions::new().path("/two")).await.unwrap();

            assert_eq!(a.text(), "/one");
            assert_eq!(b.text(), "/two");
            assert_eq!(accepted.get(), 1);
        })
        .await;
}

#[tokio::test]
async fn socket_pipelining() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            let accepted = serve(listener, |head| {
                let path = head.split(' ').nth(1).unwrap_or_default();
                reply(path)
            });

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let futures = (0..5)
                .map(|i| endpoint.get(RequestOptions::new().path(format!("/{i}")).pipeline(true)))
                .collect::<Vec<_>>();

            for (i, future) in futures.into_iter().enumerate() {
                assert_eq!(future.await.unwrap().text(), format!("/{i}"));
            }
            assert_eq!(accepted.get(), 1);
        })
        .await;
}

#[tokio::test]
async fn socket_digest() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            serve(listener, |head| {
                if head.contains("\r\nAuthorization: Digest username=\"u\"") {
                    return reply("welcome");
                }
                let res = "HTTP/1.1 401 Unauthorized\r\n\
                    WWW-Authenticate: Digest realm=\"x\",qop=\"auth\",nonce=\"n\"\r\n\
                    Content-Length: 0\r\n\r\n";
                Some((res.as_bytes().to_vec(), false))
            });

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let options = RequestOptions::new().credentials(Credentials::digest("u", "p"));
            let res = endpoint.get(options).await.unwrap();
            assert_eq!(res.status(), 200);
            assert_eq!(res.text(), "welcome");
        })
        .await;
}

#[tokio::test]
async fn socket_timeout_then_reconnect() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            let accepted = serve(listener, |head| match head.starts_with("GET /slow ") {
                true => None,
                false => reply("fast"),
            });

            let config = EndpointConfig {
                inactivity_timeout: Duration::from_millis(100),
                ..Default::default()
            };
            let endpoint = Endpoint::new(&url, config).unwrap();

            let err = endpoint.get(RequestOptions::new().path("/slow")).await.unwrap_err();
            assert!(matches!(err, Error::Timeout));

            let res = endpoint.get(RequestOptions::new().path("/fast")).await.unwrap();
            assert_eq!(res.text(), "fast");
            assert_eq!(accepted.get(), 2);
        })
        .await;
}

#[tokio::test]
async fn socket_close_delimited() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            serve(listener, |_| Some((b"HTTP/1.0 200 OK\r\n\r\nuntil close".to_vec(), true)));

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let a = endpoint.get(RequestOptions::new()).await.unwrap();
            assert_eq!(a.text(), "until close");

            // a new connection is opened for the next request
            let b = endpoint.get(RequestOptions::new()).await.unwrap();
            assert_eq!(b.text(), "until close");
        })
        .await;
}

#[tokio::test]
async fn socket_connection_refused() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            drop(listener);

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let err = endpoint.get(RequestOptions::new()).await.unwrap_err();
            assert!(matches!(err, Error::ConnectionRefused(_)));
        })
        .await;
}

#[tokio::test]
async fn socket_cancel() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            serve(listener, |_| None);

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let a = endpoint.get(RequestOptions::new());
            let b = endpoint.get(RequestOptions::new());
            endpoint.cancel_all();
            endpoint.cancel_all();
            assert!(matches!(a.await.unwrap_err(), Error::Cancelled));
            assert!(matches!(b.await.unwrap_err(), Error::Cancelled));

            let c = endpoint.get(RequestOptions::new());
            drop(endpoint);
            assert!(matches!(c.await.unwrap_err(), Error::Cancelled));
        })
        .await;
}

#[tokio::test]
async fn socket_invalid_path() {
    LocalSet::new()
        .run_until(async {
            let endpoint = Endpoint::new("http://127.0.0.1:1", EndpointConfig::default()).unwrap();
            let err = endpoint.get(RequestOptions::new().path("/a b")).await.unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)));
            assert!(Endpoint::new("ftp://example.com", EndpointConfig::default()).is_err());
        })
        .await;
}

#[tokio::test]
async fn socket_file_body() {
    LocalSet::new()
        .run_until(async {
            let (listener, url) = bind().await;
            serve(listener, |head| match head.contains("\r\nContent-Length: 12\r\n") {
                true => reply("sized"),
                false => reply("unsized"),
            });

            let path = std::env::temp_dir().join(format!("tether-upload-{}", std::process::id()));
            std::fs::write(&path, b"file content").unwrap();

            let endpoint = Endpoint::new(&url, EndpointConfig::default()).unwrap();
            let res = endpoint.put(RequestOptions::new().body(Payload::file(&path))).await;
            std::fs::remove_file(&path).unwrap();
            assert_eq!(res.unwrap().text(), "sized");

            let missing = std::env::temp_dir().join("tether-upload-missing");
            let err = endpoint.put(RequestOptions::new().body(Payload::file(missing))).await.unwrap_err();
            assert!(matches!(err, Error::Io(_)));
        })
        .await;
}
