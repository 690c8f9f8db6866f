//! End-to-end tests against a real Listener Set bound on loopback.

use hello_ports::handler::hello_body;
use hello_ports::listener::{ListenerConfig, ListenerSet};
use hello_ports::ServerError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

const COUNT: u16 = 4;

fn local_config(base_port: u16) -> ListenerConfig {
    ListenerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ..ListenerConfig::new(base_port, COUNT)
    }
}

/// Finds a free run of `COUNT` ports by probing from an ephemeral port.
async fn bind_local() -> (ListenerSet, u16) {
    for _ in 0..50 {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = probe.local_addr().unwrap().port();
        drop(probe);
        if base > u16::MAX - COUNT {
            continue;
        }
        if let Ok(set) = ListenerSet::bind(&local_config(base)).await {
            return (set, base);
        }
    }
    panic!("no free run of {} ports on loopback", COUNT);
}

async fn start_local() -> (Vec<SocketAddr>, u16) {
    let (set, base) = bind_local().await;
    let addrs = set.local_addrs();
    tokio::spawn(set.serve());
    (addrs, base)
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn parse_reply(raw: &str) -> Reply {
    let (head, body) = raw.split_once("\r\n\r\n").expect("response has a head");
    let mut lines = head.split("\r\n");
    let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    Reply {
        status,
        headers,
        body: body.to_string(),
    }
}

async fn send_raw(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server closed the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}

async fn request(addr: SocketAddr, method: &str, path: &str) -> Reply {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        method, path, addr
    );
    parse_reply(&send_raw(addr, &raw).await)
}

#[tokio::test]
async fn every_port_answers_get() {
    let (addrs, base) = start_local().await;
    assert_eq!(addrs.len(), COUNT as usize);

    for (i, addr) in addrs.iter().enumerate() {
        assert_eq!(addr.port(), base + i as u16);
        let path = format!("/port-{}", i);
        let reply = request(*addr, "GET", &path).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/html"));
        assert_eq!(reply.body, format!("Hello World ! '{}'", path));
    }
}

#[tokio::test]
async fn first_and_last_port_echo_their_paths() {
    let (addrs, _) = start_local().await;

    let reply = request(addrs[0], "GET", "/foo").await;
    assert_eq!((reply.status, reply.body.as_str()), (200, "Hello World ! '/foo'"));

    let reply = request(addrs[3], "GET", "/bar").await;
    assert_eq!((reply.status, reply.body.as_str()), (200, "Hello World ! '/bar'"));
}

#[tokio::test]
async fn root_path() {
    let (addrs, _) = start_local().await;
    let reply = request(addrs[1], "GET", "/").await;
    assert_eq!(reply.body, "Hello World ! '/'");
}

#[tokio::test]
async fn paths_are_echoed_verbatim() {
    let (addrs, _) = start_local().await;
    let long = format!("/{}", "x".repeat(8000));
    let paths = [
        "/a%20b",
        "/<script>alert('x')</script>",
        "/search?q=hello&lang=en",
        "/~user/\"quoted\"/#frag",
        long.as_str(),
    ];

    for path in paths {
        let reply = request(addrs[2], "GET", path).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, hello_body(path));
        let length = hello_body(path).len().to_string();
        assert_eq!(reply.header("Content-Length"), Some(length.as_str()));
    }
}

#[tokio::test]
async fn repeated_requests_get_identical_answers() {
    let (addrs, _) = start_local().await;
    let first = request(addrs[0], "GET", "/same").await;
    let second = request(addrs[0], "GET", "/same").await;
    assert_eq!(first.status, second.status);
    assert_eq!(first.body, second.body);
    assert_eq!(first.header("Content-Type"), second.header("Content-Type"));
}

#[tokio::test]
async fn keep_alive_serves_several_requests() {
    let (addrs, _) = start_local().await;
    let raw = send_raw(
        addrs[0],
        "GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(raw.matches("HTTP/1.1 200 OK").count(), 2);
    assert!(raw.contains("Hello World ! '/one'"));
    assert!(raw.ends_with("Hello World ! '/two'"));
}

#[tokio::test]
async fn unsupported_methods_get_501() {
    let (addrs, _) = start_local().await;
    for method in ["POST", "PUT", "DELETE", "OPTIONS"] {
        let reply = request(addrs[0], method, "/foo").await;
        assert_eq!(reply.status, 501, "{}", method);
    }
}

#[tokio::test]
async fn head_gets_headers_only() {
    let (addrs, _) = start_local().await;
    let reply = request(addrs[0], "HEAD", "/foo").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "");
    assert_eq!(reply.header("Content-Length"), Some("20"));
}

#[tokio::test]
async fn garbage_gets_400() {
    let (addrs, _) = start_local().await;
    let reply = parse_reply(&send_raw(addrs[0], "definitely not http\r\n\r\n").await);
    assert_eq!(reply.status, 400);
}

#[tokio::test]
async fn responses_carry_server_and_date() {
    let (addrs, _) = start_local().await;
    let reply = request(addrs[0], "GET", "/").await;
    assert!(reply.header("Server").unwrap().starts_with("hello-ports/"));
    assert!(reply.header("Date").is_some());
}

#[tokio::test]
async fn overlapping_set_fails_to_bind() {
    let (set, base) = bind_local().await;

    let overlapping = local_config(base + 2);
    match ListenerSet::bind(&overlapping).await {
        Err(ServerError::Bind { addr, .. }) => assert_eq!(addr.port(), base + 2),
        Err(other) => panic!("expected a bind error, got {}", other),
        Ok(_) => panic!("bound a port that was already taken"),
    }

    drop(set);
}

#[tokio::test]
async fn shutdown_stops_every_listener() {
    let (set, _) = bind_local().await;
    let addrs = set.local_addrs();
    let (stop, stopped) = oneshot::channel::<()>();
    let serving = tokio::spawn(set.serve_with_shutdown(async {
        let _ = stopped.await;
    }));

    assert_eq!(request(addrs[0], "GET", "/").await.status, 200);

    stop.send(()).unwrap();
    timeout(Duration::from_secs(5), serving)
        .await
        .expect("listeners stopped")
        .unwrap()
        .unwrap();

    // Aborted listeners release their sockets.
    let mut refused = false;
    for _ in 0..50 {
        if TcpStream::connect(addrs[0]).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused);
}
