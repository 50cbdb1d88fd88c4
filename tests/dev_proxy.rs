//! The dev proxy behind a running server: websocket upgrades are tunnelled.

use std::net::SocketAddr;
use std::time::Duration;

use routekit::proxy::DevProxy;
use routekit::route::{Route, Routes, register};
use routekit::{Router, Server};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Reads up to and including the blank line ending an HTTP head.
async fn read_head(stream: &mut (impl AsyncRead + Unpin)) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// An upstream that switches protocols on the first request, then echoes.
async fn echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await.to_ascii_lowercase();
        assert!(head.contains("upgrade: websocket"), "{head}");
        stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: upgrade\r\n\r\n",
            )
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => stream.write_all(&buf[..n]).await.unwrap(),
            }
        }
    });
    addr
}

/// A port that was free a moment ago.
fn free_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn connect(addr: SocketAddr) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never started on {addr}");
}

#[tokio::test]
async fn websocket_upgrade_is_tunnelled_both_ways() {
    let upstream = echo_upstream().await;
    let proxy = DevProxy::new(&format!("http://{upstream}")).unwrap();
    let mut router = Router::new();
    register(&mut router, &[&Routes::new([Route::new("/", proxy)])]).unwrap();

    let addr = free_port();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(
        Server::bind(&addr.to_string())
            .unwrap()
            .serve_with_shutdown(router, async {
                let _ = stopped.await;
            }),
    );

    let mut client = connect(addr).await;
    client
        .write_all(
            b"GET /hmr HTTP/1.1\r\nhost: localhost\r\nconnection: Upgrade\r\nupgrade: websocket\r\n\r\n",
        )
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    assert!(head.to_ascii_lowercase().contains("connection: upgrade"), "{head}");

    client.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"ping");

    drop(client);
    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
