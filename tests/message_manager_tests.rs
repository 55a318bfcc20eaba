//! Exercises the tokio message manager and whole sessions against live
//! loopback servers.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use gungnir::Dispatcher;
use gungnir::message_manager::{Event, MessageManager, Transport};
use gungnir::tokio_message_manager::TokioMessageManager;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A UDP server echoing every datagram back to its sender.
async fn spawn_udp_echo() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..len], peer).await;
        }
    });
    port
}

/// A TCP server speaking the DNS framing: read one length-prefixed
/// message per connection, echo it back, close.
async fn spawn_tcp_echo() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut msglen_buf = [0u8; 2];
                if stream.read_exact(&mut msglen_buf).await.is_err() {
                    return;
                }
                let msglen = u16::from_be_bytes(msglen_buf) as usize;
                let mut message = vec![0u8; msglen];
                if stream.read_exact(&mut message).await.is_err() {
                    return;
                }
                let mut reply = Vec::with_capacity(msglen + 2);
                reply.extend_from_slice(&msglen_buf);
                reply.extend_from_slice(&message);
                let _ = stream.write_all(&reply).await;
            });
        }
    });
    port
}

#[tokio::test]
async fn udp_send_and_receive() {
    let port = spawn_udp_echo().await;

    let mut manager = TokioMessageManager::new();
    manager.open(LOCALHOST, port).await.unwrap();
    manager.send_udp(b"\x12\x34hello").await.unwrap();

    match manager.next_event().await {
        Some(Event::UdpResponse(data)) => assert_eq!(data, b"\x12\x34hello"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn tcp_exchange_keeps_first_message() {
    let port = spawn_tcp_echo().await;

    let mut manager = TokioMessageManager::new();
    manager.open(LOCALHOST, port).await.unwrap();
    manager.send_tcp(4, 9, b"\x00\x09response".to_vec());

    match manager.next_event().await {
        Some(Event::TcpResponse { slot, qid, data }) => {
            assert_eq!(slot, 4);
            assert_eq!(qid, 9);
            assert_eq!(data, b"\x00\x09response");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn tcp_connect_failure_reports_empty_data() {
    // Grab a free port and release it so nothing is listening there.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut manager = TokioMessageManager::new();
    manager.open(LOCALHOST, port).await.unwrap();
    manager.send_tcp(0, 0, vec![0u8; 12]);

    match manager.next_event().await {
        Some(Event::TcpResponse { data, .. }) => assert!(data.is_empty()),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn query_timer_fires_and_cancels() {
    let mut manager = TokioMessageManager::new();
    manager.start_query_timer(2, 17, Duration::from_millis(5));
    match manager.next_event().await {
        Some(Event::QueryTimeout { slot, qid }) => {
            assert_eq!(slot, 2);
            assert_eq!(qid, 17);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // A cancelled timer must not deliver its event.
    manager.start_query_timer(3, 18, Duration::from_millis(50));
    manager.cancel_query_timer(3);
    manager.start_session_timer(Duration::from_millis(100));
    match manager.next_event().await {
        Some(Event::SessionExpired) => {}
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn udp_session_against_echo_server() {
    let port = spawn_udp_echo().await;

    let mut dispatcher = Dispatcher::from_input("example.com. SOA\n");
    dispatcher.set_server_address(LOCALHOST).unwrap();
    dispatcher.set_server_port(port).unwrap();
    dispatcher.set_window(1).unwrap();
    dispatcher.set_test_duration(1).unwrap();
    dispatcher.run().await.unwrap();

    let stats = dispatcher.stats().unwrap();
    assert!(stats.queries_sent > 0);
    // Every echoed query is matched and completed; the drain collects
    // the final outstanding one before the loop stops.
    assert_eq!(stats.queries_completed, stats.queries_sent);
    assert!(stats.qps() > 0.0);
}

#[tokio::test]
async fn tcp_session_against_echo_server() {
    let port = spawn_tcp_echo().await;

    let mut dispatcher = Dispatcher::from_input("example.com. SOA\nwww.example.com. A\n");
    dispatcher.set_protocol(Transport::Tcp).unwrap();
    dispatcher.set_server_address(LOCALHOST).unwrap();
    dispatcher.set_server_port(port).unwrap();
    dispatcher.set_window(2).unwrap();
    dispatcher.set_test_duration(1).unwrap();
    dispatcher.run().await.unwrap();

    let stats = dispatcher.stats().unwrap();
    assert!(stats.queries_sent > 0);
    assert_eq!(stats.queries_completed, stats.queries_sent);
}

#[tokio::test]
async fn preloaded_session_against_echo_server() {
    let port = spawn_udp_echo().await;

    let mut dispatcher = Dispatcher::from_input("example.com. SOA\nwww.example.com. A\n");
    dispatcher.load_queries().unwrap();
    dispatcher.set_server_address(LOCALHOST).unwrap();
    dispatcher.set_server_port(port).unwrap();
    dispatcher.set_window(4).unwrap();
    dispatcher.set_test_duration(1).unwrap();
    dispatcher.run().await.unwrap();

    let stats = dispatcher.stats().unwrap();
    assert_eq!(stats.queries_completed, stats.queries_sent);
}
