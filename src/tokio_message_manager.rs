use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{GungnirError, Result};
use crate::message_manager::{Event, MessageManager, SlotId};

/// Receive buffer for the shared UDP socket. Responses to our queries
/// never exceed the advertised EDNS payload size.
const UDP_RECVBUF_LEN: usize = 4096;

/// Kernel-side receive queue for the shared socket, sized as in the
/// original queryperf.
const UDP_SO_RCVBUF: usize = 32 * 1024;

/// A TCP message length prefix is 16 bits, so a single response can be
/// at most this large.
const TCP_RCVBUF_LEN: usize = 65535;

/// [`MessageManager`] implementation on the tokio runtime.
///
/// Every asynchronous concern runs as its own task on the caller's
/// current-thread runtime: one reader on the shared UDP socket, one
/// task per TCP exchange, one per armed timer. All of them funnel into
/// a single event queue that `next_event` drains, so the dispatcher
/// remains strictly single-threaded.
pub struct TokioMessageManager {
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    server: Option<SocketAddr>,
    udp: Option<Arc<UdpSocket>>,
    udp_reader: Option<JoinHandle<()>>,
    tcp_exchanges: HashMap<SlotId, JoinHandle<()>>,
    query_timers: HashMap<SlotId, JoinHandle<()>>,
    session_timer: Option<JoinHandle<()>>,
}

impl TokioMessageManager {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx,
            server: None,
            udp: None,
            udp_reader: None,
            tcp_exchanges: HashMap::new(),
            query_timers: HashMap::new(),
            session_timer: None,
        }
    }

    fn connected_udp_socket(dest: SocketAddr) -> Result<UdpSocket> {
        let domain = if dest.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(socket2::Protocol::UDP))
            .map_err(|e| GungnirError::Socket(format!("failed to create a socket: {e}")))?;
        socket
            .set_recv_buffer_size(UDP_SO_RCVBUF)
            .map_err(|e| GungnirError::Socket(format!("failed to set receive buffer: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| GungnirError::Socket(format!("failed to set reuse address: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| GungnirError::Socket(format!("failed to create a socket: {e}")))?;
        socket
            .connect(&dest.into())
            .map_err(|e| GungnirError::Socket(format!("failed to create a socket: {e}")))?;
        UdpSocket::from_std(socket.into())
            .map_err(|e| GungnirError::Socket(format!("failed to create a socket: {e}")))
    }
}

impl Default for TokioMessageManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl MessageManager for TokioMessageManager {
    async fn open(&mut self, server: IpAddr, port: u16) -> Result<()> {
        let dest = SocketAddr::new(server, port);
        let socket = Arc::new(Self::connected_udp_socket(dest)?);

        let tx = self.events_tx.clone();
        let reader_socket = Arc::clone(&socket);
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; UDP_RECVBUF_LEN];
            loop {
                match reader_socket.recv(&mut buf).await {
                    Ok(len) => {
                        if tx.send(Event::UdpResponse(buf[..len].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Event::SocketError(format!(
                            "unexpected failure on socket read: {e}"
                        )));
                        break;
                    }
                }
            }
        });

        self.server = Some(dest);
        self.udp = Some(socket);
        self.udp_reader = Some(reader);
        Ok(())
    }

    async fn send_udp(&mut self, wire: &[u8]) -> Result<()> {
        let socket = self
            .udp
            .as_ref()
            .ok_or_else(|| GungnirError::Socket("UDP socket is not open".to_string()))?;
        socket
            .send(wire)
            .await
            .map_err(|e| GungnirError::Socket(format!("unexpected failure on socket send: {e}")))?;
        Ok(())
    }

    fn send_tcp(&mut self, slot: SlotId, qid: u16, wire: Vec<u8>) {
        let Some(dest) = self.server else {
            let _ = self
                .events_tx
                .send(Event::SocketError("TCP send before open".to_string()));
            return;
        };
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let data = tcp_exchange(dest, &wire).await.unwrap_or_default();
            let _ = tx.send(Event::TcpResponse { slot, qid, data });
        });
        if let Some(previous) = self.tcp_exchanges.insert(slot, task) {
            previous.abort();
        }
    }

    fn cancel_tcp(&mut self, slot: SlotId) {
        if let Some(task) = self.tcp_exchanges.remove(&slot) {
            task.abort();
        }
    }

    fn start_query_timer(&mut self, slot: SlotId, qid: u16, timeout: Duration) {
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Event::QueryTimeout { slot, qid });
        });
        if let Some(previous) = self.query_timers.insert(slot, task) {
            previous.abort();
        }
    }

    fn cancel_query_timer(&mut self, slot: SlotId) {
        if let Some(task) = self.query_timers.remove(&slot) {
            task.abort();
        }
    }

    fn start_session_timer(&mut self, duration: Duration) {
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Event::SessionExpired);
        });
        if let Some(previous) = self.session_timer.replace(task) {
            previous.abort();
        }
    }

    async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }
}

impl Drop for TokioMessageManager {
    fn drop(&mut self) {
        if let Some(reader) = &self.udp_reader {
            reader.abort();
        }
        for task in self.tcp_exchanges.values() {
            task.abort();
        }
        for task in self.query_timers.values() {
            task.abort();
        }
        if let Some(timer) = &self.session_timer {
            timer.abort();
        }
    }
}

/// Run one query/response exchange over a fresh TCP connection.
///
/// The connection uses a kernel-assigned ephemeral source port. After
/// writing the length-prefixed query the outbound direction is shut
/// down so the server does not wait for more queries. The first
/// response message is kept; any further messages on the connection
/// (AXFR, large IXFR) are read and discarded until the server closes.
/// `None` reports a failed exchange.
async fn tcp_exchange(dest: SocketAddr, wire: &[u8]) -> Option<Vec<u8>> {
    let mut stream = match TcpStream::connect(dest).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("TCP connect failed: {e}");
            return None;
        }
    };

    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    framed.extend_from_slice(wire);
    if let Err(e) = stream.write_all(&framed).await {
        warn!("TCP send failed: {e}");
        return None;
    }
    if let Err(e) = stream.shutdown().await {
        warn!("failed to shut down TCP socket: {e}");
        return None;
    }

    let mut first: Option<Vec<u8>> = None;
    let mut scratch = vec![0u8; TCP_RCVBUF_LEN];
    loop {
        let mut msglen_buf = [0u8; 2];
        match stream.read_exact(&mut msglen_buf).await {
            Ok(_) => {}
            // The server closed the connection; report what we have.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Some(first.unwrap_or_default());
            }
            Err(e) => {
                warn!("failed to read TCP message length: {e}");
                return None;
            }
        }
        let msglen = u16::from_be_bytes(msglen_buf) as usize;

        if first.is_none() {
            let mut message = vec![0u8; msglen];
            match stream.read_exact(&mut message).await {
                Ok(_) => first = Some(message),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Some(Vec::new());
                }
                Err(e) => {
                    warn!("failed to read TCP message: {e}");
                    return None;
                }
            }
        } else {
            // Subsequent messages are drained into the scratch buffer
            // and dropped.
            match stream.read_exact(&mut scratch[..msglen]).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Some(first.unwrap_or_default());
                }
                Err(e) => {
                    warn!("failed to read TCP message: {e}");
                    return None;
                }
            }
        }
    }
}
