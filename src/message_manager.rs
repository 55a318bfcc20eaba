use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Transport used for a single query exchange.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            other => Err(format!("unsupported transport protocol: {other}")),
        }
    }
}

/// Index of an in-flight slot within a dispatcher's pool. Slot indices
/// are stable for the lifetime of a session.
pub type SlotId = usize;

/// What the I/O layer reports back into the dispatcher loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A datagram arrived on the shared UDP socket.
    UdpResponse(Vec<u8>),
    /// A TCP exchange finished. `data` holds the first response message;
    /// empty data means the exchange failed or the server closed the
    /// connection without a complete message.
    TcpResponse {
        slot: SlotId,
        qid: u16,
        data: Vec<u8>,
    },
    /// The per-query deadline armed for (`slot`, `qid`) expired.
    QueryTimeout { slot: SlotId, qid: u16 },
    /// The whole-session timer expired.
    SessionExpired,
    /// The shared socket failed; the session cannot continue.
    SocketError(String),
}

/// Capability interface over the I/O runtime.
///
/// One implementation drives real sockets and timers on tokio
/// ([`TokioMessageManager`](crate::tokio_message_manager::TokioMessageManager));
/// tests substitute a deterministic in-memory double. All dispatcher
/// state is touched only between `next_event` calls, so implementations
/// never need to synchronize with the dispatcher.
#[async_trait(?Send)]
pub trait MessageManager {
    /// Create the shared UDP socket, connected to the destination.
    async fn open(&mut self, server: IpAddr, port: u16) -> Result<()>;

    /// Send one query on the shared UDP socket. Failure here is fatal
    /// to the session.
    async fn send_udp(&mut self, wire: &[u8]) -> Result<()>;

    /// Start a one-shot TCP exchange for a slot: connect, write the
    /// length-prefixed query, half-close, then collect the response.
    /// Completion or failure is reported as [`Event::TcpResponse`].
    fn send_tcp(&mut self, slot: SlotId, qid: u16, wire: Vec<u8>);

    /// Abort a slot's TCP exchange. Any completion racing with the
    /// abort is suppressed or left for the dispatcher's qid guard.
    fn cancel_tcp(&mut self, slot: SlotId);

    /// Arm the per-query deadline for (`slot`, `qid`).
    fn start_query_timer(&mut self, slot: SlotId, qid: u16, timeout: Duration);

    /// Disarm a slot's deadline. Best-effort: a fire that already
    /// queued its event is absorbed downstream.
    fn cancel_query_timer(&mut self, slot: SlotId);

    /// Arm the whole-session timer.
    fn start_session_timer(&mut self, duration: Duration);

    /// Wait for the next I/O event. `None` means the event source is
    /// exhausted (only the test double ever reports this).
    async fn next_event(&mut self) -> Option<Event>;
}
