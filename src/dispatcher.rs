use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::context::{QueryContext, QueryContextFactory};
use crate::dns::DNSPacket;
use crate::error::{GungnirError, Result};
use crate::message_manager::{Event, MessageManager, SlotId, Transport};
use crate::repository::QueryRepository;
use crate::stats::SessionStats;
use crate::tokio_message_manager::TokioMessageManager;

pub const DEFAULT_WINDOW: usize = 20;
pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_DURATION_SECS: u64 = 30;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 5;

/// One window entry: the per-slot renderer plus the state of its
/// currently outstanding query.
struct QuerySlot {
    qid: u16,
    context: QueryContext,
    tcp_active: bool,
}

/// The windowed query engine.
///
/// A dispatcher keeps a fixed pool of in-flight slots. Each response or
/// timeout recycles its slot into the next query until the session
/// timer fires, after which the pool drains and the loop stops. One
/// dispatcher is strictly single-threaded: every slot mutation happens
/// between two `next_event` calls on its message manager.
pub struct Dispatcher {
    manager: Box<dyn MessageManager>,
    factory: QueryContextFactory,
    /// Set when this dispatcher built its own repository; the
    /// repository-delegating setters only work in that case.
    owned_repository: Option<Rc<RefCell<QueryRepository>>>,

    server_address: IpAddr,
    server_port: u16,
    test_duration: Duration,
    query_timeout: Duration,
    window: usize,

    keep_sending: bool,
    next_qid: u16,
    slots: Vec<Option<QuerySlot>>,
    /// Outstanding slots, least recently recycled first.
    outstanding: VecDeque<SlotId>,

    queries_sent: u64,
    queries_completed: u64,
    response_mismatches: u64,
    start_time: Option<DateTime<Local>>,
    end_time: Option<DateTime<Local>>,
}

impl Dispatcher {
    /// Build a dispatcher around an externally supplied message manager
    /// and context factory. Repository-level setters are rejected in
    /// this mode; configure the repository before creating the factory.
    pub fn new(manager: Box<dyn MessageManager>, factory: QueryContextFactory) -> Self {
        Self {
            manager,
            factory,
            owned_repository: None,
            server_address: IpAddr::V6(Ipv6Addr::LOCALHOST),
            server_port: DEFAULT_PORT,
            test_duration: Duration::from_secs(DEFAULT_DURATION_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            window: DEFAULT_WINDOW,
            keep_sending: true,
            next_qid: 0,
            slots: Vec::new(),
            outstanding: VecDeque::new(),
            queries_sent: 0,
            queries_completed: 0,
            response_mismatches: 0,
            start_time: None,
            end_time: None,
        }
    }

    fn with_repository(repository: QueryRepository) -> Self {
        let repository = Rc::new(RefCell::new(repository));
        let factory = QueryContextFactory::new(Rc::clone(&repository));
        let mut dispatcher = Self::new(Box::new(TokioMessageManager::new()), factory);
        dispatcher.owned_repository = Some(repository);
        dispatcher
    }

    /// Build a self-contained dispatcher reading queries from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_repository(QueryRepository::from_file(path)?))
    }

    /// Build a self-contained dispatcher over in-memory query data.
    pub fn from_input(data: impl Into<String>) -> Self {
        Self::with_repository(QueryRepository::from_string(data))
    }

    fn ensure_not_started(&self, what: &str) -> Result<()> {
        if self.start_time.is_some() {
            return Err(GungnirError::Session(format!(
                "{what} cannot be changed after run()"
            )));
        }
        Ok(())
    }

    fn owned_repository(&self, what: &str) -> Result<&Rc<RefCell<QueryRepository>>> {
        self.owned_repository.as_ref().ok_or_else(|| {
            GungnirError::Session(format!("{what} cannot be applied to an external repository"))
        })
    }

    /// Preload the owned repository; see [`QueryRepository::load`].
    pub fn load_queries(&mut self) -> Result<()> {
        self.ensure_not_started("query preload")?;
        self.owned_repository("query preload")?.borrow_mut().load()
    }

    pub fn set_server_address(&mut self, address: IpAddr) -> Result<()> {
        self.ensure_not_started("server address")?;
        self.server_address = address;
        Ok(())
    }

    pub fn set_server_port(&mut self, port: u16) -> Result<()> {
        self.ensure_not_started("server port")?;
        self.server_port = port;
        Ok(())
    }

    pub fn set_test_duration(&mut self, seconds: u64) -> Result<()> {
        self.ensure_not_started("test duration")?;
        self.test_duration = Duration::from_secs(seconds);
        Ok(())
    }

    pub fn set_query_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_not_started("query timeout")?;
        self.query_timeout = timeout;
        Ok(())
    }

    pub fn set_window(&mut self, window: usize) -> Result<()> {
        self.ensure_not_started("window size")?;
        if window == 0 {
            return Err(GungnirError::Config(
                "window size must be at least 1".to_string(),
            ));
        }
        self.window = window;
        Ok(())
    }

    pub fn set_default_query_class(&mut self, qclass: crate::dns::DNSResourceClass) -> Result<()> {
        self.ensure_not_started("default query class")?;
        self.owned_repository("default query class")?
            .borrow_mut()
            .set_query_class(qclass)
    }

    pub fn set_protocol(&mut self, protocol: Transport) -> Result<()> {
        self.ensure_not_started("default transport protocol")?;
        self.owned_repository("default transport protocol")?
            .borrow_mut()
            .set_protocol(protocol)
    }

    pub fn set_edns(&mut self, on: bool) -> Result<()> {
        self.ensure_not_started("EDNS flag")?;
        self.owned_repository("EDNS flag")?.borrow_mut().set_edns(on)
    }

    pub fn set_dnssec(&mut self, on: bool) -> Result<()> {
        self.ensure_not_started("DNSSEC DO bit")?;
        self.owned_repository("DNSSEC DO bit")?
            .borrow_mut()
            .set_dnssec(on)
    }

    pub fn server_address(&self) -> IpAddr {
        self.server_address
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn queries_sent(&self) -> u64 {
        self.queries_sent
    }

    pub fn queries_completed(&self) -> u64 {
        self.queries_completed
    }

    pub fn response_mismatches(&self) -> u64 {
        self.response_mismatches
    }

    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    pub fn outstanding_queries(&self) -> usize {
        self.outstanding.len()
    }

    pub fn stats(&self) -> Result<SessionStats> {
        match (self.start_time, self.end_time) {
            (Some(start_time), Some(end_time)) => Ok(SessionStats {
                queries_sent: self.queries_sent,
                queries_completed: self.queries_completed,
                start_time,
                end_time,
            }),
            _ => Err(GungnirError::Session(
                "statistics are only available after the session finishes".to_string(),
            )),
        }
    }

    /// Run a whole test session: prime the window, pump events until
    /// the drain completes, record the end time.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        while self.is_active() {
            match self.manager.next_event().await {
                Some(event) => self.process_event(event).await?,
                None => break,
            }
        }
        self.end_time = Some(Local::now());
        Ok(())
    }

    /// Open the session: record the start time, create the shared UDP
    /// socket, arm the session timer, and prime one query per slot.
    ///
    /// Exposed separately from [`run`](Self::run) so a deterministic
    /// message manager can drive the engine event by event.
    pub async fn start(&mut self) -> Result<()> {
        if self.start_time.is_some() {
            return Err(GungnirError::Session(
                "the session has already been started".to_string(),
            ));
        }
        self.start_time = Some(Local::now());

        self.manager
            .open(self.server_address, self.server_port)
            .await?;
        self.manager.start_session_timer(self.test_duration);

        self.slots = (0..self.window)
            .map(|_| {
                Some(QuerySlot {
                    qid: 0,
                    context: self.factory.create(),
                    tcp_active: false,
                })
            })
            .collect();
        self.outstanding = (0..self.window).collect();

        for slot in 0..self.window {
            self.start_slot(slot).await?;
        }
        Ok(())
    }

    /// Whether the session is still running: either new queries are
    /// being generated or outstanding ones are draining.
    pub fn is_active(&self) -> bool {
        self.keep_sending || !self.outstanding.is_empty()
    }

    /// Feed one I/O event through the engine.
    pub async fn process_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::UdpResponse(data) => self.on_udp_response(&data).await,
            Event::TcpResponse { slot, qid, data } => self.on_tcp_response(slot, qid, data).await,
            Event::QueryTimeout { slot, qid } => self.on_query_timeout(slot, qid).await,
            Event::SessionExpired => {
                // Stop generating queries; the loop keeps running until
                // every outstanding slot resolves or times out.
                self.keep_sending = false;
                Ok(())
            }
            Event::SocketError(message) => Err(GungnirError::Socket(message)),
        }
    }

    /// Allocate the next query ID, render the slot's next query, arm
    /// its deadline, and send it on the transport the request asks for.
    async fn start_slot(&mut self, slot_id: SlotId) -> Result<()> {
        let qid = self.next_qid;
        self.next_qid = self.next_qid.wrapping_add(1);

        let protocol = {
            let slot = self.slot_mut(slot_id)?;
            slot.qid = qid;
            slot.context.start(qid)?.protocol
        };
        self.manager.start_query_timer(slot_id, qid, self.query_timeout);

        match protocol {
            Transport::Udp => {
                let wire = match self.slots.get(slot_id).and_then(Option::as_ref) {
                    Some(slot) => slot.context.wire(),
                    None => {
                        return Err(GungnirError::Session(format!(
                            "slot {slot_id} is not allocated"
                        )));
                    }
                };
                self.manager.send_udp(wire).await?;
            }
            Transport::Tcp => {
                let wire = {
                    let slot = self.slot_mut(slot_id)?;
                    slot.tcp_active = true;
                    slot.context.wire().to_vec()
                };
                self.manager.send_tcp(slot_id, qid, wire);
            }
        }
        self.queries_sent += 1;
        Ok(())
    }

    async fn on_udp_response(&mut self, data: &[u8]) -> Result<()> {
        match DNSPacket::parse_header(data) {
            Ok(header) => self.restart(header.id, true).await,
            Err(e) => {
                debug!("discarding malformed response: {e}");
                Ok(())
            }
        }
    }

    async fn on_tcp_response(&mut self, slot_id: SlotId, qid: u16, data: Vec<u8>) -> Result<()> {
        match self.slots.get_mut(slot_id).and_then(Option::as_mut) {
            Some(slot) if slot.qid == qid => slot.tcp_active = false,
            _ => {
                // The exchange outlived its query (e.g. a cancel racing
                // with completion); nothing is outstanding for it.
                debug!("ignoring stale TCP completion for msg id {qid}");
                self.response_mismatches += 1;
                return Ok(());
            }
        }
        self.manager.cancel_tcp(slot_id);

        if data.is_empty() {
            warn!("TCP connection terminated unexpectedly");
            return self.restart(qid, false).await;
        }
        match DNSPacket::parse_header(&data) {
            Ok(_) => self.restart(qid, true).await,
            Err(e) => {
                debug!("discarding malformed response: {e}");
                Ok(())
            }
        }
    }

    async fn on_query_timeout(&mut self, slot_id: SlotId, qid: u16) -> Result<()> {
        let tcp_active = match self.slots.get_mut(slot_id).and_then(Option::as_mut) {
            Some(slot) if slot.qid == qid => {
                let tcp_active = slot.tcp_active;
                slot.tcp_active = false;
                tcp_active
            }
            // A fire that lost the race against cancellation.
            _ => return Ok(()),
        };

        info!("Query timed out: msg id: {qid}");
        if tcp_active {
            self.manager.cancel_tcp(slot_id);
        }
        self.restart(qid, false).await
    }

    /// Resolve the outstanding query with ID `qid`: count it if it
    /// completed, then either recycle its slot into a new query or, in
    /// drain mode, retire the slot.
    async fn restart(&mut self, qid: u16, completed: bool) -> Result<()> {
        let Some(position) = self
            .outstanding
            .iter()
            .position(|&slot_id| self.slots[slot_id].as_ref().is_some_and(|s| s.qid == qid))
        else {
            debug!("no outstanding query matches msg id {qid}");
            self.response_mismatches += 1;
            return Ok(());
        };
        let slot_id = self.outstanding[position];

        self.manager.cancel_query_timer(slot_id);
        if completed {
            self.queries_completed += 1;
        }

        if self.keep_sending {
            // Recycle, moving the slot to the tail of the queue.
            self.outstanding.remove(position);
            self.outstanding.push_back(slot_id);
            self.start_slot(slot_id).await?;
        } else {
            self.outstanding.remove(position);
            if let Some(slot) = self.slots[slot_id].take() {
                if slot.tcp_active {
                    self.manager.cancel_tcp(slot_id);
                }
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, slot_id: SlotId) -> Result<&mut QuerySlot> {
        self.slots
            .get_mut(slot_id)
            .and_then(Option::as_mut)
            .ok_or_else(|| GungnirError::Session(format!("slot {slot_id} is not allocated")))
    }
}
