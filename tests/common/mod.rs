//! Deterministic test double for the message manager, plus wire
//! helpers shared by the integration tests. Most state is exposed
//! directly; encapsulation matters little here.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use bitstream_io::{BigEndian, BitWriter};

use gungnir::dns::{DNSHeader, DNSPacket, PacketComponent};
use gungnir::error::Result;
use gungnir::message_manager::{Event, MessageManager, SlotId};

#[derive(Default)]
pub struct TestManagerState {
    pub opened: Option<(IpAddr, u16)>,
    /// Wire bytes of every UDP query, in send order.
    pub udp_sent: Vec<Vec<u8>>,
    /// Every TCP exchange started: (slot, qid, wire bytes).
    pub tcp_sent: Vec<(SlotId, u16, Vec<u8>)>,
    pub tcp_cancelled: Vec<SlotId>,
    /// Currently armed per-query deadlines.
    pub query_timers: HashMap<SlotId, (u16, Duration)>,
    /// How many times each slot's deadline has been armed.
    pub timer_starts: HashMap<SlotId, usize>,
    pub session_timer: Option<Duration>,
    /// Events handed to the dispatcher by `next_event`.
    pub events: VecDeque<Event>,
}

impl TestManagerState {
    /// All queries sent so far on either transport, in send order,
    /// decoded.
    pub fn sent_queries(&self) -> Vec<DNSPacket> {
        let mut wires: Vec<&Vec<u8>> = self.udp_sent.iter().collect();
        wires.extend(self.tcp_sent.iter().map(|(_, _, wire)| wire));
        wires
            .into_iter()
            .map(|wire| DNSPacket::parse(wire).expect("sent query must decode"))
            .collect()
    }
}

pub struct TestMessageManager {
    state: Rc<RefCell<TestManagerState>>,
}

impl TestMessageManager {
    pub fn new() -> (Self, Rc<RefCell<TestManagerState>>) {
        let state = Rc::new(RefCell::new(TestManagerState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait(?Send)]
impl MessageManager for TestMessageManager {
    async fn open(&mut self, server: IpAddr, port: u16) -> Result<()> {
        self.state.borrow_mut().opened = Some((server, port));
        Ok(())
    }

    async fn send_udp(&mut self, wire: &[u8]) -> Result<()> {
        self.state.borrow_mut().udp_sent.push(wire.to_vec());
        Ok(())
    }

    fn send_tcp(&mut self, slot: SlotId, qid: u16, wire: Vec<u8>) {
        self.state.borrow_mut().tcp_sent.push((slot, qid, wire));
    }

    fn cancel_tcp(&mut self, slot: SlotId) {
        self.state.borrow_mut().tcp_cancelled.push(slot);
    }

    fn start_query_timer(&mut self, slot: SlotId, qid: u16, timeout: Duration) {
        let mut state = self.state.borrow_mut();
        state.query_timers.insert(slot, (qid, timeout));
        *state.timer_starts.entry(slot).or_insert(0) += 1;
    }

    fn cancel_query_timer(&mut self, slot: SlotId) {
        self.state.borrow_mut().query_timers.remove(&slot);
    }

    fn start_session_timer(&mut self, duration: Duration) {
        self.state.borrow_mut().session_timer = Some(duration);
    }

    async fn next_event(&mut self) -> Option<Event> {
        self.state.borrow_mut().events.pop_front()
    }
}

/// A minimal response wire: just a header echoing the given ID with QR
/// set. Header-only parsing is all the dispatcher does with responses.
pub fn make_response(id: u16) -> Vec<u8> {
    let header = DNSHeader {
        id,
        qr: true,
        rd: true,
        ra: true,
        ..DNSHeader::default()
    };
    let mut wire = Vec::new();
    {
        let mut writer = BitWriter::<_, BigEndian>::new(&mut wire);
        header.write(&mut writer).expect("header must encode");
    }
    wire
}
