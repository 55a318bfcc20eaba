use std::cell::RefCell;
use std::rc::Rc;

use crate::dns::{DNSPacket, DNSResourceRecord};
use crate::error::Result;
use crate::message_manager::Transport;
use crate::repository::QueryRepository;

/// A rendered query, borrowed from the context's encode buffer. The
/// bytes are valid until the next [`QueryContext::start`] call; send or
/// copy them before then.
#[derive(Debug)]
pub struct QuerySpec<'a> {
    pub protocol: Transport,
    pub wire: &'a [u8],
}

/// Renders requests pulled from a repository into wire format.
///
/// Each in-flight slot owns one context; the encode buffer is reused
/// across renders so steady-state operation does not allocate.
pub struct QueryContext {
    repository: Rc<RefCell<QueryRepository>>,
    wire_buf: Vec<u8>,
}

impl QueryContext {
    pub fn new(repository: Rc<RefCell<QueryRepository>>) -> Self {
        Self {
            repository,
            wire_buf: Vec::new(),
        }
    }

    /// Pull the next request from the repository and render it with the
    /// given message ID.
    pub fn start(&mut self, qid: u16) -> Result<QuerySpec<'_>> {
        let (request, edns) = {
            let mut repository = self.repository.borrow_mut();
            let request = repository.next_request()?;
            let edns = (request.use_edns || request.use_dnssec)
                .then(|| repository.edns_template().clone());
            (request, edns)
        };

        let mut message = DNSPacket::new_query(qid);
        message.questions.push(request.question);
        message.authorities = request.authority;
        if let Some(opt) = edns {
            message.additionals.push(DNSResourceRecord::from_edns(&opt));
        }
        message.serialize_into(&mut self.wire_buf)?;

        Ok(QuerySpec {
            protocol: request.protocol,
            wire: &self.wire_buf,
        })
    }

    /// The most recently rendered wire bytes.
    pub fn wire(&self) -> &[u8] {
        &self.wire_buf
    }
}

/// Creates contexts bound to a shared repository, one per slot.
pub struct QueryContextFactory {
    repository: Rc<RefCell<QueryRepository>>,
}

impl QueryContextFactory {
    pub fn new(repository: Rc<RefCell<QueryRepository>>) -> Self {
        Self { repository }
    }

    pub fn create(&self) -> QueryContext {
        QueryContext::new(Rc::clone(&self.repository))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSPacket, DNSResourceType, RData};

    fn context_for(input: &str) -> QueryContext {
        let repository = Rc::new(RefCell::new(QueryRepository::from_string(input)));
        QueryContext::new(repository)
    }

    #[test]
    fn test_start_renders_query() {
        let mut context = context_for("example.com. SOA\n");
        let spec = context.start(0x0102).unwrap();
        assert_eq!(spec.protocol, Transport::Udp);

        let packet = DNSPacket::parse(spec.wire).unwrap();
        assert_eq!(packet.header.id, 0x0102);
        assert!(packet.header.rd);
        assert!(!packet.header.qr);
        assert_eq!(packet.header.opcode, 0);
        assert_eq!(packet.questions.len(), 1);
        assert_eq!(packet.questions[0].qtype, DNSResourceType::SOA);
        let edns = packet.edns().and_then(|r| r.as_edns()).unwrap();
        assert!(edns.do_flag());
    }

    #[test]
    fn test_start_advances_repository() {
        let mut context = context_for("example.com. SOA\nwww.example.com. A\n");

        let first = DNSPacket::parse(context.start(1).unwrap().wire).unwrap();
        assert_eq!(first.questions[0].labels, vec!["example", "com"]);

        // Same ID, next question: the repository advance is the side
        // effect under test.
        let second = DNSPacket::parse(context.start(1).unwrap().wire).unwrap();
        assert_eq!(second.header.id, 1);
        assert_eq!(second.questions[0].labels, vec!["www", "example", "com"]);
    }

    #[test]
    fn test_start_reuses_buffer() {
        let mut context = context_for("example.com. SOA\n");
        context.start(1).unwrap();
        let capacity = context.wire_buf.capacity();
        for qid in 2..50 {
            context.start(qid).unwrap();
        }
        assert_eq!(context.wire_buf.capacity(), capacity);
    }

    #[test]
    fn test_ixfr_query_shape() {
        let mut context = context_for("example.com. IXFR serial=42\n");
        let packet = DNSPacket::parse(context.start(9).unwrap().wire).unwrap();

        assert_eq!(packet.questions[0].qtype, DNSResourceType::IXFR);
        assert!(packet.edns().is_none());
        assert_eq!(packet.authorities.len(), 1);
        assert_eq!(packet.authorities[0].rtype, DNSResourceType::SOA);
        match &packet.authorities[0].rdata {
            RData::Soa { serial, .. } => assert_eq!(*serial, 42),
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[test]
    fn test_edns_omitted_when_disabled() {
        let repository = Rc::new(RefCell::new(QueryRepository::from_string(
            "example.com. SOA\n",
        )));
        repository.borrow_mut().set_edns(false).unwrap();
        repository.borrow_mut().set_dnssec(false).unwrap();
        let mut context = QueryContext::new(repository);

        let packet = DNSPacket::parse(context.start(0).unwrap().wire).unwrap();
        assert!(packet.edns().is_none());
        assert_eq!(packet.header.arcount, 0);
    }

    #[test]
    fn test_factory_contexts_share_repository() {
        let repository = Rc::new(RefCell::new(QueryRepository::from_string(
            "example.com. SOA\nwww.example.com. A\n",
        )));
        let factory = QueryContextFactory::new(repository);
        let mut first = factory.create();
        let mut second = factory.create();

        let a = DNSPacket::parse(first.start(0).unwrap().wire).unwrap();
        let b = DNSPacket::parse(second.start(1).unwrap().wire).unwrap();
        assert_eq!(a.questions[0].qtype, DNSResourceType::SOA);
        assert_eq!(b.questions[0].qtype, DNSResourceType::A);
    }
}
