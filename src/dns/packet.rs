use bitstream_io::{BigEndian, BitReader, BitWriter};

use super::{
    DNSHeader, DNSQuestion, DNSResourceRecord, OPCODE_QUERY, ParseError, RCODE_NOERROR,
    common::PacketComponent,
};

/// A DNS message in render or parse form. Query generation only ever
/// fills the question, authority, and additional sections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResourceRecord>,
    pub authorities: Vec<DNSResourceRecord>,
    pub additionals: Vec<DNSResourceRecord>,
}

impl DNSPacket {
    /// A fresh query skeleton: opcode QUERY, rcode NOERROR, RD set.
    pub fn new_query(id: u16) -> Self {
        DNSPacket {
            header: DNSHeader {
                id,
                opcode: OPCODE_QUERY,
                rcode: RCODE_NOERROR,
                rd: true,
                ..DNSHeader::default()
            },
            ..DNSPacket::default()
        }
    }

    /// Encode into `buf`, replacing its previous contents. Section
    /// counts are derived from the section vectors, not from the stored
    /// header.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), ParseError> {
        buf.clear();
        let mut writer = BitWriter::<_, BigEndian>::new(buf);

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;
        header.write(&mut writer)?;

        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for record in &self.answers {
            record.write(&mut writer)?;
        }
        for record in &self.authorities {
            record.write(&mut writer)?;
        }
        for record in &self.additionals {
            record.write(&mut writer)?;
        }
        Ok(())
    }

    /// Decode only the fixed 12-byte header. This is all the response
    /// path needs to correlate a message with an in-flight query.
    pub fn parse_header(bytes: &[u8]) -> Result<DNSHeader, ParseError> {
        if bytes.len() < DNSHeader::WIRE_LEN {
            return Err(ParseError::InvalidHeader);
        }
        let mut reader = BitReader::<_, BigEndian>::new(bytes);
        let mut header = DNSHeader::default();
        header.read(&mut reader)?;
        Ok(header)
    }

    /// Full message decode, used to inspect generated queries.
    pub fn parse(bytes: &[u8]) -> Result<DNSPacket, ParseError> {
        let mut reader = BitReader::<_, BigEndian>::new(bytes);
        let mut header = DNSHeader::default();
        header.read(&mut reader)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader)?;
            questions.push(question);
        }
        let mut sections: [Vec<DNSResourceRecord>; 3] = Default::default();
        for (section, count) in sections
            .iter_mut()
            .zip([header.ancount, header.nscount, header.arcount])
        {
            for _ in 0..count {
                let mut record = DNSResourceRecord::default();
                record.read(&mut reader)?;
                section.push(record);
            }
        }
        let [answers, authorities, additionals] = sections;

        Ok(DNSPacket {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// The EDNS OPT record of this message, if present.
    pub fn edns(&self) -> Option<&DNSResourceRecord> {
        self.additionals
            .iter()
            .find(|record| record.as_edns().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSResourceClass, DNSResourceType, EdnsOpt, parse_name};

    #[test]
    fn test_query_skeleton_flags() {
        let packet = DNSPacket::new_query(0x1234);
        assert_eq!(packet.header.id, 0x1234);
        assert_eq!(packet.header.opcode, OPCODE_QUERY);
        assert_eq!(packet.header.rcode, RCODE_NOERROR);
        assert!(packet.header.rd);
        assert!(!packet.header.qr);
        assert!(!packet.header.aa);
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let mut packet = DNSPacket::new_query(7);
        packet.questions.push(DNSQuestion::new(
            parse_name("example.com.").unwrap(),
            DNSResourceType::SOA,
            DNSResourceClass::IN,
        ));
        let mut opt = EdnsOpt::new();
        opt.set_do_flag(true);
        packet
            .additionals
            .push(DNSResourceRecord::from_edns(&opt));

        let mut buf = Vec::new();
        packet.serialize_into(&mut buf).unwrap();

        let parsed = DNSPacket::parse(&buf).unwrap();
        assert_eq!(parsed.header.id, 7);
        assert_eq!(parsed.header.qdcount, 1);
        assert_eq!(parsed.header.arcount, 1);
        assert_eq!(parsed.questions[0].qtype, DNSResourceType::SOA);
        assert_eq!(parsed.questions[0].labels, vec!["example", "com"]);
        let edns = parsed.edns().and_then(|r| r.as_edns()).unwrap();
        assert!(edns.do_flag());
        assert_eq!(edns.udp_payload_size, 4096);
    }

    #[test]
    fn test_parse_header_rejects_short_input() {
        assert!(DNSPacket::parse_header(&[0u8; 11]).is_err());
    }
}
