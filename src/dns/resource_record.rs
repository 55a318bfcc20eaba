use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::PacketComponent,
    edns::EdnsOpt,
    enums::{DNSResourceClass, DNSResourceType},
    util::{decode_domain_name, domain_name_len, encode_domain_name},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    Soa {
        mname: Vec<String>,
        rname: Vec<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Unknown(Vec<u8>),
}

impl RData {
    fn wire_len(&self) -> usize {
        match self {
            RData::Soa { mname, rname, .. } => {
                domain_name_len(mname) + domain_name_len(rname) + 20
            }
            RData::Unknown(bytes) => bytes.len(),
        }
    }

    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        match self {
            RData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                encode_domain_name(mname, writer)?;
                encode_domain_name(rname, writer)?;
                writer.write_var::<u32>(32, *serial)?;
                writer.write_var::<u32>(32, *refresh)?;
                writer.write_var::<u32>(32, *retry)?;
                writer.write_var::<u32>(32, *expire)?;
                writer.write_var::<u32>(32, *minimum)?;
            }
            RData::Unknown(bytes) => {
                writer.write_bytes(bytes)?;
            }
        }
        Ok(())
    }

    fn parse(rtype: DNSResourceType, bytes: Vec<u8>) -> Result<RData, ParseError> {
        match rtype {
            DNSResourceType::SOA => {
                let mut reader = BitReader::<_, BigEndian>::new(&bytes[..]);
                Ok(RData::Soa {
                    mname: decode_domain_name(&mut reader)?,
                    rname: decode_domain_name(&mut reader)?,
                    serial: reader.read_var::<u32>(32)?,
                    refresh: reader.read_var::<u32>(32)?,
                    retry: reader.read_var::<u32>(32)?,
                    expire: reader.read_var::<u32>(32)?,
                    minimum: reader.read_var::<u32>(32)?,
                })
            }
            _ => Ok(RData::Unknown(bytes)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DNSResourceRecord {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl DNSResourceRecord {
    /// Synthesize the SOA record carried in the authority section of an
    /// IXFR query. The MNAME/RNAME fields are the root name and every
    /// timer field is zero; only the serial is meaningful.
    pub fn ixfr_soa(
        owner: Vec<String>,
        rclass: DNSResourceClass,
        serial: u32,
    ) -> DNSResourceRecord {
        DNSResourceRecord {
            labels: owner,
            rtype: DNSResourceType::SOA,
            rclass,
            ttl: 0,
            rdata: RData::Soa {
                mname: Vec::new(),
                rname: Vec::new(),
                serial,
                refresh: 0,
                retry: 0,
                expire: 0,
                minimum: 0,
            },
        }
    }

    /// Build the OPT pseudo-record for the additional section.
    pub fn from_edns(opt: &EdnsOpt) -> DNSResourceRecord {
        let (class, ttl) = opt.to_resource_format();
        DNSResourceRecord {
            labels: Vec::new(),
            rtype: DNSResourceType::OPT,
            rclass: class.into(),
            ttl,
            rdata: RData::Unknown(Vec::new()),
        }
    }

    /// Reinterpret an OPT record as its EDNS fields, if it is one.
    pub fn as_edns(&self) -> Option<EdnsOpt> {
        if self.rtype != DNSResourceType::OPT {
            return None;
        }
        Some(EdnsOpt::from_resource_format(self.rclass.into(), self.ttl))
    }
}

impl Default for DNSResourceRecord {
    fn default() -> Self {
        DNSResourceRecord {
            labels: Vec::new(),
            rtype: DNSResourceType::default(),
            rclass: DNSResourceClass::default(),
            ttl: 0,
            rdata: RData::Unknown(Vec::new()),
        }
    }
}

impl PacketComponent for DNSResourceRecord {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        encode_domain_name(&self.labels, writer)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        let rdlen = self.rdata.wire_len();
        if rdlen > u16::MAX as usize {
            return Err(ParseError::InvalidRecordData);
        }
        writer.write_var::<u16>(16, rdlen as u16)?;
        self.rdata.write(writer)?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        let labels = decode_domain_name(reader)?;
        let rtype: DNSResourceType = reader.read_var::<u16>(16)?.into();
        let rclass = reader.read_var::<u16>(16)?.into();
        let ttl = reader.read_var::<u32>(32)?;
        let rdlen = reader.read_var::<u16>(16)? as usize;
        let mut bytes = vec![0; rdlen];
        reader.read_bytes(&mut bytes)?;
        *self = DNSResourceRecord {
            labels,
            rtype,
            rclass,
            ttl,
            rdata: RData::parse(rtype, bytes)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BigEndian, BitReader, BitWriter};

    #[test]
    fn test_ixfr_soa_round_trip() {
        let owner = vec!["example".to_string(), "com".to_string()];
        let record = DNSResourceRecord::ixfr_soa(owner.clone(), DNSResourceClass::IN, 42);

        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::<_, BigEndian>::new(&mut buf);
            record.write(&mut writer).unwrap();
        }

        let mut reader = BitReader::<_, BigEndian>::new(&buf[..]);
        let mut parsed = DNSResourceRecord::default();
        parsed.read(&mut reader).unwrap();

        assert_eq!(parsed.labels, owner);
        assert_eq!(parsed.rtype, DNSResourceType::SOA);
        assert_eq!(parsed.ttl, 0);
        match parsed.rdata {
            RData::Soa { serial, mname, rname, .. } => {
                assert_eq!(serial, 42);
                assert!(mname.is_empty());
                assert!(rname.is_empty());
            }
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[test]
    fn test_opt_record_fields() {
        let mut opt = EdnsOpt::new();
        opt.set_do_flag(true);
        let record = DNSResourceRecord::from_edns(&opt);

        assert_eq!(record.rtype, DNSResourceType::OPT);
        assert!(record.labels.is_empty());
        assert_eq!(u16::from(record.rclass), 4096);
        assert_eq!(record.ttl & 0xFFFF, 0x8000);
        assert_eq!(record.as_edns().unwrap(), opt);
    }
}
