use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek, SeekFrom};
use std::path::Path;

use tracing::warn;

use crate::dns::{
    DNSQuestion, DNSResourceClass, DNSResourceRecord, DNSResourceType, EdnsOpt, parse_name,
};
use crate::error::{GungnirError, Result};
use crate::message_manager::Transport;

/// How many consecutive reads may fail to produce a query before the
/// input is declared empty. Without this guard an empty (or all-bogus)
/// stream would rewind and spin forever.
const MAX_QUERY_READ_ATTEMPTS: usize = 1000;

/// One parsed line of the query script: everything needed to render a
/// single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    pub question: DNSQuestion,
    pub protocol: Transport,
    /// Authority records to attach; only IXFR populates this, with a
    /// single synthesized SOA.
    pub authority: Vec<DNSResourceRecord>,
    pub use_edns: bool,
    pub use_dnssec: bool,
}

/// Seekable line source backing a streaming repository.
pub trait QueryStream: BufRead + Seek {}

impl<T: BufRead + Seek> QueryStream for T {}

/// Supplies [`RequestSpec`]s from a query script.
///
/// In streaming mode the input rewinds at EOF, yielding an infinite
/// sequence. After [`load`](Self::load) the parsed entries are served
/// cyclically from memory instead. Session-wide options (class,
/// transport, EDNS, DNSSEC) must be fixed before preloading.
pub struct QueryRepository {
    input: Box<dyn QueryStream>,
    preloaded: Option<Vec<RequestSpec>>,
    cursor: usize,
    qclass: DNSResourceClass,
    protocol: Transport,
    use_edns: bool,
    use_dnssec: bool,
    edns_template: EdnsOpt,
}

impl QueryRepository {
    pub fn from_reader(input: impl BufRead + Seek + 'static) -> Self {
        Self {
            input: Box::new(input),
            preloaded: None,
            cursor: 0,
            qclass: DNSResourceClass::IN,
            protocol: Transport::Udp,
            use_edns: true,
            use_dnssec: true,
            edns_template: Self::build_edns_template(true),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            GungnirError::Repository(format!(
                "failed to open query data file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Build a repository over in-memory query data, e.g. inline `-Q`
    /// input or slurped standard input.
    pub fn from_string(data: impl Into<String>) -> Self {
        Self::from_reader(Cursor::new(data.into().into_bytes()))
    }

    fn build_edns_template(dnssec: bool) -> EdnsOpt {
        let mut template = EdnsOpt::new();
        template.set_do_flag(dnssec);
        template
    }

    fn ensure_not_preloaded(&self) -> Result<()> {
        if self.preloaded.is_some() {
            return Err(GungnirError::Repository(
                "repository options cannot be changed after preload".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_query_class(&mut self, qclass: DNSResourceClass) -> Result<()> {
        self.ensure_not_preloaded()?;
        self.qclass = qclass;
        Ok(())
    }

    pub fn set_protocol(&mut self, protocol: Transport) -> Result<()> {
        self.ensure_not_preloaded()?;
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_edns(&mut self, on: bool) -> Result<()> {
        self.ensure_not_preloaded()?;
        self.use_edns = on;
        Ok(())
    }

    pub fn set_dnssec(&mut self, on: bool) -> Result<()> {
        self.ensure_not_preloaded()?;
        self.use_dnssec = on;
        self.edns_template = Self::build_edns_template(on);
        Ok(())
    }

    /// The EDNS OPT template attached to queries that use EDNS.
    pub fn edns_template(&self) -> &EdnsOpt {
        &self.edns_template
    }

    /// Number of preloaded queries; 0 before [`load`](Self::load).
    pub fn query_count(&self) -> usize {
        self.preloaded.as_ref().map_or(0, Vec::len)
    }

    /// Consume the input to EOF, keeping the parsed entries in memory.
    /// One-shot: a second preload fails, as does preloading an input
    /// with no valid queries.
    pub fn load(&mut self) -> Result<()> {
        if self.preloaded.is_some() {
            return Err(GungnirError::Repository(
                "queries are already preloaded".to_string(),
            ));
        }
        let mut specs = Vec::new();
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            match self.parse_line(line) {
                Ok(spec) => specs.push(spec),
                Err(e) => warn!("ignoring bad query line {line:?}: {e}"),
            }
        }
        if specs.is_empty() {
            return Err(GungnirError::Repository(
                "no valid query found in input data".to_string(),
            ));
        }
        self.preloaded = Some(specs);
        self.cursor = 0;
        Ok(())
    }

    /// The next request in sequence. Streaming inputs rewind at EOF;
    /// preloaded repositories cycle through their entries. Never
    /// reports end-of-input.
    pub fn next_request(&mut self) -> Result<RequestSpec> {
        if let Some(specs) = &self.preloaded {
            let spec = specs[self.cursor].clone();
            self.cursor = (self.cursor + 1) % specs.len();
            return Ok(spec);
        }
        self.next_streamed_request()
    }

    fn next_streamed_request(&mut self) -> Result<RequestSpec> {
        for _ in 0..MAX_QUERY_READ_ATTEMPTS {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                self.input.seek(SeekFrom::Start(0))?;
                continue;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            match self.parse_line(line) {
                Ok(spec) => return Ok(spec),
                Err(e) => warn!("ignoring bad query line {line:?}: {e}"),
            }
        }
        Err(GungnirError::Repository(
            "no valid query found in input data".to_string(),
        ))
    }

    fn parse_line(&self, line: &str) -> Result<RequestSpec> {
        let mut tokens = line.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| GungnirError::Repository("missing query name".to_string()))?;
        let type_txt = tokens
            .next()
            .ok_or_else(|| GungnirError::Repository("missing query type".to_string()))?;

        let labels = parse_name(name)?;
        let qtype: DNSResourceType = translate_qtype(type_txt)
            .parse()
            .map_err(GungnirError::Repository)?;

        let mut serial = 0u32;
        for option in tokens {
            match option.split_once('=') {
                Some(("serial", value)) => {
                    serial = value.parse().map_err(|_| {
                        GungnirError::Repository(format!("bad serial option: {option}"))
                    })?;
                }
                _ => {
                    return Err(GungnirError::Repository(format!(
                        "trailing garbage: {option}"
                    )));
                }
            }
        }

        // Zone transfer queries never carry EDNS, whatever the session
        // defaults say; IXFR additionally carries its current-serial
        // SOA in the authority section.
        let (use_edns, use_dnssec, authority) = match qtype {
            DNSResourceType::AXFR => (false, false, Vec::new()),
            DNSResourceType::IXFR => (
                false,
                false,
                vec![DNSResourceRecord::ixfr_soa(
                    labels.clone(),
                    self.qclass,
                    serial,
                )],
            ),
            _ => (self.use_edns, self.use_dnssec, Vec::new()),
        };

        Ok(RequestSpec {
            question: DNSQuestion::new(labels, qtype, self.qclass),
            protocol: self.protocol,
            authority,
            use_edns,
            use_dnssec,
        })
    }
}

/// Mnemonics the type parser does not recognize directly, mapped to
/// their RFC 3597 numeric form.
fn translate_qtype(token: &str) -> &str {
    match token.to_ascii_uppercase().as_str() {
        "A6" => "TYPE38",
        "ANY" => "TYPE255",
        "AXFR" => "TYPE252",
        "IXFR" => "TYPE251",
        _ => token,
    }
}
