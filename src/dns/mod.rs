mod common;
mod edns;
mod enums;
mod header;
mod packet;
mod question;
mod resource_record;
mod util;

pub use common::*;
pub use edns::*;
pub use enums::*;
pub use header::*;
pub use packet::*;
pub use question::*;
pub use resource_record::*;
pub use util::*;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("Invalid domain name: {0}")]
    InvalidName(String),
    #[error("Invalid question section")]
    InvalidQuestionSection,
    #[error("Invalid record data")]
    InvalidRecordData,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::InvalidBitStream(err.to_string())
    }
}
