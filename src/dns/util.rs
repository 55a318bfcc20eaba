use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

/// Split a textual domain name into wire labels.
///
/// A trailing dot is accepted and ignored; the root name `.` maps to an
/// empty label vector. Interior empty labels and oversized labels are
/// rejected.
pub fn parse_name(name: &str) -> Result<Vec<String>, ParseError> {
    if name.is_empty() {
        return Err(ParseError::InvalidName(name.to_string()));
    }
    if name == "." {
        return Ok(Vec::new());
    }

    let stripped = name.strip_suffix('.').unwrap_or(name);
    let mut labels = Vec::new();
    let mut wire_len = 1; // trailing null label
    for label in stripped.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(ParseError::InvalidName(name.to_string()));
        }
        wire_len += 1 + label.len();
        if wire_len > MAX_NAME_LEN {
            return Err(ParseError::InvalidName(name.to_string()));
        }
        labels.push(label.to_string());
    }
    Ok(labels)
}

pub fn encode_domain_name<E: Endianness>(
    labels: &[String],
    writer: &mut BitWriter<&mut Vec<u8>, E>,
) -> Result<(), ParseError> {
    for label in labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }
        writer.write_var::<u8>(8, label.len() as u8)?;
        writer.write_bytes(label.as_bytes())?;
    }
    writer.write_var::<u8>(8, 0)?;
    Ok(())
}

/// Decode an uncompressed domain name. Query rendering never emits
/// compression pointers, so a pointer here is an error.
pub fn decode_domain_name<E: Endianness>(
    reader: &mut BitReader<&[u8], E>,
) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    loop {
        let len = reader.read_var::<u8>(8)?;
        if len == 0 {
            break;
        }
        if len as usize > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }
        let mut buf = vec![0; len as usize];
        reader.read_bytes(&mut buf)?;
        let label = String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
    }
    Ok(labels)
}

/// Length in wire bytes of an encoded domain name.
pub fn domain_name_len(labels: &[String]) -> usize {
    labels.iter().map(|l| 1 + l.len()).sum::<usize>() + 1
}
