use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DNSResourceType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    HINFO,
    MX,
    TXT,
    AAAA,
    SRV,
    NAPTR,
    DNAME,
    DS,
    RRSIG,
    NSEC,
    DNSKEY,
    A6,
    OPT,
    SPF,
    TLSA,
    SVCB,
    HTTPS,
    CAA,
    AXFR,
    IXFR,
    ANY,
    Unknown(u16),
}

impl Default for DNSResourceType {
    fn default() -> Self {
        DNSResourceType::Unknown(0)
    }
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            13 => DNSResourceType::HINFO,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            35 => DNSResourceType::NAPTR,
            38 => DNSResourceType::A6,
            39 => DNSResourceType::DNAME,
            41 => DNSResourceType::OPT,
            43 => DNSResourceType::DS,
            46 => DNSResourceType::RRSIG,
            47 => DNSResourceType::NSEC,
            48 => DNSResourceType::DNSKEY,
            52 => DNSResourceType::TLSA,
            64 => DNSResourceType::SVCB,
            65 => DNSResourceType::HTTPS,
            99 => DNSResourceType::SPF,
            251 => DNSResourceType::IXFR,
            252 => DNSResourceType::AXFR,
            255 => DNSResourceType::ANY,
            257 => DNSResourceType::CAA,
            _ => DNSResourceType::Unknown(value),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::HINFO => 13,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::NAPTR => 35,
            DNSResourceType::A6 => 38,
            DNSResourceType::DNAME => 39,
            DNSResourceType::OPT => 41,
            DNSResourceType::DS => 43,
            DNSResourceType::RRSIG => 46,
            DNSResourceType::NSEC => 47,
            DNSResourceType::DNSKEY => 48,
            DNSResourceType::TLSA => 52,
            DNSResourceType::SVCB => 64,
            DNSResourceType::HTTPS => 65,
            DNSResourceType::SPF => 99,
            DNSResourceType::IXFR => 251,
            DNSResourceType::AXFR => 252,
            DNSResourceType::ANY => 255,
            DNSResourceType::CAA => 257,
            DNSResourceType::Unknown(code) => code,
        }
    }
}

impl FromStr for DNSResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let qtype = match upper.as_str() {
            "A" => DNSResourceType::A,
            "NS" => DNSResourceType::NS,
            "CNAME" => DNSResourceType::CNAME,
            "SOA" => DNSResourceType::SOA,
            "PTR" => DNSResourceType::PTR,
            "HINFO" => DNSResourceType::HINFO,
            "MX" => DNSResourceType::MX,
            "TXT" => DNSResourceType::TXT,
            "AAAA" => DNSResourceType::AAAA,
            "SRV" => DNSResourceType::SRV,
            "NAPTR" => DNSResourceType::NAPTR,
            "DNAME" => DNSResourceType::DNAME,
            "DS" => DNSResourceType::DS,
            "RRSIG" => DNSResourceType::RRSIG,
            "NSEC" => DNSResourceType::NSEC,
            "DNSKEY" => DNSResourceType::DNSKEY,
            "OPT" => DNSResourceType::OPT,
            "SPF" => DNSResourceType::SPF,
            "TLSA" => DNSResourceType::TLSA,
            "SVCB" => DNSResourceType::SVCB,
            "HTTPS" => DNSResourceType::HTTPS,
            "CAA" => DNSResourceType::CAA,
            other => {
                // Generic RFC 3597 form, e.g. TYPE251.
                let code = other
                    .strip_prefix("TYPE")
                    .and_then(|digits| digits.parse::<u16>().ok())
                    .ok_or_else(|| format!("unknown RR type: {s}"))?;
                DNSResourceType::from(code)
            }
        };
        Ok(qtype)
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceType::Unknown(code) => write!(f, "TYPE{code}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DNSResourceClass {
    IN,
    CS,
    CH,
    HS,
    NONE,
    ANY,
    Unknown(u16),
}

impl Default for DNSResourceClass {
    fn default() -> Self {
        DNSResourceClass::IN
    }
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            2 => DNSResourceClass::CS,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            254 => DNSResourceClass::NONE,
            255 => DNSResourceClass::ANY,
            _ => DNSResourceClass::Unknown(value),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(value: DNSResourceClass) -> Self {
        match value {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CS => 2,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::NONE => 254,
            DNSResourceClass::ANY => 255,
            DNSResourceClass::Unknown(code) => code,
        }
    }
}

impl FromStr for DNSResourceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let qclass = match upper.as_str() {
            "IN" => DNSResourceClass::IN,
            "CS" => DNSResourceClass::CS,
            "CH" => DNSResourceClass::CH,
            "HS" => DNSResourceClass::HS,
            "NONE" => DNSResourceClass::NONE,
            "ANY" => DNSResourceClass::ANY,
            other => {
                let code = other
                    .strip_prefix("CLASS")
                    .and_then(|digits| digits.parse::<u16>().ok())
                    .ok_or_else(|| format!("unknown RR class: {s}"))?;
                DNSResourceClass::from(code)
            }
        };
        Ok(qclass)
    }
}

impl fmt::Display for DNSResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceClass::Unknown(code) => write!(f, "CLASS{code}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_round_trip() {
        for qtype in [
            DNSResourceType::A,
            DNSResourceType::SOA,
            DNSResourceType::AAAA,
            DNSResourceType::AXFR,
            DNSResourceType::IXFR,
            DNSResourceType::ANY,
            DNSResourceType::Unknown(9999),
        ] {
            assert_eq!(DNSResourceType::from(u16::from(qtype)), qtype);
        }
    }

    #[test]
    fn test_type_from_str() {
        assert_eq!("soa".parse::<DNSResourceType>().unwrap(), DNSResourceType::SOA);
        assert_eq!(
            "TYPE251".parse::<DNSResourceType>().unwrap(),
            DNSResourceType::IXFR
        );
        assert_eq!(
            "TYPE38".parse::<DNSResourceType>().unwrap(),
            DNSResourceType::A6
        );
        assert!("BADTYPE".parse::<DNSResourceType>().is_err());
    }

    #[test]
    fn test_class_from_str() {
        assert_eq!("IN".parse::<DNSResourceClass>().unwrap(), DNSResourceClass::IN);
        assert_eq!("ch".parse::<DNSResourceClass>().unwrap(), DNSResourceClass::CH);
        assert_eq!(
            "CLASS42".parse::<DNSResourceClass>().unwrap(),
            DNSResourceClass::Unknown(42)
        );
        assert!("NOCLASS".parse::<DNSResourceClass>().is_err());
    }
}
