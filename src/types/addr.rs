use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Number of bytes that can form an IP value or a span limit.
pub(crate) const VAR_SIZE: usize = 16;

//------------ IpType --------------------------------------------------------

/// The IP version an address or a graph relates to.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum IpType {
    V4,
    V6,
    Invalid,
}

impl IpType {
    /// The type for a version byte as stored in a graph record. Anything
    /// other than 4 or 6 is invalid rather than an error, so a graph with
    /// an unknown version is simply never selected.
    pub fn from_version(version: u8) -> Self {
        match version {
            4 => IpType::V4,
            6 => IpType::V6,
            _ => IpType::Invalid,
        }
    }
}

//------------ IpAddress -----------------------------------------------------

/// An IP address held as sixteen bytes, most significant first.
///
/// An IPv4 address occupies the first four bytes with the remainder zero,
/// mirroring the padded value arrays the graph data is built against.
/// Bit 0 is the high order bit of the first byte.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct IpAddress {
    ip_type: IpType,
    value: [u8; VAR_SIZE],
}

impl IpAddress {
    pub fn ip_type(&self) -> IpType {
        self.ip_type
    }

    pub fn value(&self) -> &[u8; VAR_SIZE] {
        &self.value
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        let mut value = [0; VAR_SIZE];
        value[..4].copy_from_slice(&addr.octets());
        IpAddress {
            ip_type: IpType::V4,
            value,
        }
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress {
            ip_type: IpType::V6,
            value: addr.octets(),
        }
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(addr) => addr.into(),
            IpAddr::V6(addr) => addr.into(),
        }
    }
}

impl FromStr for IpAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpAddr::from_str(s).map(Into::into)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ip_type {
            IpType::V4 => {
                let mut octets = [0; 4];
                octets.copy_from_slice(&self.value[..4]);
                write!(f, "{}", Ipv4Addr::from(octets))
            }
            IpType::V6 => write!(f, "{}", Ipv6Addr::from(self.value)),
            IpType::Invalid => write!(f, "invalid"),
        }
    }
}
