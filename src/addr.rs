//! Outer transport endpoint: parse literal "A.B.C.D:port" / "[v6]:port"
//! strings and hold them as a small value type.
//!
//! Grounded on `original_source/addr.h`'s `addr_ipv4`/`addr_ipv6` parse
//! rules: a v6 literal is bracket-delimited, a v4 literal is dotted.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::{Error, Result};

/// An outer endpoint: family, IP bytes, port. Copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
	V4(Ipv4Addr, u16),
	V6(Ipv6Addr, u16),
}

impl Endpoint {
	pub fn parse(s: &str) -> Result<Self> {
		let addr: SocketAddr = s
			.parse()
			.map_err(|_| Error::AddrParse(s.to_string()))?;
		Ok(match addr {
			SocketAddr::V4(v4) => Endpoint::V4(*v4.ip(), v4.port()),
			SocketAddr::V6(v6) => Endpoint::V6(*v6.ip(), v6.port()),
		})
	}

	pub fn port(&self) -> u16 {
		match self {
			Endpoint::V4(_, p) | Endpoint::V6(_, p) => *p,
		}
	}

	pub fn is_v4(&self) -> bool {
		matches!(self, Endpoint::V4(..))
	}

	pub fn is_v6(&self) -> bool {
		matches!(self, Endpoint::V6(..))
	}
}

impl From<Endpoint> for SocketAddr {
	fn from(e: Endpoint) -> SocketAddr {
		match e {
			Endpoint::V4(ip, port) => SocketAddr::V4(SocketAddrV4::new(ip, port)),
			Endpoint::V6(ip, port) => SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)),
		}
	}
}

impl From<SocketAddr> for Endpoint {
	fn from(addr: SocketAddr) -> Endpoint {
		match addr {
			SocketAddr::V4(v4) => Endpoint::V4(*v4.ip(), v4.port()),
			SocketAddr::V6(v6) => Endpoint::V6(*v6.ip(), v6.port()),
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Endpoint::V4(ip, port) => write!(f, "{ip}:{port}"),
			Endpoint::V6(ip, port) => write!(f, "[{ip}]:{port}"),
		}
	}
}
