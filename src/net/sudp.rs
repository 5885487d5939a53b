//! Secure UDP: a plain `UdpSocket` plus `aead_indep` framing (spec.md §4.5).
//!
//! Grounded on `original_source/udp.h`'s `sudp<Addr, Encrypt>`, which
//! wraps a `udp<Addr>` and runs every send/recv through `Encrypt`. The
//! blocking socket itself is `std::net::UdpSocket` rather than a hand
//! rolled raw-socket wrapper (REDESIGN FLAGS §9: UDP mode stays on
//! blocking OS threads, one per direction, so there is no need for the
//! non-blocking machinery `net::poller` provides to TCP).

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::addr::Endpoint;
use crate::aead::indep::AeadIndep;
use crate::error::{Error, Result};

/// Largest plaintext datagram this crate will pass to `send_to`. Matches
/// a conservative outer-MTU assumption (spec.md §4.5): 1500 minus IP/UDP
/// headers and AEAD overhead, rounded down.
pub const MAX_DATAGRAM: usize = 1400;

pub struct SecureUdp {
	sock: UdpSocket,
	aead: Arc<AeadIndep>,
}

impl SecureUdp {
	pub fn bind(local: Endpoint, aead: Arc<AeadIndep>) -> Result<Self> {
		Self::bind_with(local, None, aead)
	}

	/// Bind and immediately connect the socket to `peer`, matching the
	/// client's fixed-server-endpoint use (spec.md §5's client role).
	pub fn bind_connected(local: Endpoint, peer: Endpoint, aead: Arc<AeadIndep>) -> Result<Self> {
		Self::bind_with(local, Some(peer), aead)
	}

	fn bind_with(local: Endpoint, peer: Option<Endpoint>, aead: Arc<AeadIndep>) -> Result<Self> {
		let sock = UdpSocket::bind(SocketAddr::from(local))
			.map_err(|e| Error::SocketBind(e.to_string()))?;
		if let Some(peer) = peer {
			sock.connect(SocketAddr::from(peer))
				.map_err(|e| Error::SocketBind(e.to_string()))?;
		}
		Ok(Self { sock, aead })
	}

	pub fn local_addr(&self) -> Result<Endpoint> {
		let addr = self.sock.local_addr().map_err(|e| Error::SocketIo(e.to_string()))?;
		Ok(Endpoint::from(addr))
	}

	/// Encrypt `plaintext` and send it to `peer`.
	pub fn send_to(&self, plaintext: &[u8], peer: Endpoint) -> Result<usize> {
		let frame = self.aead.encrypt(plaintext)?;
		self.sock
			.send_to(&frame, SocketAddr::from(peer))
			.map_err(|e| Error::SocketIo(e.to_string()))
	}

	/// Encrypt `plaintext` and send it on an already-connected socket.
	pub fn send(&self, plaintext: &[u8]) -> Result<usize> {
		let frame = self.aead.encrypt(plaintext)?;
		self.sock.send(&frame).map_err(|e| Error::SocketIo(e.to_string()))
	}

	/// Receive one datagram and decrypt it. `buf` must be at least
	/// `MAX_DATAGRAM` plus AEAD overhead to avoid silent truncation.
	pub fn recv_from(&self, buf: &mut [u8]) -> Result<(Vec<u8>, Endpoint)> {
		let (n, from) = self.sock.recv_from(buf).map_err(|e| Error::SocketIo(e.to_string()))?;
		let plaintext = self.aead.decrypt(&buf[..n])?;
		Ok((plaintext, Endpoint::from(from)))
	}

	pub fn recv(&self, buf: &mut [u8]) -> Result<Vec<u8>> {
		let n = self.sock.recv(buf).map_err(|e| Error::SocketIo(e.to_string()))?;
		self.aead.decrypt(&buf[..n])
	}

	/// Clone the underlying fd for a second thread (one per direction,
	/// per spec.md §5's UDP threading model); the AEAD state is shared
	/// via `Arc` since encrypt/decrypt hold no mutable per-call state.
	pub fn try_clone(&self) -> Result<Self> {
		let sock = self.sock.try_clone().map_err(|e| Error::SocketIo(e.to_string()))?;
		Ok(Self { sock, aead: Arc::clone(&self.aead) })
	}
}
