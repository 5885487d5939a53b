//! Non-blocking TCP connection with ring-buffer-backed writes
//! (`tcp_conn`), and its encrypted stream variant (`stcp_conn`),
//! spec.md §4.5.
//!
//! Grounded on `original_source/tcp.h`. `tcp_conn::send` tries a direct
//! `send()` first and only falls back to the write buffer on partial
//! writes or `EWOULDBLOCK`; `stcp_conn` layers the length-prefixed,
//! `aead_iter`-framed record protocol on top, with a persistent read
//! buffer so a message split across several non-blocking reads survives
//! between `poller` wakeups (the state-machine shape follows
//! `examples/other_examples/.../tcp/aead.rs`'s `DecryptReadState`,
//! adapted from Tokio polling to plain non-blocking retries).

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream};

use aead::OsRng;
use aead::rand_core::RngCore;

use crate::addr::Endpoint;
use crate::aead::CipherKind;
use crate::aead::iter::AeadIter;
use crate::error::{Error, Result};
use crate::ring_buffer::RingBuffer;

// The original (`tcp.h`) sizes both ring buffers at a flat 4096 despite
// allowing records up to 0x3FFF: fine there because it never actually
// pushes a tun-sized packet anywhere near that ceiling, but a legitimate
// max-length record (spec.md's record-ceiling edge case) would overflow
// a 4096 buffer outright. Size both buffers to the protocol's own limit
// instead of a size that only works by accident.
const MAX_RECORD: usize = 0x3FFF + 16; // largest length/body record plus AEAD tag
const WRITE_BUFFER_CAP: usize = MAX_RECORD + 64;
const READ_BUFFER_CAP: usize = MAX_RECORD + 64;

/// A non-blocking TCP stream with an outgoing ring buffer absorbing
/// partial/`EWOULDBLOCK` writes.
pub struct TcpConn {
	stream: TcpStream,
	peer: Endpoint,
	write_buf: RingBuffer,
}

impl TcpConn {
	fn new(stream: TcpStream, peer: Endpoint) -> Result<Self> {
		stream.set_nonblocking(true).map_err(|e| Error::SocketIo(e.to_string()))?;
		Ok(Self { stream, peer, write_buf: RingBuffer::new(WRITE_BUFFER_CAP) })
	}

	pub fn peer(&self) -> Endpoint {
		self.peer
	}

	pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
		use std::os::unix::io::AsRawFd;
		self.stream.as_raw_fd()
	}

	fn write_to_buffer(&mut self, buf: &[u8]) -> Result<()> {
		self.write_buf.append(buf)
	}

	/// Queue `buf` for sending. Always "succeeds" from the caller's
	/// perspective (matches `original_source/tcp.h`'s `tcp_conn::send`);
	/// backpressure shows up as `Error::WriteBufferOverflow` if the
	/// ring buffer itself is full.
	pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
		if !self.write_buf.is_empty() {
			self.write_to_buffer(buf)?;
			return Ok(buf.len());
		}

		match self.stream.write(buf) {
			Ok(n) if n < buf.len() => {
				self.write_to_buffer(&buf[n..])?;
				Ok(buf.len())
			}
			Ok(_) => Ok(buf.len()),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
				self.write_to_buffer(buf)?;
				Ok(buf.len())
			}
			Err(e) => Err(Error::SocketIo(e.to_string())),
		}
	}

	/// `Ok(None)` on `EWOULDBLOCK`, `Ok(Some(0))` on orderly close,
	/// `Ok(Some(n))` on `n` bytes read.
	pub fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
		match self.stream.read(buf) {
			Ok(n) => Ok(Some(n)),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
			Err(e) => Err(Error::SocketIo(e.to_string())),
		}
	}

	/// Drain as much of the write buffer as the socket accepts, handing
	/// the buffer's contiguous regions straight to `write` instead of
	/// copying them out first (`original_source/tcp.h`'s `on_writable`
	/// does the equivalent with `m_write_buffer.poll(lambda)`). Returns
	/// whether the poller still needs to wait for writability.
	pub fn on_writable(&mut self) -> Result<bool> {
		let Self { stream, write_buf, .. } = self;
		write_buf.poll_with(|chunk| match stream.write(chunk) {
			Ok(n) => Ok(n),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
			Err(e) => Err(Error::SocketIo(e.to_string())),
		})?;
		Ok(!write_buf.is_empty())
	}

	pub fn need_to_wait_write(&self) -> bool {
		!self.write_buf.is_empty()
	}
}

pub struct TcpListener {
	listener: StdTcpListener,
}

impl TcpListener {
	pub fn bind(local: Endpoint) -> Result<Self> {
		let listener = StdTcpListener::bind(SocketAddr::from(local))
			.map_err(|e| Error::SocketBind(e.to_string()))?;
		listener.set_nonblocking(true).map_err(|e| Error::SocketBind(e.to_string()))?;
		Ok(Self { listener })
	}

	pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
		use std::os::unix::io::AsRawFd;
		self.listener.as_raw_fd()
	}

	/// `Ok(None)` when there's no pending connection right now.
	pub fn accept(&self) -> Result<Option<TcpConn>> {
		match self.listener.accept() {
			Ok((stream, peer)) => Ok(Some(TcpConn::new(stream, Endpoint::from(peer))?)),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
			Err(e) => Err(Error::SocketIo(e.to_string())),
		}
	}
}

pub fn connect(peer: Endpoint) -> Result<TcpConn> {
	let stream = TcpStream::connect(SocketAddr::from(peer)).map_err(|e| Error::SocketIo(e.to_string()))?;
	TcpConn::new(stream, peer)
}

enum RecvState {
	WaitNonce,
	ReadLength,
	ReadBody(usize),
}

/// Encrypted stream framing over a `TcpConn`: nonce prefix, then a
/// sequence of length-prefixed `aead_iter` records (spec.md §4.3/§4.5).
pub struct StcpConn {
	conn: TcpConn,
	send: AeadIter,
	recv: AeadIter,
	read_buf: RingBuffer,
	recv_state: RecvState,
	send_nonce_sent: bool,
}

impl StcpConn {
	pub fn new(conn: TcpConn, cipher: CipherKind, key: &[u8]) -> Result<Self> {
		let send = AeadIter::new(cipher.new_cipher(key)?);
		let recv = AeadIter::new(cipher.new_cipher(key)?);
		Ok(Self {
			conn,
			send,
			recv,
			read_buf: RingBuffer::new(READ_BUFFER_CAP),
			recv_state: RecvState::WaitNonce,
			send_nonce_sent: false,
		})
	}

	pub fn peer(&self) -> Endpoint {
		self.conn.peer()
	}

	pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
		self.conn.as_raw_fd()
	}

	pub fn on_writable(&mut self) -> Result<bool> {
		self.conn.on_writable()
	}

	pub fn need_to_wait_write(&self) -> bool {
		self.conn.need_to_wait_write()
	}

	/// Encrypt and queue `plaintext` as one record. Up to `0x3FFF` bytes.
	pub fn send(&mut self, plaintext: &[u8]) -> Result<usize> {
		if plaintext.len() > 0x3FFF {
			return Err(Error::SendTooLarge(plaintext.len()));
		}

		if !self.send_nonce_sent {
			let mut prefix = vec![0u8; self.send.nonce_size()];
			OsRng.fill_bytes(&mut prefix);
			self.send.seed(&prefix);
			self.conn.send(&prefix)?;
			self.send_nonce_sent = true;
		}

		let len_record = self.send.encrypt(&(plaintext.len() as u16).to_be_bytes())?;
		self.conn.send(&len_record)?;
		let body_record = self.send.encrypt(plaintext)?;
		self.conn.send(&body_record)?;
		Ok(plaintext.len())
	}

	/// Pull any available bytes off the socket into the read buffer,
	/// then try to assemble one full record. `Ok(None)` means the
	/// record isn't complete yet (wait for the next readable event).
	pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
		self.pump()?;
		loop {
			match self.recv_state {
				RecvState::WaitNonce => {
					let n = self.recv.nonce_size();
					if self.read_buf.size() < n {
						return Ok(None);
					}
					let mut prefix = vec![0u8; n];
					self.read_buf.peek(&mut prefix);
					self.read_buf.consume(n);
					self.recv.seed(&prefix);
					self.recv_state = RecvState::ReadLength;
				}
				RecvState::ReadLength => {
					let head_size = 2 + self.recv.tag_size();
					if self.read_buf.size() < head_size {
						return Ok(None);
					}
					let mut head = vec![0u8; head_size];
					self.read_buf.peek(&mut head);
					self.read_buf.consume(head_size);
					let len_bytes = self.recv.decrypt(&head)?;
					if len_bytes.len() != 2 {
						return Err(Error::DecryptFailed);
					}
					let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
					if len > 0x3FFF {
						return Err(Error::DecryptFailed);
					}
					self.recv_state = RecvState::ReadBody(len);
				}
				RecvState::ReadBody(len) => {
					let body_size = len + self.recv.tag_size();
					if self.read_buf.size() < body_size {
						return Ok(None);
					}
					let mut body = vec![0u8; body_size];
					self.read_buf.peek(&mut body);
					self.read_buf.consume(body_size);
					let plaintext = self.recv.decrypt(&body)?;
					self.recv_state = RecvState::ReadLength;
					return Ok(Some(plaintext));
				}
			}
		}
	}

	fn pump(&mut self) -> Result<()> {
		let mut tmp = [0u8; 2048];
		loop {
			match self.conn.recv(&mut tmp)? {
				None => return Ok(()),
				Some(0) => return Err(Error::SocketIo("connection closed".to_string())),
				Some(n) => self.read_buf.append(&tmp[..n])?,
			}
		}
	}
}
