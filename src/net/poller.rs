//! Level-triggered readiness loop for TCP mode (spec.md §4.7), raw
//! `libc` epoll.
//!
//! Grounded on `original_source/linux/epoll.h`'s `epoll<Data>`: a single
//! epoll fd, one registration per socket, read interest always on,
//! write interest toggled on demand by `set_writable`. Tokens stand in
//! for the `Data` the original stores inline in its epoll entry; this
//! crate looks the token up in its own connection table instead.

use std::os::unix::io::RawFd;

use crate::error::{Error, Result};

pub struct Event {
	pub token: u64,
	pub readable: bool,
	pub writable: bool,
}

pub struct Poller {
	epfd: RawFd,
}

impl Poller {
	pub fn new() -> Result<Self> {
		let epfd = unsafe { libc::epoll_create1(0) };
		if epfd < 0 {
			return Err(Error::SocketIo(std::io::Error::last_os_error().to_string()));
		}
		Ok(Self { epfd })
	}

	/// Register `fd` for read interest, tagged with `token`.
	pub fn add(&self, fd: RawFd, token: u64) -> Result<()> {
		let mut ev = libc::epoll_event { events: libc::EPOLLIN as u32, u64: token };
		self.ctl(libc::EPOLL_CTL_ADD, fd, &mut ev)
	}

	pub fn del(&self, fd: RawFd) -> Result<()> {
		let err = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
		if err < 0 {
			return Err(Error::SocketIo(std::io::Error::last_os_error().to_string()));
		}
		Ok(())
	}

	/// Turn write-readiness notifications for `fd` on or off, leaving
	/// read interest untouched.
	pub fn set_writable(&self, fd: RawFd, token: u64, want: bool) -> Result<()> {
		let events = if want { libc::EPOLLIN | libc::EPOLLOUT } else { libc::EPOLLIN };
		let mut ev = libc::epoll_event { events: events as u32, u64: token };
		self.ctl(libc::EPOLL_CTL_MOD, fd, &mut ev)
	}

	fn ctl(&self, op: libc::c_int, fd: RawFd, ev: *mut libc::epoll_event) -> Result<()> {
		let err = unsafe { libc::epoll_ctl(self.epfd, op, fd, ev) };
		if err < 0 {
			return Err(Error::SocketIo(std::io::Error::last_os_error().to_string()));
		}
		Ok(())
	}

	/// Block up to `timeout_ms` (negative blocks indefinitely) and
	/// return the set of ready tokens.
	pub fn wait(&self, timeout_ms: i32) -> Result<Vec<Event>> {
		let mut raw = vec![libc::epoll_event { events: 0, u64: 0 }; 256];
		let n = unsafe { libc::epoll_wait(self.epfd, raw.as_mut_ptr(), raw.len() as i32, timeout_ms) };
		if n < 0 {
			let err = std::io::Error::last_os_error();
			if err.kind() == std::io::ErrorKind::Interrupted {
				return Ok(Vec::new());
			}
			return Err(Error::SocketIo(err.to_string()));
		}
		Ok(raw[..n as usize]
			.iter()
			.map(|ev| Event {
				token: ev.u64,
				readable: ev.events & (libc::EPOLLIN as u32) != 0,
				writable: ev.events & (libc::EPOLLOUT as u32) != 0,
			})
			.collect())
	}
}

impl Drop for Poller {
	fn drop(&mut self) {
		unsafe { libc::close(self.epfd) };
	}
}
