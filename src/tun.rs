//! Blocking TUN device wrapper (spec.md §4.6), POSIX-only.
//!
//! Grounded on `original_source/linux/tun.cc`: open `/dev/net/tun`,
//! `ioctl(TUNSETIFF)` with `IFF_TUN | IFF_NO_PI` to get a layer-3,
//! no-packet-info interface, then plain blocking `read`/`write`.
//!
//! IPv6 is out of scope for the running pipeline (spec.md's
//! original drives only an IPv4 session table), so this wrapper reads
//! and writes raw IP frames without distinguishing versions; the
//! version sniff happens in `packet.rs`.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::error::{Error, Result};

const IFNAMSIZ: usize = 16;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;
// _IOW('T', 202, int), computed the same way the kernel's <linux/if_tun.h> does.
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

#[repr(C)]
struct IfReq {
	ifr_name: [libc::c_char; IFNAMSIZ],
	ifr_flags: libc::c_short,
	_pad: [u8; 22],
}

pub struct Tun {
	fd: RawFd,
	name: String,
}

impl Tun {
	/// Open or create the TUN interface named `name`. An empty name lets
	/// the kernel pick one (e.g. `tun0`); the chosen name is reported
	/// back via `name()`.
	pub fn open(name: &str) -> Result<Self> {
		if name.len() >= IFNAMSIZ {
			return Err(Error::TunOpen(format!("name `{name}` is too long")));
		}

		let path = CString::new("/dev/net/tun").expect("no interior nul");
		let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
		if fd < 0 {
			return Err(Error::TunOpen(std::io::Error::last_os_error().to_string()));
		}

		let mut req = IfReq { ifr_name: [0; IFNAMSIZ], ifr_flags: IFF_TUN | IFF_NO_PI, _pad: [0; 22] };
		for (dst, src) in req.ifr_name.iter_mut().zip(name.bytes()) {
			*dst = src as libc::c_char;
		}

		let err = unsafe { libc::ioctl(fd, TUNSETIFF, &mut req as *mut IfReq) };
		if err < 0 {
			let io_err = std::io::Error::last_os_error();
			unsafe { libc::close(fd) };
			return Err(Error::TunOpen(io_err.to_string()));
		}

		let actual_name = req
			.ifr_name
			.iter()
			.take_while(|&&b| b != 0)
			.map(|&b| b as u8 as char)
			.collect();

		Ok(Self { fd, name: actual_name })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
		let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
		if n < 0 {
			return Err(Error::TunIo(std::io::Error::last_os_error()));
		}
		Ok(n as usize)
	}

	pub fn write(&self, buf: &[u8]) -> Result<usize> {
		let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
		if n < 0 {
			return Err(Error::TunIo(std::io::Error::last_os_error()));
		}
		Ok(n as usize)
	}

	pub fn as_raw_fd(&self) -> RawFd {
		self.fd
	}
}

impl Drop for Tun {
	fn drop(&mut self) {
		unsafe { libc::close(self.fd) };
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Opening a real TUN device needs CAP_NET_ADMIN, which the test
	// sandbox doesn't have; this just checks the name-length guard runs
	// before any syscall.
	#[test]
	fn rejects_overlong_name() {
		let name = "a".repeat(IFNAMSIZ);
		assert!(matches!(Tun::open(&name), Err(Error::TunOpen(_))));
	}
}
