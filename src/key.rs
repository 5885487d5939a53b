//! PSK generation and loading (spec.md §6's key provisioning).
//!
//! Grounded on the teacher's original `key.rs` (`gen_psk`/`init_cipher`:
//! base64 over raw key bytes, read from a file path given on the
//! command line); generalized here over `CipherKind` instead of being
//! monomorphic over one `aead::KeyInit` type, since this crate supports
//! two algorithms selected at startup rather than one fixed at compile
//! time. Key material is wrapped in `Zeroizing` so it's scrubbed from
//! memory once dropped.

use aead::OsRng;
use aead::rand_core::RngCore;
use base64::prelude::{BASE64_STANDARD_NO_PAD as BASE64, Engine as _};
use zeroize::Zeroizing;

use crate::aead::CipherKind;
use crate::error::{Error, Result};

/// Generate a fresh base64-encoded PSK sized for `cipher`.
pub fn gen_psk(cipher: CipherKind) -> String {
	let mut key = vec![0u8; cipher.key_size()];
	OsRng.fill_bytes(&mut key);
	BASE64.encode(&key)
}

/// Read a base64 PSK from `path` and check it's the right length for
/// `cipher`.
pub fn load_key(path: &str, cipher: CipherKind) -> Result<Zeroizing<Vec<u8>>> {
	let raw = std::fs::read(path).map_err(|e| Error::KeyFile(e.to_string()))?;
	let decoded = BASE64.decode(raw.trim_ascii()).map_err(|e| Error::KeyFile(e.to_string()))?;
	if decoded.len() != cipher.key_size() {
		return Err(Error::InvalidKey { expected: cipher.key_size(), got: decoded.len() });
	}
	Ok(Zeroizing::new(decoded))
}
