//! Stream AEAD framing (`aead_iter`, spec.md §4.3).
//!
//! Per direction: a 96-bit big-endian counter seeded from a one-time
//! nonce prefix (random on the encrypt side, read off the wire on the
//! decrypt side), incremented by one on every AEAD call. A logical
//! message therefore advances the counter by two: one tick for the
//! encrypted length, one for the encrypted body (spec.md §9's Open
//! Question — both sides must use this exact cadence).
//!
//! Grounded on `original_source/cipher.h`'s `aead_iter<Aead>` (there the
//! counter is a `BIGNUM`, incremented with `BN_add_word(iv, 1)`; a plain
//! big-endian integer is the idiomatic replacement since the counter
//! never needs more than 96 bits).

use super::Aead;
use crate::error::{Error, Result};

/// Counter state for one direction of one connection. Not reused across
/// connections: a fresh `Counter` is seeded per direction per connection.
struct Counter {
	seed: Option<[u8; 12]>,
	value: u128,
}

impl Counter {
	fn new() -> Self {
		Self { seed: None, value: 0 }
	}

	fn seed(&mut self, prefix: &[u8]) {
		let mut buf = [0u8; 12];
		buf.copy_from_slice(&prefix[..12.min(prefix.len())]);
		self.value = u128::from_be_bytes({
			let mut padded = [0u8; 16];
			padded[4..].copy_from_slice(&buf);
			padded
		});
		self.seed = Some(buf);
	}

	fn is_seeded(&self) -> bool {
		self.seed.is_some()
	}

	/// Read the current counter as a 12-byte big-endian nonce, then
	/// advance by one. One call per AEAD invocation.
	fn next_nonce(&mut self) -> [u8; 12] {
		let bytes = self.value.to_be_bytes();
		let mut nonce = [0u8; 12];
		nonce.copy_from_slice(&bytes[4..]);
		self.value = self.value.wrapping_add(1);
		nonce
	}
}

/// Per-direction stream AEAD state. A connection owns two of these, one
/// per direction (encrypt and decrypt use independent counters, which is
/// why `stcp_conn` holds one `AeadIter` rather than sharing state
/// between directions).
pub struct AeadIter {
	cipher: Box<dyn Aead>,
	counter: Counter,
}

impl AeadIter {
	pub fn new(cipher: Box<dyn Aead>) -> Self {
		Self { cipher, counter: Counter::new() }
	}

	pub fn nonce_size(&self) -> usize {
		self.cipher.nonce_size()
	}

	pub fn tag_size(&self) -> usize {
		self.cipher.tag_size()
	}

	pub fn is_seeded(&self) -> bool {
		self.counter.is_seeded()
	}

	/// Seed this direction's counter from a nonce prefix: freshly
	/// generated for the encrypt direction, read off the wire for the
	/// decrypt direction.
	pub fn seed(&mut self, prefix: &[u8]) {
		self.counter.seed(prefix);
	}

	/// Encrypt one record (either the 2-byte length or the body).
	/// Consumes exactly one counter tick.
	pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let nonce = self.counter.next_nonce();
		let (ciphertext, tag) = self.cipher.encrypt(&nonce, plaintext)?;
		let mut out = ciphertext;
		out.extend_from_slice(&tag);
		Ok(out)
	}

	/// Decrypt one record. `frame` is ciphertext ∥ tag. Consumes exactly
	/// one counter tick, mirroring the encrypt side.
	pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
		let tag_size = self.cipher.tag_size();
		if frame.len() < tag_size {
			return Err(Error::Truncated);
		}
		let nonce = self.counter.next_nonce();
		let ciphertext = &frame[..frame.len() - tag_size];
		let tag = &frame[frame.len() - tag_size..];
		let plaintext = self.cipher.decrypt(&nonce, ciphertext, tag)?;
		if plaintext.is_empty() {
			// spec.md §9: zero-length decrypted record is unexercised by
			// the original; treated here as a decrypt failure.
			return Err(Error::DecryptFailed);
		}
		Ok(plaintext)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::aead::CipherKind;

	fn pair() -> (AeadIter, AeadIter) {
		let key = vec![3u8; CipherKind::ChaCha20Poly1305.key_size()];
		let enc = AeadIter::new(CipherKind::ChaCha20Poly1305.new_cipher(&key).unwrap());
		let dec = AeadIter::new(CipherKind::ChaCha20Poly1305.new_cipher(&key).unwrap());
		(enc, dec)
	}

	#[test]
	fn round_trips_sequence() {
		let (mut enc, mut dec) = pair();
		let prefix = [7u8; 12];
		enc.seed(&prefix);
		dec.seed(&prefix);

		for msg in [&b"hello"[..], &b"world, a bit longer this time"[..], &b"x"[..]] {
			let frame = enc.encrypt(msg).unwrap();
			assert_eq!(dec.decrypt(&frame).unwrap(), msg);
		}
	}

	#[test]
	fn counter_desync_is_rejected() {
		let (mut enc, mut dec) = pair();
		let prefix = [7u8; 12];
		enc.seed(&prefix);
		dec.seed(&prefix);

		let _ = enc.encrypt(b"one").unwrap();
		// reset the sender's counter without telling the receiver
		enc.seed(&prefix);
		let frame = enc.encrypt(b"two").unwrap();
		assert!(matches!(dec.decrypt(&frame), Err(Error::DecryptFailed)));
	}

	#[test]
	fn advances_two_per_logical_message() {
		let (mut enc, _dec) = pair();
		enc.seed(&[0u8; 12]);
		let n0 = enc.counter.value;
		let _ = enc.encrypt(b"len-record-stand-in").unwrap();
		let _ = enc.encrypt(b"body-record-stand-in").unwrap();
		assert_eq!(enc.counter.value, n0 + 2);
	}
}
