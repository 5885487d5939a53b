//! Datagram AEAD framing (`aead_indep`, spec.md §4.2).
//!
//! Wire format: `nonce(nonce_size) ∥ ciphertext(plaintext_len) ∥ tag(tag_size)`.
//! Each datagram is self-contained and independently decryptable; nonce
//! uniqueness rests entirely on the RNG (birthday bound ≈ 2^48 for a
//! 96-bit nonce — fine for a personal tunnel, per spec.md §4.2).
//!
//! No replay protection: a captured datagram can be resent and will
//! decrypt successfully. Left as an open question by spec.md §9.
//!
//! Grounded on `original_source/cipher.h`'s `aead_indep<Aead>`.

use aead::OsRng;
use aead::rand_core::RngCore;

use super::Aead;
use crate::error::{Error, Result};

pub struct AeadIndep {
	cipher: Box<dyn Aead>,
}

impl AeadIndep {
	pub fn new(cipher: Box<dyn Aead>) -> Self {
		Self { cipher }
	}

	pub fn overhead(&self) -> usize {
		self.cipher.nonce_size() + self.cipher.tag_size()
	}

	/// Encrypt one datagram's worth of plaintext. Returns the full wire
	/// frame (nonce ∥ ciphertext ∥ tag).
	pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let nonce_size = self.cipher.nonce_size();
		let mut nonce = vec![0u8; nonce_size];
		OsRng.fill_bytes(&mut nonce);

		let (ciphertext, tag) = self.cipher.encrypt(&nonce, plaintext)?;

		let mut out = Vec::with_capacity(nonce_size + ciphertext.len() + tag.len());
		out.extend_from_slice(&nonce);
		out.extend_from_slice(&ciphertext);
		out.extend_from_slice(&tag);
		Ok(out)
	}

	/// Decrypt a received datagram. Never returns partial plaintext: on
	/// tag mismatch or truncation the whole frame is rejected.
	pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>> {
		let nonce_size = self.cipher.nonce_size();
		let tag_size = self.cipher.tag_size();
		if frame.len() < nonce_size + tag_size {
			return Err(Error::Truncated);
		}

		let nonce = &frame[..nonce_size];
		let tag = &frame[frame.len() - tag_size..];
		let ciphertext = &frame[nonce_size..frame.len() - tag_size];

		self.cipher.decrypt(nonce, ciphertext, tag)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::aead::CipherKind;

	fn indep(kind: CipherKind) -> AeadIndep {
		let key = vec![9u8; kind.key_size()];
		AeadIndep::new(kind.new_cipher(&key).unwrap())
	}

	#[test]
	fn round_trips_both_ciphers() {
		for kind in [CipherKind::Aes128Gcm, CipherKind::ChaCha20Poly1305] {
			let f = indep(kind);
			let frame = f.encrypt(b"hello").unwrap();
			assert_eq!(frame.len(), 5 + f.overhead());
			assert_eq!(f.decrypt(&frame).unwrap(), b"hello");
		}
	}

	#[test]
	fn tamper_is_rejected() {
		let f = indep(CipherKind::ChaCha20Poly1305);
		let mut frame = f.encrypt(b"hello").unwrap();
		let last = frame.len() - 1;
		frame[last] ^= 1;
		assert!(matches!(f.decrypt(&frame), Err(Error::DecryptFailed)));
	}

	#[test]
	fn truncated_is_rejected() {
		let f = indep(CipherKind::ChaCha20Poly1305);
		assert!(matches!(f.decrypt(&[0u8; 4]), Err(Error::Truncated)));
	}

	#[test]
	fn distinct_nonces() {
		let f = indep(CipherKind::ChaCha20Poly1305);
		let a = f.encrypt(b"x").unwrap();
		let b = f.encrypt(b"x").unwrap();
		assert_ne!(&a[..12], &b[..12]);
	}
}
