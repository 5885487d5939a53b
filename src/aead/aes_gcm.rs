//! AES-128-GCM: key 16, nonce 12, tag 16.

use aead::{AeadInPlace, KeyInit};
use aead::generic_array::GenericArray;
use aes_gcm::Aes128Gcm as Cipher;

use crate::error::{Error, Result};

pub struct Aes128Gcm {
	cipher: Cipher,
}

impl Aes128Gcm {
	pub fn new(key: &[u8]) -> Result<Self> {
		if key.len() != 16 {
			return Err(Error::InvalidKey { expected: 16, got: key.len() });
		}
		Ok(Self { cipher: Cipher::new_from_slice(key).expect("key length checked above") })
	}
}

impl super::Aead for Aes128Gcm {
	fn key_size(&self) -> usize {
		16
	}
	fn nonce_size(&self) -> usize {
		12
	}
	fn tag_size(&self) -> usize {
		16
	}

	fn encrypt(&self, nonce: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
		let nonce = GenericArray::from_slice(nonce);
		let mut buf = plaintext.to_vec();
		let tag = self
			.cipher
			.encrypt_in_place_detached(nonce, b"", &mut buf)
			.map_err(|_| Error::DecryptFailed)?;
		Ok((buf, tag.to_vec()))
	}

	fn decrypt(&self, nonce: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
		let nonce = GenericArray::from_slice(nonce);
		let tag = GenericArray::from_slice(tag);
		let mut buf = ciphertext.to_vec();
		self.cipher
			.decrypt_in_place_detached(nonce, b"", &mut buf, tag)
			.map_err(|_| Error::DecryptFailed)?;
		Ok(buf)
	}
}

#[cfg(test)]
mod tests {
	use super::super::Aead as _;
	use super::*;

	#[test]
	fn round_trips() {
		let key = [7u8; 16];
		let cipher = Aes128Gcm::new(&key).unwrap();
		let nonce = [1u8; 12];
		let (ct, tag) = cipher.encrypt(&nonce, b"hello world").unwrap();
		let pt = cipher.decrypt(&nonce, &ct, &tag).unwrap();
		assert_eq!(pt, b"hello world");
	}

	#[test]
	fn tamper_detected() {
		let key = [7u8; 16];
		let cipher = Aes128Gcm::new(&key).unwrap();
		let nonce = [1u8; 12];
		let (mut ct, tag) = cipher.encrypt(&nonce, b"hello world").unwrap();
		ct[0] ^= 1;
		assert!(cipher.decrypt(&nonce, &ct, &tag).is_err());
	}

	#[test]
	fn rejects_bad_key_len() {
		assert!(Aes128Gcm::new(&[0u8; 8]).is_err());
	}
}
