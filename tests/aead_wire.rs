//! End-to-end checks of the two AEAD framings without any networking,
//! covering spec.md §8's tamper/round-trip scenarios at the wire-format
//! level.

use subtun::aead::CipherKind;
use subtun::aead::indep::AeadIndep;
use subtun::aead::iter::AeadIter;
use subtun::error::Error;

#[test]
fn datagram_framing_round_trips_and_rejects_tamper() {
	let key = vec![1u8; CipherKind::ChaCha20Poly1305.key_size()];
	let indep = AeadIndep::new(CipherKind::ChaCha20Poly1305.new_cipher(&key).unwrap());

	let mut frame = indep.encrypt(b"a layer-3 packet, stand-in").unwrap();
	assert_eq!(indep.decrypt(&frame).unwrap(), b"a layer-3 packet, stand-in");

	let last = frame.len() - 1;
	frame[last] ^= 0xFF;
	assert!(matches!(indep.decrypt(&frame), Err(Error::DecryptFailed)));
}

#[test]
fn stream_framing_survives_many_messages_with_matching_cadence() {
	let key = vec![2u8; CipherKind::Aes128Gcm.key_size()];
	let mut enc = AeadIter::new(CipherKind::Aes128Gcm.new_cipher(&key).unwrap());
	let mut dec = AeadIter::new(CipherKind::Aes128Gcm.new_cipher(&key).unwrap());

	let prefix = [9u8; 12];
	enc.seed(&prefix);
	dec.seed(&prefix);

	for i in 0..50u32 {
		let msg = format!("message number {i}");
		let len_record = enc.encrypt(&(msg.len() as u16).to_be_bytes()).unwrap();
		let body_record = enc.encrypt(msg.as_bytes()).unwrap();

		let len_bytes = dec.decrypt(&len_record).unwrap();
		let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
		assert_eq!(len, msg.len());

		let body = dec.decrypt(&body_record).unwrap();
		assert_eq!(body, msg.as_bytes());
	}
}
