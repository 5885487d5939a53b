//! Exercises `StcpConn` over a real loopback TCP connection: nonce
//! handshake, several framed messages, and a message near the 0x3FFF
//! record ceiling (spec.md §8's TCP framing scenario).

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use subtun::addr::Endpoint;
use subtun::aead::CipherKind;
use subtun::error::Error;
use subtun::net::tcp::{StcpConn, TcpListener, connect};

fn loopback(port: u16) -> Endpoint {
	Endpoint::V4(std::net::Ipv4Addr::LOCALHOST, port)
}

fn retry<T>(mut f: impl FnMut() -> subtun::error::Result<Option<T>>) -> T {
	loop {
		if let Some(v) = f().unwrap() {
			return v;
		}
		thread::sleep(Duration::from_millis(5));
	}
}

#[test]
fn framed_messages_round_trip_over_tcp() {
	let key = vec![3u8; CipherKind::ChaCha20Poly1305.key_size()];
	let key_server = key.clone();
	let server_thread = thread::spawn(move || {
		let listener = TcpListener::bind(loopback(7744)).unwrap();
		let plain = retry(|| listener.accept());
		let mut conn = StcpConn::new(plain, CipherKind::ChaCha20Poly1305, &key_server).unwrap();

		let mut received = Vec::new();
		for _ in 0..3 {
			let msg = retry(|| conn.try_recv());
			received.push(msg);
		}
		received
	});

	thread::sleep(Duration::from_millis(50));
	let plain = connect(loopback(7744)).unwrap();
	let mut client = StcpConn::new(plain, CipherKind::ChaCha20Poly1305, &key).unwrap();

	client.send(b"first").unwrap();
	client.send(b"a bit longer message here").unwrap();
	let big = vec![0x42u8; 0x3FFF];
	client.send(&big).unwrap();

	// Drive the write buffer in case the big message didn't fit in one
	// non-blocking write.
	while client.need_to_wait_write() {
		client.on_writable().unwrap();
		thread::sleep(Duration::from_millis(5));
	}

	let received = server_thread.join().unwrap();
	assert_eq!(received[0], b"first");
	assert_eq!(received[1], b"a bit longer message here");
	assert_eq!(received[2], big);
}

#[test]
fn oversized_send_is_rejected() {
	let key = vec![4u8; CipherKind::Aes128Gcm.key_size()];
	let listener = TcpListener::bind(loopback(7745)).unwrap();

	let server_thread = thread::spawn(move || {
		let _plain = retry(|| listener.accept());
	});

	thread::sleep(Duration::from_millis(50));
	let plain = connect(loopback(7745)).unwrap();
	let mut client = StcpConn::new(plain, CipherKind::Aes128Gcm, &key).unwrap();

	let too_big = vec![0u8; 0x4000];
	assert!(client.send(&too_big).is_err());

	server_thread.join().unwrap();
}

/// spec.md §8 scenario 6: a stalled peer fills the write buffer until
/// `Error::WriteBufferOverflow`, then resumes reading and the sender
/// recovers once `on_writable` has drained the backlog.
#[test]
fn backpressure_recovers_once_peer_resumes_reading() {
	let listener = TcpListener::bind(loopback(7746)).unwrap();
	let (resume_tx, resume_rx) = mpsc::channel::<()>();
	let (stop_tx, stop_rx) = mpsc::channel::<()>();

	let server_thread = thread::spawn(move || {
		let mut conn = retry(|| listener.accept());
		// Stall: don't touch the socket until the client has hit overflow.
		resume_rx.recv().unwrap();
		let mut buf = [0u8; 4096];
		loop {
			match conn.recv(&mut buf) {
				Ok(Some(0)) | Err(_) => break,
				_ => {}
			}
			if stop_rx.try_recv().is_ok() {
				break;
			}
			thread::sleep(Duration::from_millis(5));
		}
	});

	thread::sleep(Duration::from_millis(50));
	let mut client = connect(loopback(7746)).unwrap();

	let chunk = vec![0x5Au8; 16384];
	let deadline = Instant::now() + Duration::from_secs(5);
	let mut overflowed = false;
	while Instant::now() < deadline {
		match client.send(&chunk) {
			Ok(_) => {}
			Err(Error::WriteBufferOverflow) => {
				overflowed = true;
				break;
			}
			Err(e) => panic!("unexpected error filling write buffer: {e}"),
		}
	}
	assert!(overflowed, "write buffer never overflowed against a stalled peer");

	// Let the peer start draining the socket.
	resume_tx.send(()).unwrap();
	let deadline = Instant::now() + Duration::from_secs(5);
	while client.need_to_wait_write() && Instant::now() < deadline {
		client.on_writable().unwrap();
		thread::sleep(Duration::from_millis(5));
	}
	assert!(!client.need_to_wait_write(), "write buffer never drained after peer resumed reading");

	client.send(b"after recovery").unwrap();

	stop_tx.send(()).unwrap();
	server_thread.join().unwrap();
}
