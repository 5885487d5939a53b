//! Simulates the UDP server/client forwarding loop (spec.md §8's first
//! scenario) without a real tun device: synthetic IPv4 packets are
//! pushed straight through `SecureUdp` + `SessionTable`, the way
//! `pipeline::server_tun2net`/`server_net2tun` would.

use std::net::Ipv4Addr;
use std::sync::Arc;

use subtun::addr::Endpoint;
use subtun::aead::CipherKind;
use subtun::aead::indep::AeadIndep;
use subtun::net::sudp::SecureUdp;
use subtun::packet::{Vip, parse_src_ip};
use subtun::session::SessionTable;

fn loopback(port: u16) -> Endpoint {
	Endpoint::V4(Ipv4Addr::LOCALHOST, port)
}

fn synthetic_ipv4_packet(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
	let mut buf = vec![0u8; 20 + payload.len()];
	buf[0] = 0x45;
	buf[12..16].copy_from_slice(&src);
	buf[16..20].copy_from_slice(&dst);
	buf[20..].copy_from_slice(payload);
	buf
}

#[test]
fn server_learns_session_and_routes_return_traffic() {
	let key = vec![5u8; CipherKind::ChaCha20Poly1305.key_size()];

	let server_aead = Arc::new(AeadIndep::new(CipherKind::ChaCha20Poly1305.new_cipher(&key).unwrap()));
	let client_aead = Arc::new(AeadIndep::new(CipherKind::ChaCha20Poly1305.new_cipher(&key).unwrap()));

	let server = SecureUdp::bind(loopback(0), server_aead).unwrap();
	let server_addr = server.local_addr().unwrap();

	let client = SecureUdp::bind_connected(loopback(0), server_addr, client_aead).unwrap();
	let client_addr = client.local_addr().unwrap();

	let sessions: SessionTable<Endpoint> = SessionTable::new(600);

	// Client -> server: a packet from 10.0.0.2 to 10.0.0.1.
	let outbound = synthetic_ipv4_packet([10, 0, 0, 2], [10, 0, 0, 1], b"ping");
	client.send(&outbound).unwrap();

	let mut buf = vec![0u8; 2048];
	let (received, from) = server.recv_from(&mut buf).unwrap();
	assert_eq!(received, outbound);
	assert_eq!(from, client_addr);

	let src = parse_src_ip(&received).unwrap();
	assert_eq!(src, Vip::V4(Ipv4Addr::new(10, 0, 0, 2)));
	sessions.put(src, from);

	// Server -> client: routed by looking up the learned session for
	// the packet's destination.
	let inbound = synthetic_ipv4_packet([10, 0, 0, 1], [10, 0, 0, 2], b"pong");
	let dst = subtun::packet::parse_dst_ip(&inbound).unwrap();
	let routed_to = sessions.get(&dst).unwrap();
	server.send_to(&inbound, routed_to).unwrap();

	let echoed = client.recv(&mut buf).unwrap();
	assert_eq!(echoed, inbound);
}

#[test]
fn tampered_datagram_is_dropped_not_forwarded() {
	let key = vec![6u8; CipherKind::Aes128Gcm.key_size()];
	let server_aead = Arc::new(AeadIndep::new(CipherKind::Aes128Gcm.new_cipher(&key).unwrap()));
	let client_aead = Arc::new(AeadIndep::new(CipherKind::Aes128Gcm.new_cipher(&key).unwrap()));

	let server = SecureUdp::bind(loopback(0), server_aead).unwrap();
	let server_addr = server.local_addr().unwrap();
	let client = SecureUdp::bind_connected(loopback(0), server_addr, client_aead).unwrap();

	// A client using the wrong key produces frames the server can't
	// authenticate.
	let wrong_key = vec![7u8; CipherKind::Aes128Gcm.key_size()];
	let wrong_aead = Arc::new(AeadIndep::new(CipherKind::Aes128Gcm.new_cipher(&wrong_key).unwrap()));
	let attacker = SecureUdp::bind_connected(loopback(0), server_addr, wrong_aead).unwrap();
	attacker.send(b"not really a packet").unwrap();

	let mut buf = vec![0u8; 2048];
	assert!(server.recv_from(&mut buf).is_err());

	// The legitimate client still works afterward.
	client.send(b"still fine").unwrap();
	let (received, _) = server.recv_from(&mut buf).unwrap();
	assert_eq!(received, b"still fine");
}
