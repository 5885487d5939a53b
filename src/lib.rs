//! `subtun`: a minimal layer-3 VPN tunnel over AEAD-encrypted UDP or TCP.

pub mod addr;
pub mod aead;
pub mod error;
pub mod key;
pub mod net;
pub mod packet;
pub mod pipeline;
pub mod ring_buffer;
pub mod session;
pub mod tun;
