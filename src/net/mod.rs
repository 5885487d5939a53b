//! Transport layer: secure UDP and secure TCP (spec.md §4.5).

pub mod poller;
pub mod sudp;
pub mod tcp;

pub use sudp::SecureUdp;
pub use tcp::{StcpConn, TcpConn, TcpListener};
