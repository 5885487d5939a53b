//! Crate-wide error taxonomy.
//!
//! Library-level functions return `Result<T, Error>` and never log;
//! logging only happens at the pipeline layer (see `pipeline.rs`), which
//! catches these per iteration and continues.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("malformed endpoint `{0}`")]
	AddrParse(String),

	#[error("failed to open tun device: {0}")]
	TunOpen(String),

	#[error("failed to read key file: {0}")]
	KeyFile(String),

	#[error("tun i/o error: {0}")]
	TunIo(#[from] io::Error),

	#[error("failed to create socket: {0}")]
	SocketCreate(String),

	#[error("failed to bind socket: {0}")]
	SocketBind(String),

	#[error("socket i/o error: {0}")]
	SocketIo(String),

	#[error("buffer too small: need {need}, have {have}")]
	BufferTooSmall { need: usize, have: usize },

	#[error("invalid key length: expected {expected}, got {got}")]
	InvalidKey { expected: usize, got: usize },

	#[error("aead authentication failed")]
	DecryptFailed,

	#[error("ciphertext truncated")]
	Truncated,

	#[error("frame is not a recognized ip packet")]
	NotAnIpPacket,

	#[error("no session for virtual ip `{0}`")]
	SessionNotFound(String),

	#[error("send length {0:#x} exceeds 0x3FFF")]
	SendTooLarge(usize),

	#[error("write ring buffer is full")]
	WriteBufferOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
