use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use subtun::addr::Endpoint;
use subtun::aead::CipherKind;
use subtun::pipeline::{self, Mode};
use subtun::session::DEFAULT_TTL_SECS;
use subtun::{error, key};

#[derive(Parser)]
#[command(name = "subtun", about = "a minimal layer-3 VPN tunnel")]
struct Args {
	#[command(subcommand)]
	cmd: Cmds,
}

#[derive(Subcommand)]
enum Cmds {
	/// run as the server, accepting connections from any client
	#[command(alias = "s")]
	Server {
		/// address to listen on, e.g. 0.0.0.0:7777
		listen: String,

		/// name of the tun device to create/attach
		#[arg(long, default_value = "subtun")]
		tun: String,

		/// file holding a base64 PSK, made with `gen-psk`
		#[arg(long, short = 'k', default_value = "psk")]
		key: String,

		#[arg(long, value_enum, default_value = "chacha20poly1305")]
		cipher: CipherKind,

		#[arg(long, value_enum, default_value = "udp")]
		mode: Mode,

		/// session idle timeout in seconds
		#[arg(long, default_value_t = DEFAULT_TTL_SECS)]
		ttl: i64,
	},

	/// run as the client, connecting to a fixed server
	#[command(alias = "c")]
	Client {
		/// server address to connect to, e.g. 1.2.3.4:7777
		server: String,

		#[arg(long, default_value = "subtun")]
		tun: String,

		#[arg(long, short = 'k', default_value = "psk")]
		key: String,

		#[arg(long, value_enum, default_value = "chacha20poly1305")]
		cipher: CipherKind,

		#[arg(long, value_enum, default_value = "udp")]
		mode: Mode,

		#[arg(long, default_value_t = DEFAULT_TTL_SECS)]
		ttl: i64,
	},

	/// generate a fresh PSK and print it to stdout
	GenPsk {
		#[arg(long, value_enum, default_value = "chacha20poly1305")]
		cipher: CipherKind,
	},
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = Args::parse();

	let result = match args.cmd {
		Cmds::Server { listen, tun, key, cipher, mode, ttl } => run_server(&listen, &tun, &key, cipher, mode, ttl),
		Cmds::Client { server, tun, key, cipher, mode, ttl } => run_client(&server, &tun, &key, cipher, mode, ttl),
		Cmds::GenPsk { cipher } => {
			println!("{}", key::gen_psk(cipher));
			Ok(())
		}
	};

	if let Err(e) = result {
		error!("{e}");
		return ExitCode::FAILURE;
	}
	ExitCode::SUCCESS
}

fn run_server(listen: &str, tun: &str, key_path: &str, cipher: CipherKind, mode: Mode, ttl: i64) -> error::Result<()> {
	let listen = Endpoint::parse(listen)?;
	let key = key::load_key(key_path, cipher)?;
	pipeline::run_server(tun, listen, mode, cipher, &key, ttl)
}

fn run_client(server: &str, tun: &str, key_path: &str, cipher: CipherKind, mode: Mode, ttl: i64) -> error::Result<()> {
	let server = Endpoint::parse(server)?;
	let key = key::load_key(key_path, cipher)?;
	pipeline::run_client(tun, server, mode, cipher, &key, ttl)
}
