//! Command-line flags and validated configuration.
//!
//! The flag surface is deliberately small: a hostname, a plaintext bind
//! address, optional MOTD/passwords files, optional log and state
//! directories (absolute paths), and an optional TLS listener.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "tinyircd", version, about = "Minimalist IRC server")]
pub struct Args {
    /// Hostname to present in server-originated messages
    #[arg(long, default_value = "localhost")]
    pub hostname: String,

    /// Address to bind to; an empty string disables the plaintext listener
    #[arg(long, default_value = "0.0.0.0:6667")]
    pub bind: String,

    /// Path to the MOTD file
    #[arg(long)]
    pub motd: Option<PathBuf>,

    /// Absolute path to the directory for transcript logs
    #[arg(long)]
    pub logdir: Option<PathBuf>,

    /// Absolute path to the directory for room states
    #[arg(long)]
    pub statedir: Option<PathBuf>,

    /// Optional path to the passwords file (one `nick:password` per line)
    #[arg(long)]
    pub passwords: Option<PathBuf>,

    /// TLS address to bind to
    #[arg(long)]
    pub tlsbind: Option<String>,

    /// TLS key file
    #[arg(long)]
    pub tlskey: Option<PathBuf>,

    /// TLS certificate file
    #[arg(long)]
    pub tlscert: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--{0} must be an absolute path")]
    RelativePath(&'static str),

    #[error("invalid --{flag} address {value:?}: {source}")]
    BadAddress {
        flag: &'static str,
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("--tlsbind requires both --tlskey and --tlscert")]
    IncompleteTls,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub hostname: String,
    pub bind: Option<SocketAddr>,
    pub motd: Option<PathBuf>,
    pub logdir: Option<PathBuf>,
    pub statedir: Option<PathBuf>,
    pub passwords: Option<PathBuf>,
    pub tls: Option<TlsConfig>,
    pub verbose: bool,
}

/// TLS listener configuration.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub bind: SocketAddr,
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl Config {
    /// Validate the parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        for (flag, dir) in [("logdir", &args.logdir), ("statedir", &args.statedir)] {
            if let Some(dir) = dir {
                if !dir.is_absolute() {
                    return Err(ConfigError::RelativePath(flag));
                }
            }
        }

        let bind = if args.bind.is_empty() {
            None
        } else {
            Some(parse_addr("bind", &args.bind)?)
        };

        let tls = match args.tlsbind {
            Some(tlsbind) => match (args.tlskey, args.tlscert) {
                (Some(key), Some(cert)) => Some(TlsConfig {
                    bind: parse_addr("tlsbind", &tlsbind)?,
                    key,
                    cert,
                }),
                _ => return Err(ConfigError::IncompleteTls),
            },
            None => None,
        };

        Ok(Self {
            hostname: args.hostname,
            bind,
            motd: args.motd,
            logdir: args.logdir,
            statedir: args.statedir,
            passwords: args.passwords,
            tls,
            verbose: args.verbose,
        })
    }
}

fn parse_addr(flag: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|source| ConfigError::BadAddress {
        flag,
        value: value.to_string(),
        source,
    })
}
