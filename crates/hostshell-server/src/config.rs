//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hostshell_session::{ControlPrefix, SessionConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

use crate::launcher::{ShellSpec, DEFAULT_SHELL};

#[derive(Debug, Clone, Parser)]
#[command(name = "hostshell", version, about = "Serve an interactive host shell over TCP")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "HOSTSHELL_ADDR", default_value = "127.0.0.1:9090")]
    pub addr: SocketAddr,

    /// Shell started for every connection.
    #[arg(long, env = "SHELL", default_value = DEFAULT_SHELL)]
    pub shell: String,

    /// Run the shell inside `chroot` at this path (e.g. the host's root mount).
    #[arg(long, env = "HOSTSHELL_HOST_ROOT")]
    pub host_root: Option<PathBuf>,

    /// Do not pass `-l` to the shell.
    #[arg(long)]
    pub no_login: bool,

    /// Kill the shell this many seconds after its client disconnects. 0 only
    /// interrupts it.
    #[arg(long, env = "HOSTSHELL_KILL_AFTER_SECS", default_value_t = 10)]
    pub kill_after_secs: u64,

    /// Recognise control frames by this leading byte (e.g. 0x1e) instead of `{`.
    #[arg(long, value_parser = parse_sentinel)]
    pub control_sentinel: Option<u8>,

    /// Bytes read from the PTY per output message.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    pub chunk_size: usize,
}

impl ServerArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.chunk_size,
            control_prefix: self
                .control_sentinel
                .map_or(ControlPrefix::Brace, ControlPrefix::Sentinel),
            kill_after: (self.kill_after_secs > 0).then(|| Duration::from_secs(self.kill_after_secs)),
            ..SessionConfig::default()
        }
    }

    pub fn shell_spec(&self) -> ShellSpec {
        ShellSpec {
            shell: self.shell.clone(),
            host_root: self.host_root.clone(),
            login: !self.no_login,
        }
    }
}

/// Accepts `0x1e` style hex or plain decimal. Printable ASCII is rejected
/// because a user could type it.
fn parse_sentinel(raw: &str) -> Result<u8, String> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    }
    .map_err(|e| format!("invalid sentinel byte {raw:?}: {e}"))?;

    if (0x20..=0x7e).contains(&value) {
        return Err(format!("sentinel byte {value:#04x} is printable"));
    }
    Ok(value)
}

fn parse_chunk_size(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid chunk size {raw:?}: {e}"))?;
    if !(1..=MAX_CHUNK_SIZE).contains(&value) {
        return Err(format!("chunk size must be between 1 and {MAX_CHUNK_SIZE}"));
    }
    Ok(value)
}
