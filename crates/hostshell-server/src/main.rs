mod config;
mod connection;
mod launcher;
mod socket;

use anyhow::Context;
use clap::Parser;

use crate::config::ServerArgs;
use crate::connection::{Server, TERMINAL_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ServerArgs::parse();
    let server = Server::bind(args.addr, args.session_config(), args.shell_spec())
        .await
        .with_context(|| format!("failed to listen on {}", args.addr))?;
    let local = server.local_addr().context("failed to read listen address")?;

    if !local.ip().is_loopback() {
        log::warn!("listening on {local} without authentication; anyone who can reach it gets a shell");
    }
    log::info!(
        "hostshell listening on ws://{local}{TERMINAL_PATH} (shell {})",
        args.shell
    );

    tokio::select! {
        result = server.serve() => result.context("server stopped")?,
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            log::info!("shutting down");
        }
    }
    Ok(())
}
