//! HTTP listener. `/terminal` upgrades to a WebSocket and every socket gets
//! its own independent session.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::serve::ListenerExt;
use axum::Router;
use hostshell_pty::NativePty;
use hostshell_session::{Session, SessionConfig, SessionId};
use tokio::net::TcpListener;

use crate::launcher::ShellSpec;
use crate::socket::WsTransport;

/// Path of the terminal WebSocket endpoint.
pub const TERMINAL_PATH: &str = "/terminal";

struct ServerState {
    config: SessionConfig,
    shell: ShellSpec,
    next_id: AtomicU64,
}

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, config: SessionConfig, shell: ShellSpec) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState {
                config,
                shell,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the task is dropped.
    pub async fn serve(self) -> io::Result<()> {
        let listener = self.listener.tap_io(|tcp| {
            if let Err(err) = tcp.set_nodelay(true) {
                log::debug!("could not set TCP_NODELAY: {err}");
            }
        });
        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app).await
    }
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(TERMINAL_PATH, get(terminal))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn terminal(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    log::info!("session {id}: connection from {peer}");
    ws.on_upgrade(move |socket| run_session(id, socket, peer, state))
}

async fn run_session(id: SessionId, socket: WebSocket, peer: SocketAddr, state: Arc<ServerState>) {
    let session = Session::new(id, state.config.clone());
    let transport = WsTransport::new(socket);
    match session.run(transport, &NativePty, state.shell.command()).await {
        Ok(outcome) => {
            let code = outcome.exit_status.map(|status| status.exit_code());
            log::info!(
                "session {id}: finished for {peer} ({:?}, exit code {code:?})",
                outcome.ended_by
            );
        }
        Err(err) => log::warn!("session {id}: {err}"),
    }
}
