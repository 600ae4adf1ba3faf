//! Preview server with live reload support

use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use color_eyre::eyre::{Result, WrapErr};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::services::ServeDir;
use tracing::{debug, info};

/// Route the live reload script subscribes to.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Live reload message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMessage {
    /// Full page reload.
    Reload,
    /// Only stylesheets changed.
    CssReload,
}

impl ReloadMessage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::CssReload => "css-reload",
        }
    }
}

/// Shared state holding the reload broadcaster.
#[derive(Debug, Clone)]
pub struct ServerState {
    reload_tx: broadcast::Sender<ReloadMessage>,
}

impl ServerState {
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { reload_tx }
    }

    /// Receive every reload event sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.reload_tx.subscribe()
    }

    /// Ask connected pages to reload. Returns the number of listeners.
    pub fn notify_reload(&self) -> usize {
        self.send(ReloadMessage::Reload)
    }

    /// Ask connected pages to refresh their stylesheets.
    pub fn notify_css_reload(&self) -> usize {
        self.send(ReloadMessage::CssReload)
    }

    fn send(&self, message: ReloadMessage) -> usize {
        // No subscribers is not an error: nobody has a page open yet.
        let listeners = self.reload_tx.send(message).unwrap_or(0);
        debug!(?message, listeners, "reload event sent");
        listeners
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the preview router serving `build_dir`.
pub fn create_router(build_dir: &Path, state: Arc<ServerState>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback_service(ServeDir::new(build_dir))
        .with_state(state)
}

/// Serve `build_dir` on localhost until Ctrl+C.
pub async fn serve(
    build_dir: &Path,
    port: u16,
    state: Arc<ServerState>,
    open_browser: bool,
) -> Result<()> {
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    let url = format!("http://localhost:{port}");
    info!(%url, dir = %build_dir.display(), "preview server listening");
    println!();
    println!("  Preview running at {url}");
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser && let Err(e) = open::that(&url) {
        tracing::warn!(error = %e, "failed to open browser");
    }

    axum::serve(listener, create_router(build_dir, state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Preview server error")
}

/// Resolves on Ctrl+C.
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server runs until killed.
        std::future::pending::<()>().await;
    }
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe()).filter_map(|msg| match msg {
        Ok(message) => Some(Ok(Event::default().data(message.as_str()))),
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Script inserted into every page while previewing.
pub const LIVERELOAD_SCRIPT: &str = r#"<script>
(function() {
    const source = new EventSource('/__livereload');
    source.onmessage = function(event) {
        if (event.data === 'reload') {
            window.location.reload();
        } else if (event.data === 'css-reload') {
            document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {
                const href = link.href.split('?')[0];
                link.href = href + '?v=' + Date.now();
            });
        }
    };
    source.onerror = function() {
        console.log('[yoda] live reload connection lost, retrying...');
    };
})();
</script>
"#;
