use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Duration;

use crate::backend::error::{BotError, Result};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query string the provider appends to the redirect URI
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    authorize_url: Arc<String>,
    code_tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

/// Temporary local listener that captures one authorization code
pub struct CallbackServer {
    listener: TcpListener,
    open_browser: bool,
}

impl CallbackServer {
    /// Bind `127.0.0.1:<port>`; port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            BotError::AuthError(format!("Port {} not available: {}", port, e))
        })?;
        Ok(Self {
            listener,
            open_browser: true,
        })
    }

    /// Only log the login URL instead of launching a browser
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve `/login` and `/callback` until a code arrives, then shut down.
    pub async fn wait_for_code(self, authorize_url: String) -> Result<String> {
        let addr = self.local_addr()?;
        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let open_browser = self.open_browser;
        let state = CallbackState {
            authorize_url: Arc::new(authorize_url),
            code_tx: Arc::new(Mutex::new(Some(code_tx))),
        };
        let app = create_router(state);

        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let login_url = format!("http://localhost:{}/login", addr.port());
        log::info!("OAuth callback server listening on http://{}", addr);
        log::info!("Visit {} to authorize the bot", login_url);
        if open_browser {
            if let Err(e) = open::that_detached(&login_url) {
                log::warn!("Could not open a browser ({}), open {} manually", e, login_url);
            }
        }

        let code = code_rx
            .await
            .map_err(|_| BotError::AuthError("Callback server stopped without a code".to_string()));

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(Ok(Err(e))) => log::error!("Callback server error: {}", e),
            Err(_) => log::warn!("Callback server did not shut down in time"),
            _ => log::info!("Callback server on port {} shut down", addr.port()),
        }

        code
    }
}

fn create_router(state: CallbackState) -> Router {
    Router::new()
        .route("/login", get(handle_login))
        .route("/callback", get(handle_callback))
        .with_state(state)
}

async fn handle_login(State(state): State<CallbackState>) -> Redirect {
    Redirect::to(&state.authorize_url)
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(err) = query.error {
        let desc = query.error_description.unwrap_or_default();
        log::error!("Authorization was refused: {} {}", err, desc);
        return (
            StatusCode::BAD_REQUEST,
            Html(format!(
                "<h2>Authorization failed</h2><p>{}</p><p>{}</p>",
                escape_html(&err),
                escape_html(&desc)
            )),
        );
    }

    let Some(code) = query.code else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h2>Error: Missing authorization code.</h2>".to_string()),
        );
    };

    if let Some(tx) = state.code_tx.lock().await.take() {
        let _ = tx.send(code);
    }

    (
        StatusCode::OK,
        Html("<h2>Authorization complete.</h2><p>You may now close this tab.</p>".to_string()),
    )
}

/// Escape text for inclusion in an HTML page
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
