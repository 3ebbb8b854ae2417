//! WebSocket session layer: thin transport over the admission scheduler

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::config::RelayConfig;
use crate::core::errors::RelayError;
use crate::core::models::{CaptionStyle, TranslationOutcome, TranslationRequest};
use crate::relay::{PendingRequest, Scheduler};

/// Application state
pub struct AppState {
    scheduler: Scheduler,
    next_caller: AtomicU64,
}

/// Messages a caller sends over the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Establish session defaults; answered with `connected`
    Config {
        source_lang: String,
        target_lang: String,
        style: Option<String>,
    },
    /// One recognized utterance to translate
    TextInput {
        text: String,
        source_lang: Option<String>,
        target_lang: Option<String>,
        style: Option<String>,
    },
}

/// Messages the relay sends back
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connected {
        volume_ready: bool,
        count_ready: bool,
        mock_mode: bool,
    },
    Text {
        content: String,
    },
    TurnComplete,
    Error {
        message: String,
    },
    RateLimit {
        limited: bool,
        is_daily_limit: bool,
        wait_time_ms: u64,
        requests_remaining: u64,
    },
}

/// Session defaults set by the `config` message
#[derive(Debug, Clone)]
struct SessionConfig {
    source_lang: String,
    target_lang: String,
    style: Option<CaptionStyle>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_lang: "auto".to_string(),
            target_lang: "English".to_string(),
            style: None,
        }
    }
}

/// Map one terminal outcome to its wire messages
pub fn outcome_messages(outcome: TranslationOutcome) -> Vec<Outbound> {
    match outcome {
        TranslationOutcome::Translated { text } => {
            vec![Outbound::Text { content: text }, Outbound::TurnComplete]
        }
        TranslationOutcome::Failed(RelayError::QuotaExceeded {
            scope,
            wait,
            remaining,
        }) => vec![
            Outbound::RateLimit {
                limited: true,
                is_daily_limit: scope.is_daily(),
                wait_time_ms: wait.map(|w| w.as_millis() as u64).unwrap_or(0),
                requests_remaining: remaining as u64,
            },
            Outbound::Error {
                message: format!("quota exceeded ({scope})"),
            },
        ],
        TranslationOutcome::Failed(err) => vec![Outbound::Error {
            message: err.to_string(),
        }],
    }
}

/// Health check handler
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "caption-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// One caller's session: read inbound messages, enqueue work, forward
/// outcomes back over the socket
async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let caller = state.next_caller.fetch_add(1, Ordering::Relaxed);
    info!(caller, "session opened");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<TranslationOutcome>();

    // single writer task owns the sink
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to encode outbound message: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // scheduler outcomes fan into the writer
    let mapper_tx = out_tx.clone();
    let mapper = tokio::spawn(async move {
        while let Some(outcome) = outcome_rx.recv().await {
            for message in outcome_messages(outcome) {
                if mapper_tx.send(message).is_err() {
                    return;
                }
            }
        }
    });

    let mut session = SessionConfig::default();

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<Inbound>(&text) {
            Ok(Inbound::Config {
                source_lang,
                target_lang,
                style,
            }) => {
                session.source_lang = source_lang;
                session.target_lang = target_lang;
                session.style = style.as_deref().and_then(CaptionStyle::from_tag);

                let readiness = state.scheduler.readiness();
                let _ = out_tx.send(Outbound::Connected {
                    volume_ready: readiness.volume_ready,
                    count_ready: readiness.count_ready,
                    mock_mode: readiness.mock_mode,
                });
            }
            Ok(Inbound::TextInput {
                text,
                source_lang,
                target_lang,
                style,
            }) => {
                let style = match style {
                    Some(tag) => CaptionStyle::from_tag(&tag),
                    None => session.style,
                };
                let request = TranslationRequest {
                    text,
                    source_lang: source_lang.unwrap_or_else(|| session.source_lang.clone()),
                    target_lang: target_lang.unwrap_or_else(|| session.target_lang.clone()),
                    style,
                };
                state
                    .scheduler
                    .enqueue(PendingRequest {
                        caller,
                        request,
                        reply: outcome_tx.clone(),
                    })
                    .await;
            }
            // one malformed message never terminates the session
            Err(e) => {
                debug!(caller, "malformed inbound message: {e}");
                let err = RelayError::Internal(format!("malformed message: {e}"));
                let _ = out_tx.send(Outbound::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    drop(out_tx);
    drop(outcome_tx);
    let _ = mapper.await;
    let _ = writer.await;
    info!(caller, "session closed");
}

/// Build the router over a constructed scheduler
pub fn router(scheduler: Scheduler) -> Router {
    let state = Arc::new(AppState {
        scheduler,
        next_caller: AtomicU64::new(1),
    });

    Router::new()
        .route("/", get(health_check))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Run the relay server
pub async fn run_server(host: String, port: u16, config: RelayConfig) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(config)?;
    let app = router(scheduler);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
