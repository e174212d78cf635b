//! Read-mostly HTTP observation service over the running session.
//!
//! GET endpoints expose status, context, history, checkpoints, and the
//! command catalog; `/ws` streams the event bus over Server-Sent Events
//! (history replay, then live events); POST approve/reject offer an
//! [`ApprovalAction`] on a single-slot channel. Bound to localhost.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use agentrun_core::checkpoint::FileCheckpointManager;
use agentrun_core::events::{EventKind, MemoryBus};
use agentrun_core::store::Scope;
use agentrun_core::{ContextStore, Registry};
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// An approve/reject action submitted through the inspector UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feedback: String,
}

struct InspectorState {
    bus: Arc<MemoryBus>,
    store: Arc<ContextStore>,
    registry: Arc<Registry>,
    checkpoints: Arc<FileCheckpointManager>,
    approvals: mpsc::Sender<ApprovalAction>,
    started_at: Instant,
}

/// The inspector HTTP facade.
pub struct Inspector {
    state: Arc<InspectorState>,
}

impl Inspector {
    /// Build an inspector over shared components. The returned receiver
    /// yields approval actions submitted via the UI; if nobody drains it,
    /// posts beyond the single buffered slot answer `no_pending_approval`.
    pub fn new(
        bus: Arc<MemoryBus>,
        store: Arc<ContextStore>,
        registry: Arc<Registry>,
        checkpoints: Arc<FileCheckpointManager>,
    ) -> (Self, mpsc::Receiver<ApprovalAction>) {
        let (approvals, rx) = mpsc::channel(1);
        let state = Arc::new(InspectorState {
            bus,
            store,
            registry,
            checkpoints,
            approvals,
            started_at: Instant::now(),
        });
        (Self { state }, rx)
    }

    /// The axum router serving all inspector endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/ws", get(events_stream))
            .route("/api/status", get(status))
            .route("/api/context", get(context_dump))
            .route("/api/history", get(history))
            .route("/api/checkpoints", get(checkpoints))
            .route("/api/commands", get(commands))
            .route("/api/approve", post(approve))
            .route("/api/reject", post(reject))
            .with_state(Arc::clone(&self.state))
    }

    /// Bind to localhost on the given port and serve until the process
    /// exits.
    pub async fn serve(self, port: u16) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        tracing::info!(port, "inspector listening");
        axum::serve(listener, self.router()).await
    }
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

/// Replay current history, then stream live events.
async fn events_stream(
    State(state): State<Arc<InspectorState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let history = state.bus.history(None);
    let subscription = state.bus.subscribe(&[]);

    let stream = tokio_stream::iter(history)
        .chain(ReceiverStream::new(subscription.into_receiver()))
        .map(|event| {
            Ok(SseEvent::default().data(serde_json::to_string(&event).unwrap_or_default()))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn status(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    let history = state.bus.history(None);
    let commands_run = history
        .iter()
        .filter(|e| e.kind == EventKind::CommandEnd)
        .count();
    let errors = history
        .iter()
        .filter(|e| e.kind == EventKind::CommandError)
        .count();

    Json(json!({
        "uptime_s": state.started_at.elapsed().as_secs(),
        "events": history.len(),
        "commands_run": commands_run,
        "errors": errors,
        "commands_total": state.registry.names().len(),
    }))
}

/// Non-empty reserved scopes, excluding the history log surface.
async fn context_dump(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    let mut result = serde_json::Map::new();
    for scope in [Scope::Project, Scope::Session, Scope::Step] {
        if let Ok(entries) = state.store.list(scope)
            && !entries.is_empty()
        {
            result.insert(
                scope.as_str().to_string(),
                serde_json::to_value(entries).unwrap_or(Value::Null),
            );
        }
    }
    Json(Value::Object(result))
}

async fn history(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    Json(serde_json::to_value(state.bus.history(None)).unwrap_or_else(|_| json!([])))
}

async fn checkpoints(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    match state.checkpoints.list() {
        Ok(infos) => Json(serde_json::to_value(infos).unwrap_or_else(|_| json!([]))),
        Err(err) => Json(json!({ "error": err.to_string() })),
    }
}

async fn commands(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    let infos: Vec<Value> = state
        .registry
        .list(None)
        .iter()
        .map(|cmd| {
            json!({
                "name": cmd.name(),
                "description": cmd.description(),
                "namespace": cmd.namespace(),
            })
        })
        .collect();
    Json(Value::Array(infos))
}

async fn approve(State(state): State<Arc<InspectorState>>) -> Json<Value> {
    offer(
        &state,
        ApprovalAction {
            action: "approve".to_string(),
            feedback: String::new(),
        },
    )
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
    #[serde(default)]
    feedback: String,
}

async fn reject(State(state): State<Arc<InspectorState>>, body: String) -> Json<Value> {
    let feedback = serde_json::from_str::<RejectBody>(&body)
        .map(|b| b.feedback)
        .unwrap_or_default();
    offer(
        &state,
        ApprovalAction {
            action: "reject".to_string(),
            feedback,
        },
    )
}

/// Non-blocking offer on the single-slot approval channel.
fn offer(state: &InspectorState, action: ApprovalAction) -> Json<Value> {
    let status = match state.approvals.try_send(action.clone()) {
        Ok(()) => match action.action.as_str() {
            "approve" => "approved",
            _ => "rejected",
        },
        Err(_) => "no_pending_approval",
    };
    Json(json!({ "status": status }))
}
