use actix_web::{web, HttpResponse};
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateOperation, ProgressOperation};
use crate::services::{ProgressHub, Subscription};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCreated {
    pub operation_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub operation_id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Cancel the run when the observer goes away before it finishes
    #[serde(default)]
    pub cancel_on_disconnect: bool,
}

/// Formats one server-sent event frame
pub fn sse_frame(event: &str, data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}

/// Cancels the observed run if the stream is dropped before the terminal event
struct DisconnectGuard {
    hub: ProgressHub,
    id: Uuid,
    armed: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            log::info!("Progress observer of {} disconnected, cancelling run", self.id);
            if let Err(e) = self.hub.cancel(self.id) {
                log::debug!("Cancel on disconnect ignored: {}", e);
            }
        }
    }
}

struct StreamState {
    pending: Option<ProgressOperation>,
    updates: mpsc::UnboundedReceiver<ProgressOperation>,
    guard: DisconnectGuard,
    closed: bool,
    // Keeps the callback registered for as long as the stream lives
    _subscription: Subscription,
}

/// POST /api/progress - Register an operation before triggering the work
pub async fn create_operation(
    hub: web::Data<ProgressHub>,
    body: web::Json<CreateOperation>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let operation_id = hub.create(body.operation_type, body.total);
    Ok(HttpResponse::Created().json(OperationCreated { operation_id }))
}

/// GET /api/progress/{id} - Current snapshot
pub async fn get_operation(
    hub: web::Data<ProgressHub>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let operation = hub
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Operation {} not found", id)))?;
    Ok(HttpResponse::Ok().json(operation))
}

/// GET /api/progress/{id}/stream - Server-sent progress events.
///
/// The current snapshot goes out first, then every update. After the terminal
/// update a `close` event is sent and the stream ends.
pub async fn stream_operation(
    hub: web::Data<ProgressHub>,
    path: web::Path<Uuid>,
    query: web::Query<StreamQuery>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = hub.subscribe(id, move |operation: &ProgressOperation| {
        // A closed receiver means the observer left; the subscription goes with it
        let _ = tx.send(operation.clone());
    })?;

    let state = StreamState {
        pending: Some(subscription.snapshot().clone()),
        updates: rx,
        guard: DisconnectGuard {
            hub: hub.get_ref().clone(),
            id,
            armed: query.cancel_on_disconnect,
        },
        closed: false,
        _subscription: subscription,
    };

    let events = stream::unfold(state, |mut state| async move {
        if state.closed {
            return None;
        }

        let operation = match state.pending.take() {
            Some(snapshot) => snapshot,
            None => state.updates.recv().await?,
        };

        let data = serde_json::to_string(&operation).unwrap_or_else(|_| "{}".to_string());
        let mut frame = sse_frame("progress", &data);
        if operation.status.is_terminal() {
            frame.push_str(&sse_frame("close", &data));
            state.closed = true;
            state.guard.armed = false;
        }

        Some((Ok::<_, actix_web::Error>(Bytes::from(frame)), state))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events))
}

/// POST /api/progress/{id}/cancel - Cancel the run that owns the operation
pub async fn cancel_operation(
    hub: web::Data<ProgressHub>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let operation_id = path.into_inner();
    hub.cancel(operation_id)?;
    Ok(HttpResponse::Accepted().json(CancelResponse {
        operation_id,
        cancelled: true,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/progress")
            .route("", web::post().to(create_operation))
            .route("/{id}", web::get().to(get_operation))
            .route("/{id}/stream", web::get().to(stream_operation))
            .route("/{id}/cancel", web::post().to(cancel_operation)),
    );
}
