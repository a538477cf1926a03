//! Ordered per-job event feed with cursor replay.
//!
//! A client connects with the last sequence number it processed; the feed
//! sends the stored delta first (heartbeats filtered by the log), then
//! live events as they are appended. Subscribing to the bus *before*
//! replaying closes the gap between the two -- the seam is at-least-once,
//! never lossy. A lagged bus subscription recovers by replaying from the
//! log again.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use autopub_core::types::DbId;
use autopub_db::models::event::JobEvent;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Replay cursor: the last seq this client processed.
    #[serde(default)]
    pub after: i64,
}

/// GET /api/v1/jobs/{id}/feed?after=N -- upgrade to the event feed.
pub async fn feed_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<DbId>,
    Query(params): Query<FeedQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    // 404 before upgrading; after the upgrade there is no status code left
    // to send.
    crate::handlers::jobs::job_exists(&state, job_id).await?;
    Ok(ws.on_upgrade(move |socket| run_feed(socket, state, job_id, params.after)))
}

async fn run_feed(socket: WebSocket, state: AppState, job_id: DbId, after: i64) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id, after, "Event feed connected");

    let (mut sink, mut stream) = socket.split();

    // Subscribe first, replay second: an event appended in between shows
    // up in both, and the cursor check drops the duplicate.
    let mut live = state.events.subscribe();

    let mut last_seq = after;
    match state.events.events_since(job_id, after).await {
        Ok(replay) => {
            for event in replay {
                last_seq = last_seq.max(event.seq);
                if send_event(&mut sink, &event).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "Feed replay failed");
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                if !still_open(&incoming) {
                    break;
                }
            }
            received = live.recv() => match received {
                Ok(event) => {
                    if event.job_id != job_id || event.seq <= last_seq {
                        continue;
                    }
                    last_seq = event.seq;
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(conn_id = %conn_id, skipped, "Feed lagged, replaying from log");
                    match state.events.events_since(job_id, last_seq).await {
                        Ok(delta) => {
                            for event in delta {
                                last_seq = last_seq.max(event.seq);
                                if send_event(&mut sink, &event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(conn_id = %conn_id, error = %e, "Feed catch-up failed");
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    tracing::info!(conn_id = %conn_id, job_id, "Event feed disconnected");
}

/// Push one event frame; `Err` means the client went away.
async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &JobEvent,
) -> Result<(), axum::Error> {
    let frame = json!({
        "seq": event.seq,
        "type": event.event_type,
        "payload": event.payload_json(),
        "ts": event.created_at,
    });
    sink.send(Message::Text(frame.to_string().into())).await
}

/// Whether the client side of the socket is still alive.
fn still_open(incoming: &Option<Result<Message, axum::Error>>) -> bool {
    !matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_))))
}
