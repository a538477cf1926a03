//! Latest-wins frame feed.
//!
//! Pulls the job's [`PreviewChannel`](autopub_session::PreviewChannel)
//! with a timeout and forwards each frame as a binary message. No
//! ordering guarantee beyond "most recent wins"; a slow client simply
//! skips frames. The connection closes when the channel is torn down.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use autopub_core::types::DbId;

use crate::error::AppResult;
use crate::state::AppState;

/// How long one pull waits before re-checking the connection and the
/// stop signal.
const FRAME_PULL_TIMEOUT: Duration = Duration::from_millis(500);

/// GET /api/v1/jobs/{id}/preview -- upgrade to the frame feed.
pub async fn preview_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<DbId>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    crate::handlers::jobs::job_exists(&state, job_id).await?;
    Ok(ws.on_upgrade(move |socket| run_preview(socket, state, job_id)))
}

async fn run_preview(socket: WebSocket, state: AppState, job_id: DbId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id, "Preview feed connected");

    let control = state.orchestrator.control(job_id).await;
    let preview = control.preview();
    let mut frames = preview.subscribe();

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    _ => {}
                }
            }
            frame = frames.next_frame(FRAME_PULL_TIMEOUT) => {
                match frame {
                    Some(frame) => {
                        if sink
                            .send(Message::Binary(frame.as_slice().to_vec().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    // Timeout is routine; a stopped channel means the job
                    // is tearing down.
                    None if preview.stop_token().is_cancelled() => break,
                    None => {}
                }
            }
        }
    }

    tracing::info!(conn_id = %conn_id, job_id, "Preview feed disconnected");
}
