use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::Result,
    models::auth::AuthSession,
    services::{backend::PgBackend, partnerships as partnership_service, sessions as session_service},
    state::AppState,
    sync::{
        FeedSignal, LocalAction, MutationAck, MutationQueue, SessionRoom, SignalOutcome,
        StagedMutation, SyncError,
        event::{DecodeError, PartnershipChange, partnership_channel},
        room::RoomView,
    },
};

/// Frames pushed to the client.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    /// The full projection, sent after every change.
    State(&'a RoomView),
    /// A change on a partnership feed.
    Change(&'a PartnershipChange),
    Error { kind: &'static str, message: String },
}

fn error_kind(err: &SyncError) -> &'static str {
    match err {
        SyncError::NotFound => "not_found",
        SyncError::Unauthorized => "unauthorized",
        SyncError::Disconnected => "disconnected",
        SyncError::ValidationFailed(_) => "validation_failed",
        SyncError::Backend(_) => "backend",
    }
}

type Outcome = (StagedMutation, std::result::Result<MutationAck, SyncError>);

/// Upgrades to the live session room.
///
/// Participation is checked before the upgrade so outsiders get a plain
/// HTTP error instead of a socket.
pub async fn live_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    session_service::require_participant(&state.db, session_id, auth.user_id).await?;

    Ok(ws
        .on_upgrade(move |socket| run_room(state, socket, session_id, auth.user_id))
        .into_response())
}

async fn run_room(state: AppState, socket: WebSocket, session_id: Uuid, viewer: Uuid) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe before hydrating; anything arriving in between is buffered
    // and merged after, which the revision rules make safe.
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<FeedSignal>();
    let subscription = state.feed.open(session_id, move |signal| {
        let _ = signal_tx.send(signal);
    });

    let backend = Arc::new(PgBackend::new(state.clone()));
    let mut room = match SessionRoom::open(backend, session_id, viewer, state.config.reward_reveal).await {
        Ok(room) => room,
        Err(err) => {
            tracing::warn!(%session_id, %viewer, "❌ Failed to open session room: {}", err);
            subscription.close();
            let _ = send_error(&mut ws_tx, &err).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    room.attach(subscription);
    tracing::info!(%session_id, %viewer, "🔌 Live room opened");

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Outcome>();
    let mut queue = MutationQueue::new();
    let mut open = send_state(&mut ws_tx, &room).await;

    while open {
        tokio::select! {
            Some(signal) = signal_rx.recv() => {
                match room.handle_signal(signal) {
                    SignalOutcome::Changed => open = send_state(&mut ws_tx, &room).await,
                    SignalOutcome::Unchanged => {}
                    SignalOutcome::ResyncRequired => match room.resync().await {
                        Ok(()) => open = send_state(&mut ws_tx, &room).await,
                        Err(err) => {
                            tracing::warn!(%session_id, "⚠️ Re-hydration failed: {}", err);
                            open = send_error(&mut ws_tx, &err).await;
                        }
                    },
                }
            }
            Some((staged, outcome)) = outcome_rx.recv() => {
                if let Err(err) = room.resolve(&staged, outcome) {
                    open = send_error(&mut ws_tx, &err).await;
                }
                if let Some(next) = queue.finish(staged.entity_id) {
                    if let Err(err) = room.restage(&next) {
                        tracing::warn!(%session_id, entity_id = %next.entity_id, "⚠️ Could not restage queued mutation: {}", err);
                    }
                    spawn_perform(&room, next, &outcome_tx);
                }
                open = open && send_state(&mut ws_tx, &room).await;
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let action = match sonic_rs::from_str::<LocalAction>(text.as_str()) {
                        Ok(action) => action,
                        Err(e) => {
                            let err = SyncError::ValidationFailed(format!("Invalid command: {}", e));
                            open = send_error(&mut ws_tx, &err).await;
                            continue;
                        }
                    };

                    match room.stage(action) {
                        Ok(staged) => {
                            open = send_state(&mut ws_tx, &room).await;
                            if let Some(staged) = queue.admit(staged) {
                                spawn_perform(&room, staged, &outcome_tx);
                            }
                        }
                        Err(err) => open = send_error(&mut ws_tx, &err).await,
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%session_id, "WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    room.close();
    tracing::info!(%session_id, %viewer, pending = queue.in_flight(), "🔌 Live room closed");
}

/// Upgrades to a partnership's feed: couple sessions scheduled for the
/// pair and changes to the partnership itself.
pub async fn live_partnership(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(partnership_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    partnership_service::require_member(&state, auth.user_id, partnership_id).await?;

    Ok(ws
        .on_upgrade(move |socket| relay_partnership(state, socket, partnership_id))
        .into_response())
}

async fn relay_partnership(state: AppState, socket: WebSocket, partnership_id: Uuid) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let channel = partnership_channel(partnership_id);

    let subscribed = async {
        let mut pubsub = state.pubsub.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        Ok::<_, redis::RedisError>(pubsub)
    };
    let mut messages = match subscribed.await {
        Ok(pubsub) => pubsub.into_on_message().boxed(),
        Err(e) => {
            tracing::warn!(%partnership_id, "⚠️ Failed to subscribe to partnership feed: {}", e);
            let _ = send_error(&mut ws_tx, &SyncError::Disconnected).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(%partnership_id, "🔌 Partnership feed opened");

    loop {
        tokio::select! {
            message = messages.next() => {
                let Some(message) = message else {
                    tracing::warn!(%partnership_id, "partnership feed ended");
                    let _ = send_error(&mut ws_tx, &SyncError::Disconnected).await;
                    break;
                };
                let change = message
                    .get_payload::<String>()
                    .map_err(|e| DecodeError::Malformed(e.to_string()))
                    .and_then(|payload| PartnershipChange::from_json(&payload));
                match change {
                    Ok(change) => {
                        if !send_frame(&mut ws_tx, &ServerFrame::Change(&change)).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%partnership_id, error = %e, "skipping malformed partnership change")
                    }
                }
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(%partnership_id, "🔌 Partnership feed closed");
}

/// Performs `staged` on its own task; the outcome comes back through `outcome_tx`.
fn spawn_perform(
    room: &SessionRoom<PgBackend>,
    staged: StagedMutation,
    outcome_tx: &mpsc::UnboundedSender<Outcome>,
) {
    let backend = room.backend();
    let outcome_tx = outcome_tx.clone();
    tokio::spawn(async move {
        let outcome = staged.perform(backend.as_ref()).await;
        let _ = outcome_tx.send((staged, outcome));
    });
}

async fn send_frame(ws_tx: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame<'_>) -> bool {
    let json = match sonic_rs::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("❌ Failed to encode live frame: {}", e);
            return true;
        }
    };
    ws_tx.send(Message::Text(json.into())).await.is_ok()
}

async fn send_state<B>(ws_tx: &mut SplitSink<WebSocket, Message>, room: &SessionRoom<B>) -> bool
where
    B: crate::sync::SessionBackend + ?Sized,
{
    let view = room.projection();
    send_frame(ws_tx, &ServerFrame::State(&view)).await
}

async fn send_error(ws_tx: &mut SplitSink<WebSocket, Message>, err: &SyncError) -> bool {
    send_frame(
        ws_tx,
        &ServerFrame::Error {
            kind: error_kind(err),
            message: err.to_string(),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frames_carry_a_stable_kind() {
        let err = SyncError::ValidationFailed("title".into());
        let json = sonic_rs::to_string(&ServerFrame::Error {
            kind: error_kind(&err),
            message: err.to_string(),
        })
        .unwrap();

        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""kind":"validation_failed""#));
    }
}
