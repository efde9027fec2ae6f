use redis::AsyncCommands;
use uuid::Uuid;

use crate::{
    models::{reward::RewardRow, task::TaskRow},
    state::AppState,
    sync::event::{ChangeKind, PartnershipChange, RawChange, channel_name, partnership_channel},
};

/// Publishes a change record on the session's channel.
///
/// The feed is at-most-once: a failed publish is logged and the caller's
/// write still counts as done. Live rooms recover through re-hydration.
pub async fn publish(state: &AppState, session_id: Uuid, change: RawChange) {
    let channel = channel_name(session_id, change.entity());

    match change.to_json() {
        Ok(payload) => send(state, &channel, payload).await,
        Err(e) => tracing::error!(%session_id, "❌ Failed to encode change record: {}", e),
    }
}

/// Publishes a partnership or couple-session change on the partnership's channel.
pub async fn publish_partnership(state: &AppState, change: PartnershipChange) {
    let Some(partnership_id) = change.partnership_id() else {
        return;
    };
    let channel = partnership_channel(partnership_id);

    match change.to_json() {
        Ok(payload) => send(state, &channel, payload).await,
        Err(e) => tracing::error!(%partnership_id, "❌ Failed to encode partnership change: {}", e),
    }
}

async fn send(state: &AppState, channel: &str, payload: String) {
    let mut redis = state.redis.clone();
    match redis.publish::<_, _, i64>(channel, payload).await {
        Ok(receivers) => {
            tracing::debug!(%channel, receivers, "📣 Change published");
        }
        Err(e) => {
            tracing::warn!(%channel, "⚠️ Failed to publish change: {}", e);
        }
    }
}

pub async fn publish_task(state: &AppState, kind: ChangeKind, row: TaskRow) {
    let session_id = row.session_id;
    publish(state, session_id, RawChange::task(kind, row)).await;
}

pub async fn publish_reward(state: &AppState, kind: ChangeKind, row: RewardRow) {
    let session_id = row.session_id;
    publish(state, session_id, RawChange::reward(kind, row)).await;
}
