use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::reward::{NewReward, RewardRow},
};

pub async fn list_for_session(pool: &Pool, session_id: Uuid) -> Result<Vec<RewardRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM rewards
            WHERE session_id = $1
            ORDER BY created_at, id
            "#,
        )
        .await?;
    let rows = client.query(&stmt, &[&session_id]).await?;
    Ok(rows.iter().map(RewardRow::from).collect())
}

pub async fn find_by_id(pool: &Pool, reward_id: Uuid) -> Result<Option<RewardRow>> {
    let client = pool.get().await?;
    let stmt = client.prepare_cached("SELECT * FROM rewards WHERE id = $1").await?;
    let row = client.query_opt(&stmt, &[&reward_id]).await?;
    Ok(row.as_ref().map(RewardRow::from))
}

/// Inserts a reward. Returns `None` when the id is already taken.
pub async fn insert(pool: &Pool, session_id: Uuid, reward: &NewReward) -> Result<Option<RewardRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            INSERT INTO rewards (id, session_id, giver_user_id, receiver_user_id, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .await?;
    let row = client
        .query_opt(
            &stmt,
            &[
                &reward.id,
                &session_id,
                &reward.giver_user_id,
                &reward.receiver_user_id,
                &reward.description,
            ],
        )
        .await?;
    Ok(row.as_ref().map(RewardRow::from))
}

/// Rewrites a reward's description and bumps the revision by one.
pub async fn update_description(
    pool: &Pool,
    reward_id: Uuid,
    description: &str,
) -> Result<Option<RewardRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            UPDATE rewards
            SET description = $2, revision = revision + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .await?;
    let row = client.query_opt(&stmt, &[&reward_id, &description]).await?;
    Ok(row.as_ref().map(RewardRow::from))
}
