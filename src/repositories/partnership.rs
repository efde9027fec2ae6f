use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{error::Result, models::partnership::Partnership};

/// Lists the active partnerships a user belongs to, newest first.
pub async fn list_active_for_user(pool: &Pool, user_id: Uuid) -> Result<Vec<Partnership>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM partnerships
            WHERE (user1_id = $1 OR user2_id = $1) AND status = 'active'
            ORDER BY created_at DESC
            "#,
        )
        .await?;
    let rows = client.query(&stmt, &[&user_id]).await?;
    Ok(rows.iter().map(Partnership::from).collect())
}

pub async fn find_by_id(pool: &Pool, partnership_id: Uuid) -> Result<Option<Partnership>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached("SELECT * FROM partnerships WHERE id = $1")
        .await?;
    let row = client.query_opt(&stmt, &[&partnership_id]).await?;
    Ok(row.as_ref().map(Partnership::from))
}

/// Finds the active partnership between two users, in either order.
pub async fn find_active_between(pool: &Pool, a: Uuid, b: Uuid) -> Result<Option<Partnership>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM partnerships
            WHERE status = 'active'
              AND ((user1_id = $1 AND user2_id = $2) OR (user1_id = $2 AND user2_id = $1))
            LIMIT 1
            "#,
        )
        .await?;
    let row = client.query_opt(&stmt, &[&a, &b]).await?;
    Ok(row.as_ref().map(Partnership::from))
}

pub async fn insert(pool: &Pool, id: Uuid, user1_id: Uuid, user2_id: Uuid) -> Result<Partnership> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            INSERT INTO partnerships (id, user1_id, user2_id, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING *
            "#,
        )
        .await?;
    let row = client.query_one(&stmt, &[&id, &user1_id, &user2_id]).await?;
    Ok(Partnership::from(&row))
}

/// Flips a partnership to inactive. Its sessions are left untouched.
pub async fn deactivate(pool: &Pool, partnership_id: Uuid) -> Result<Option<Partnership>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            UPDATE partnerships
            SET status = 'inactive', updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .await?;
    let row = client.query_opt(&stmt, &[&partnership_id]).await?;
    Ok(row.as_ref().map(Partnership::from))
}
