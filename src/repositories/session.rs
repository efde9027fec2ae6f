use deadpool_postgres::Pool;
use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::{
    error::Result,
    models::session::{NewSession, SessionFilter, SessionRow},
};

/// Inserts a new work session.
pub async fn insert(pool: &Pool, id: Uuid, session: &NewSession) -> Result<SessionRow> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            INSERT INTO work_sessions
                (id, kind, partnership_id, host_user_id, partner_user_id,
                 title, start_time, end_time, mode, location,
                 description, tech_stack, partner_prefs, listing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .await?;
    let listing = session.listing.as_ref();
    let description = listing.map(|l| l.description.as_str());
    let tech_stack = listing.map(|l| l.tech_stack.as_slice());
    let partner_prefs = listing.map(|l| Json(&l.partner_preferences));
    let status = listing.map(|l| l.status);

    let row = client
        .query_one(
            &stmt,
            &[
                &id,
                &session.kind,
                &session.partnership_id,
                &session.host_user_id,
                &session.partner_user_id,
                &session.title,
                &session.start_time,
                &session.end_time,
                &session.mode,
                &session.location,
                &description,
                &tech_stack,
                &partner_prefs,
                &status,
            ],
        )
        .await?;
    Ok(SessionRow::from(&row))
}

/// Finds a session by its ID.
pub async fn find_by_id(pool: &Pool, id: Uuid) -> Result<Option<SessionRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached("SELECT * FROM work_sessions WHERE id = $1")
        .await?;
    let row = client.query_opt(&stmt, &[&id]).await?;
    Ok(row.as_ref().map(SessionRow::from))
}

/// Lists a partnership's sessions, latest start first.
pub async fn list_for_partnership(pool: &Pool, partnership_id: Uuid) -> Result<Vec<SessionRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM work_sessions
            WHERE partnership_id = $1
            ORDER BY start_time DESC
            "#,
        )
        .await?;
    let rows = client.query(&stmt, &[&partnership_id]).await?;
    Ok(rows.iter().map(SessionRow::from).collect())
}

/// Lists the sessions `user_id` takes part in, newest first.
pub async fn list_for_user(pool: &Pool, user_id: Uuid, filter: &SessionFilter) -> Result<Vec<SessionRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM work_sessions
            WHERE (host_user_id = $1 OR partner_user_id = $1)
              AND ($2::session_kind IS NULL OR kind = $2)
              AND ($3::session_mode IS NULL OR mode = $3)
              AND ($4::listing_status IS NULL OR listing_status = $4)
              AND ($5::date IS NULL OR (start_time AT TIME ZONE 'UTC')::date = $5)
            ORDER BY created_at DESC
            "#,
        )
        .await?;
    let rows = client
        .query(
            &stmt,
            &[&user_id, &filter.kind, &filter.mode, &filter.status, &filter.date],
        )
        .await?;
    Ok(rows.iter().map(SessionRow::from).collect())
}
