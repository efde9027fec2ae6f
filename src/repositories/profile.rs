use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{error::Result, models::session::Participant};

/// Loads the profiles of `ids`, in the order given.
///
/// Users without a profile row come back as [`Participant::anonymous`].
pub async fn find_participants(pool: &Pool, ids: &[Uuid]) -> Result<Vec<Participant>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT id, display_name, avatar_url, status
            FROM profiles
            WHERE id = ANY($1)
            "#,
        )
        .await?;
    let rows = client.query(&stmt, &[&ids]).await?;
    let found: Vec<Participant> = rows.iter().map(Participant::from).collect();

    Ok(ids
        .iter()
        .map(|id| {
            found
                .iter()
                .find(|p| p.id == *id)
                .cloned()
                .unwrap_or_else(|| Participant::anonymous(*id))
        })
        .collect())
}
