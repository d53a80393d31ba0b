//! Break persistence, structurally parallel to the session store minus
//! task reference, notes and time limit.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Break;

pub async fn insert_active(db: &PgPool, user_id: Uuid) -> Result<Break, sqlx::Error> {
    sqlx::query_as::<_, Break>("INSERT INTO breaks (user_id) VALUES ($1) RETURNING *")
        .bind(user_id)
        .fetch_one(db)
        .await
}

pub async fn find_active(db: &PgPool, user_id: Uuid) -> Result<Option<Break>, sqlx::Error> {
    sqlx::query_as::<_, Break>(
        "SELECT * FROM breaks
         WHERE user_id = $1 AND end_time IS NULL
         ORDER BY start_time DESC
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn finish(
    db: &PgPool,
    user_id: Uuid,
    break_id: Uuid,
) -> Result<Option<Break>, sqlx::Error> {
    sqlx::query_as::<_, Break>(
        "UPDATE breaks
         SET end_time = NOW(),
             duration = FLOOR(EXTRACT(EPOCH FROM (NOW() - start_time)))::BIGINT
         WHERE id = $1 AND user_id = $2 AND end_time IS NULL
         RETURNING *",
    )
    .bind(break_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn by_date_range(
    db: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Break>, sqlx::Error> {
    sqlx::query_as::<_, Break>(
        "SELECT * FROM breaks
         WHERE user_id = $1 AND start_time >= $2 AND start_time <= $3
         ORDER BY start_time ASC",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await
}
