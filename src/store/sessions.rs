//! Session persistence. Every statement is scoped by `(id, user_id)` so a
//! caller can never touch another user's rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Session, SessionWithTask};

/// Insert a new running session. The partial unique index
/// `sessions_one_active_per_user` turns a concurrent second start into a
/// unique-violation error, which the lifecycle layer maps to a conflict.
pub async fn insert_active(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    time_limit: Option<i64>,
) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "INSERT INTO sessions (task_id, user_id, time_limit) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(task_id)
    .bind(user_id)
    .bind(time_limit)
    .fetch_one(db)
    .await
}

pub async fn find_active(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Option<SessionWithTask>, sqlx::Error> {
    sqlx::query_as::<_, SessionWithTask>(
        "SELECT s.*, t.name AS task_name, t.category, t.color
         FROM sessions s
         JOIN tasks t ON s.task_id = t.id
         WHERE s.user_id = $1 AND s.end_time IS NULL
         ORDER BY s.start_time DESC
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// End a running session in a single guarded UPDATE. The `end_time IS NULL`
/// predicate makes the call idempotent: a second attempt matches no row and
/// returns `None`, indistinguishable from a missing id. Duration is floored
/// whole seconds computed from the stored start time, and the limit flag is
/// monotone (OR with its previous value).
pub async fn finish(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    notes: Option<&str>,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "UPDATE sessions
         SET end_time = NOW(),
             duration = FLOOR(EXTRACT(EPOCH FROM (NOW() - start_time)))::BIGINT,
             time_limit_reached = time_limit_reached
                 OR (time_limit IS NOT NULL
                     AND FLOOR(EXTRACT(EPOCH FROM (NOW() - start_time)))::BIGINT >= time_limit),
             notes = COALESCE($3, notes)
         WHERE id = $1 AND user_id = $2 AND end_time IS NULL
         RETURNING *",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(notes)
    .fetch_optional(db)
    .await
}

pub async fn set_time_limit_reached(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE sessions SET time_limit_reached = TRUE WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(db)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Most-recent-first history for one task. A NULL limit means no limit.
pub async fn by_task(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions
         WHERE task_id = $1 AND user_id = $2
         ORDER BY start_time DESC
         LIMIT $3",
    )
    .bind(task_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Sessions whose start time falls in the window, inclusive both ends,
/// chronological ascending as the report aggregator consumes them.
pub async fn by_date_range(
    db: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SessionWithTask>, sqlx::Error> {
    sqlx::query_as::<_, SessionWithTask>(
        "SELECT s.*, t.name AS task_name, t.category, t.color
         FROM sessions s
         JOIN tasks t ON s.task_id = t.id
         WHERE s.user_id = $1 AND s.start_time >= $2 AND s.start_time <= $3
         ORDER BY s.start_time ASC",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await
}
