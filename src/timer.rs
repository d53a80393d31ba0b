//! Session and break lifecycle. This layer owns the single-active-timer
//! invariant and the error mapping around it; the invariant itself lives in
//! the storage layer as a partial unique index, so starting a timer is one
//! atomic insert rather than a check-then-act pair.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Break, Session, SessionWithTask};
use crate::store::{self, is_foreign_key_violation, is_unique_violation};

pub async fn start_session(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    time_limit: Option<i64>,
) -> Result<Session, ApiError> {
    if let Some(limit) = time_limit {
        if limit <= 0 {
            return Err(ApiError::Validation("timeLimit must be a positive number of seconds".into()));
        }
    }

    store::tasks::find(db, user_id, task_id)
        .await?
        .ok_or_else(|| ApiError::Validation("task not found".into()))?;

    match store::sessions::insert_active(db, user_id, task_id, time_limit).await {
        Ok(session) => Ok(session),
        Err(err) if is_unique_violation(&err) => Err(ApiError::Conflict(
            "another session is already active, end it first".into(),
        )),
        // The task can disappear between the ownership check and the insert.
        Err(err) if is_foreign_key_violation(&err) => {
            Err(ApiError::Validation("task not found".into()))
        }
        Err(err) => Err(err.into()),
    }
}

/// The running session, if any, joined with its task's display fields.
/// Absence is a normal outcome, not an error.
pub async fn active_session(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Option<SessionWithTask>, ApiError> {
    Ok(store::sessions::find_active(db, user_id).await?)
}

/// End a running session. "Not found" deliberately covers both a missing id
/// and an already-ended session, so repeating the call is harmless and the
/// response leaks nothing about which case it was.
pub async fn end_session(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    notes: Option<&str>,
) -> Result<Session, ApiError> {
    store::sessions::finish(db, user_id, session_id, notes)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found or already ended".into()))
}

/// Raise the time-limit flag without ending the session. Idempotent; the flag
/// is never lowered again, and a stale id is not an error.
pub async fn mark_time_limit_reached(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<(), ApiError> {
    store::sessions::set_time_limit_reached(db, user_id, session_id).await?;
    Ok(())
}

pub async fn start_break(db: &PgPool, user_id: Uuid) -> Result<Break, ApiError> {
    match store::breaks::insert_active(db, user_id).await {
        Ok(break_record) => Ok(break_record),
        Err(err) if is_unique_violation(&err) => {
            Err(ApiError::Conflict("a break is already active".into()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn active_break(db: &PgPool, user_id: Uuid) -> Result<Option<Break>, ApiError> {
    Ok(store::breaks::find_active(db, user_id).await?)
}

pub async fn end_break(db: &PgPool, user_id: Uuid, break_id: Uuid) -> Result<Break, ApiError> {
    store::breaks::finish(db, user_id, break_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("break not found or already ended".into()))
}

pub async fn sessions_by_task(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<Session>, ApiError> {
    Ok(store::sessions::by_task(db, user_id, task_id, limit).await?)
}

pub async fn sessions_by_date_range(
    db: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SessionWithTask>, ApiError> {
    Ok(store::sessions::by_date_range(db, user_id, start, end).await?)
}

pub async fn breaks_by_date_range(
    db: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Break>, ApiError> {
    Ok(store::breaks::by_date_range(db, user_id, start, end).await?)
}
