//! HTTP handlers. Each handler authenticates the caller, translates the
//! request into lifecycle/report/store calls and maps the result to JSON;
//! timer state changes additionally notify the user's sync connections.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::models::{Break, Session, SessionWithTask, Settings, SettingsPatch, Task, TaskPatch, User, UserSummary};
use crate::reports::{self, Report, ReportWindow};
use crate::store;
use crate::sync::ServerMessage;
use crate::timer;
use crate::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_username(&req.username)?;
    validate_email(&req.email)?;
    if req.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters long".into(),
        ));
    }

    let password_hash = auth::hash_password(&req.password).await?;

    let user = match sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&req.username)
    .bind(&req.email)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await
    {
        Ok(user) => user,
        Err(err) if store::is_unique_violation(&err) => {
            return Err(ApiError::Conflict(
                "a user with this email or username already exists".into(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let token = auth::issue_token(&state.tokens, &user).await;
    log::info!("registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse { user: UserSummary::from(&user), token }),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    // Verify against a dummy hash when the user is unknown so both outcomes
    // cost a bcrypt round.
    let dummy_hash = "$2b$12$dummy.hash.for.timing.protection.with.enough.length.here.ok";
    let stored_hash = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(|| dummy_hash.to_string());
    let password_valid = auth::verify_password(&req.password, &stored_hash)
        .await
        .unwrap_or(false);

    match user {
        Some(user) if password_valid => {
            let token = auth::issue_token(&state.tokens, &user).await;
            Ok(Json(AuthResponse { user: UserSummary::from(&user), token }))
        }
        _ => Err(ApiError::Authentication("invalid credentials".into())),
    }
}

pub async fn logout(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::authenticate(&headers, &state.tokens).await?;
    if let Some(token) = auth::bearer_token(&headers) {
        auth::revoke_token(&state.tokens, token).await;
    }
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

pub async fn me(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    Ok(Json(serde_json::json!({
        "id": user.user_id,
        "username": user.username,
        "email": user.email,
    })))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_tasks(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let tasks = store::tasks::list(&state.db, user.user_id, query.include_inactive).await?;
    Ok(Json(tasks))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub name: String,
    pub category: Option<String>,
    pub color: Option<String>,
}

pub async fn create_task(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    validate_task_name(&req.name)?;
    if let Some(ref color) = req.color {
        validate_color(color)?;
    }

    let task = store::tasks::insert(
        &state.db,
        user.user_id,
        req.name.trim(),
        req.category.as_deref(),
        req.color.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let task = store::tasks::find(&state.db, user.user_id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("task not found".into()))?;
    Ok(Json(task))
}

pub async fn update_task(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    if patch.is_empty() {
        return Err(ApiError::Validation("no fields to update".into()));
    }
    if let Some(ref name) = patch.name {
        validate_task_name(name)?;
    }
    if let Some(ref color) = patch.color {
        validate_color(color)?;
    }

    let task = store::tasks::update(&state.db, user.user_id, task_id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("task not found".into()))?;
    Ok(Json(task))
}

pub async fn delete_task(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    match store::tasks::delete(&state.db, user.user_id, task_id).await {
        Ok(true) => Ok(Json(serde_json::json!({ "message": "task deleted" }))),
        Ok(false) => Err(ApiError::NotFound("task not found".into())),
        Err(err) if store::is_foreign_key_violation(&err) => Err(ApiError::Conflict(
            "task has recorded sessions, deactivate it instead".into(),
        )),
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub task_id: Option<Uuid>,
    pub time_limit: Option<i64>,
}

pub async fn start_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let task_id = req
        .task_id
        .ok_or_else(|| ApiError::Validation("taskId is required".into()))?;

    let session = timer::start_session(&state.db, user.user_id, task_id, req.time_limit).await?;
    notify_session_update(&state, user.user_id, "start", &session).await;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn active_session(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<SessionWithTask>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let session = timer::active_session(&state.db, user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no active session".into()))?;
    Ok(Json(session))
}

#[derive(Default, Deserialize)]
pub struct EndSessionRequest {
    pub notes: Option<String>,
}

pub async fn end_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<EndSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let session =
        timer::end_session(&state.db, user.user_id, session_id, req.notes.as_deref()).await?;
    notify_session_update(&state, user.user_id, "end", &session).await;
    Ok(Json(session))
}

pub async fn mark_time_limit_reached(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    timer::mark_time_limit_reached(&state.db, user.user_id, session_id).await?;
    Ok(Json(serde_json::json!({ "message": "time limit marked as reached" })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn sessions_by_task(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    if let Some(limit) = query.limit {
        if limit < 1 {
            return Err(ApiError::Validation("limit must be at least 1".into()));
        }
    }
    let sessions = timer::sessions_by_task(&state.db, user.user_id, task_id, query.limit).await?;
    Ok(Json(sessions))
}

// ---------------------------------------------------------------------------
// Breaks
// ---------------------------------------------------------------------------

pub async fn start_break(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Break>), ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let break_record = timer::start_break(&state.db, user.user_id).await?;
    notify_session_update(&state, user.user_id, "break-start", &break_record).await;
    Ok((StatusCode::CREATED, Json(break_record)))
}

pub async fn active_break(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Break>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let break_record = timer::active_break(&state.db, user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no active break".into()))?;
    Ok(Json(break_record))
}

pub async fn end_break(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(break_id): Path<Uuid>,
) -> Result<Json<Break>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let break_record = timer::end_break(&state.db, user.user_id, break_id).await?;
    notify_session_update(&state, user.user_id, "break-end", &break_record).await;
    Ok(Json(break_record))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ReportQuery {
    pub date: Option<NaiveDate>,
}

pub async fn daily_report(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, ApiError> {
    build_report(headers, state, ReportWindow::Daily, query.date).await
}

pub async fn weekly_report(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, ApiError> {
    build_report(headers, state, ReportWindow::Weekly, query.date).await
}

pub async fn monthly_report(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, ApiError> {
    build_report(headers, state, ReportWindow::Monthly, query.date).await
}

async fn build_report(
    headers: HeaderMap,
    state: AppState,
    window: ReportWindow,
    date: Option<NaiveDate>,
) -> Result<Json<Report>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let reference = date.unwrap_or_else(|| Utc::now().date_naive());
    let report = reports::build_report(&state.db, user.user_id, window, reference).await?;
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn get_settings(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Settings>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    let settings = store::settings::get_or_create(&state.db, user.user_id).await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, ApiError> {
    let user = auth::authenticate(&headers, &state.tokens).await?;
    if patch.is_empty() {
        return Err(ApiError::Validation("no fields to update".into()));
    }
    if let Some(limit) = patch.default_time_limit {
        if limit <= 0 {
            return Err(ApiError::Validation(
                "defaultTimeLimit must be a positive number of seconds".into(),
            ));
        }
    }

    let settings = store::settings::update(&state.db, user.user_id, &patch).await?;
    Ok(Json(settings))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Push a `session-update` to all of the user's sync connections so other
/// devices refresh without polling.
async fn notify_session_update<T: Serialize>(
    state: &AppState,
    user_id: Uuid,
    action: &str,
    payload: &T,
) {
    match serde_json::to_value(payload) {
        Ok(session) => {
            state
                .sync
                .broadcast(
                    user_id,
                    None,
                    ServerMessage::SessionUpdate { action: action.to_string(), session },
                )
                .await;
        }
        Err(err) => log::error!("failed to encode {action} update: {err}"),
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let username_regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    if username.len() < 3 || username.len() > 50 || !username_regex.is_match(username) {
        return Err(ApiError::Validation(
            "username must be 3-50 characters and contain only letters, numbers, underscores and hyphens".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email_regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    if !email_regex.is_match(email) {
        return Err(ApiError::Validation("invalid email address".into()));
    }
    Ok(())
}

fn validate_task_name(name: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("task name is required".into()));
    }
    if name.len() > 255 {
        return Err(ApiError::Validation(
            "task name must be at most 255 characters".into(),
        ));
    }
    Ok(())
}

fn validate_color(color: &str) -> Result<(), ApiError> {
    let color_regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
    if !color_regex.is_match(color) {
        return Err(ApiError::Validation(
            "color must be a hex value like #3B82F6".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("franz_k").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has spaces").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("franz@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("two@@example.com").is_err());
    }

    #[test]
    fn task_name_rules() {
        assert!(validate_task_name("Writing").is_ok());
        assert!(validate_task_name("   ").is_err());
        assert!(validate_task_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn color_rules() {
        assert!(validate_color("#3B82F6").is_ok());
        assert!(validate_color("#3b82f6").is_ok());
        assert!(validate_color("3B82F6").is_err());
        assert!(validate_color("#3B82F").is_err());
        assert!(validate_color("#GGGGGG").is_err());
    }
}
