use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The identity fields safe to hand back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial task update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.color.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// NULL while the session is running; set exactly once at end.
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds, server-computed when the session ends. 0 until then.
    pub duration: i64,
    pub time_limit: Option<i64>,
    pub time_limit_reached: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A session joined with the display fields of its task.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SessionWithTask {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub session: Session,
    pub task_name: String,
    pub category: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Break {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Settings {
    pub user_id: Uuid,
    pub default_time_limit: i64,
    pub notification_sound_url: Option<String>,
    pub theme: String,
    pub enable_notifications: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial settings update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub default_time_limit: Option<i64>,
    pub notification_sound_url: Option<String>,
    pub theme: Option<String>,
    pub enable_notifications: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.default_time_limit.is_none()
            && self.notification_sound_url.is_none()
            && self.theme.is_none()
            && self.enable_notifications.is_none()
    }
}
