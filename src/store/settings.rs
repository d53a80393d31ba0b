use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Settings, SettingsPatch};

/// Fetch the user's settings row, creating the defaults row on first touch.
/// The insert-then-select pair is safe under concurrent first reads: ON
/// CONFLICT DO NOTHING lets the loser fall through to the select.
pub async fn get_or_create(db: &PgPool, user_id: Uuid) -> Result<Settings, sqlx::Error> {
    sqlx::query("INSERT INTO settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(db)
        .await?;

    sqlx::query_as::<_, Settings>("SELECT * FROM settings WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
}

pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    patch: &SettingsPatch,
) -> Result<Settings, sqlx::Error> {
    // Ensure the row exists so the patch always has something to land on.
    get_or_create(db, user_id).await?;

    sqlx::query_as::<_, Settings>(
        "UPDATE settings
         SET default_time_limit = COALESCE($2, default_time_limit),
             notification_sound_url = COALESCE($3, notification_sound_url),
             theme = COALESCE($4, theme),
             enable_notifications = COALESCE($5, enable_notifications),
             updated_at = NOW()
         WHERE user_id = $1
         RETURNING *",
    )
    .bind(user_id)
    .bind(patch.default_time_limit)
    .bind(patch.notification_sound_url.as_deref())
    .bind(patch.theme.as_deref())
    .bind(patch.enable_notifications)
    .fetch_one(db)
    .await
}
