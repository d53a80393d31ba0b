use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskPatch};

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    name: &str,
    category: Option<&str>,
    color: Option<&str>,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (user_id, name, category, color)
         VALUES ($1, $2, $3, COALESCE($4, '#3B82F6'))
         RETURNING *",
    )
    .bind(user_id)
    .bind(name)
    .bind(category)
    .bind(color)
    .fetch_one(db)
    .await
}

pub async fn list(
    db: &PgPool,
    user_id: Uuid,
    include_inactive: bool,
) -> Result<Vec<Task>, sqlx::Error> {
    let query = if include_inactive {
        "SELECT * FROM tasks WHERE user_id = $1 ORDER BY created_at DESC"
    } else {
        "SELECT * FROM tasks WHERE user_id = $1 AND is_active = TRUE ORDER BY created_at DESC"
    };
    sqlx::query_as::<_, Task>(query).bind(user_id).fetch_all(db).await
}

pub async fn find(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
}

/// Apply a typed patch; COALESCE keeps columns the patch leaves unset.
pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    patch: &TaskPatch,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "UPDATE tasks
         SET name = COALESCE($3, name),
             category = COALESCE($4, category),
             color = COALESCE($5, color),
             is_active = COALESCE($6, is_active),
             updated_at = NOW()
         WHERE id = $1 AND user_id = $2
         RETURNING *",
    )
    .bind(task_id)
    .bind(user_id)
    .bind(patch.name.as_deref())
    .bind(patch.category.as_deref())
    .bind(patch.color.as_deref())
    .bind(patch.is_active)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, user_id: Uuid, task_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
