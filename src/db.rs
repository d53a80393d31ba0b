use sqlx::PgPool;

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// Idempotent schema setup, executed at startup. The partial unique indexes on
/// `sessions` and `breaks` are what make `start` race-safe: the insert itself
/// is the active-timer check, so two concurrent starts cannot both succeed.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        category TEXT,
        color TEXT NOT NULL DEFAULT '#3B82F6',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    // task_id is RESTRICT: a task with recorded sessions cannot be deleted,
    // only deactivated, so historical reports stay reconstructible.
    "CREATE TABLE IF NOT EXISTS sessions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE RESTRICT,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        start_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        end_time TIMESTAMPTZ,
        duration BIGINT NOT NULL DEFAULT 0,
        time_limit BIGINT,
        time_limit_reached BOOLEAN NOT NULL DEFAULT FALSE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS sessions_one_active_per_user
        ON sessions (user_id) WHERE end_time IS NULL",
    "CREATE INDEX IF NOT EXISTS sessions_user_start_idx
        ON sessions (user_id, start_time)",
    "CREATE INDEX IF NOT EXISTS sessions_task_idx
        ON sessions (task_id, start_time)",
    "CREATE TABLE IF NOT EXISTS breaks (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        start_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        end_time TIMESTAMPTZ,
        duration BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS breaks_one_active_per_user
        ON breaks (user_id) WHERE end_time IS NULL",
    "CREATE INDEX IF NOT EXISTS breaks_user_start_idx
        ON breaks (user_id, start_time)",
    "CREATE TABLE IF NOT EXISTS settings (
        user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        default_time_limit BIGINT NOT NULL DEFAULT 1500,
        notification_sound_url TEXT,
        theme TEXT NOT NULL DEFAULT 'dark',
        enable_notifications BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
];

pub async fn init_schema(db: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}
