use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{SessionStore, UserStore};
use crate::auth::models::{Session, StoredRefreshToken, User};
use crate::error::StoreError;

/// Apply the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: User) -> Result<Uuid, StoreError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&user.email)
            .fetch_one(&self.pool)
            .await?;
        if taken {
            return Err(StoreError::Duplicate("email"));
        }

        // The unique index still catches a concurrent insert of the same email
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate(_) => StoreError::Duplicate("email"),
            other => other,
        })?;

        Ok(user.id)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, name, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or(StoreError::NotFound("user"))
    }
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token_id: Uuid,
    access_token_id: Uuid,
    token_hash: String,
    refresh_expires_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            refresh_token: StoredRefreshToken {
                id: row.refresh_token_id,
                user_id: row.user_id,
                access_token_id: row.access_token_id,
                token_hash: row.token_hash,
                expires_at: row.refresh_expires_at,
            },
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, refresh_token_id, access_token_id, token_hash,
                 refresh_expires_at, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.refresh_token.id)
        .bind(session.refresh_token.access_token_id)
        .bind(&session.refresh_token.token_hash)
        .bind(session.refresh_token.expires_at)
        .bind(session.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate(_) => StoreError::Duplicate("session"),
            other => other,
        })?;

        Ok(())
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Session, StoreError> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_id, access_token_id, token_hash,
                   refresh_expires_at, expires_at
            FROM sessions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Session::from)
        .ok_or(StoreError::NotFound("session"))
    }

    async fn update(&self, session: Session) -> Result<(), StoreError> {
        // Single statement: concurrent rotations never mix fields
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token_id = $2,
                access_token_id = $3,
                token_hash = $4,
                refresh_expires_at = $5,
                expires_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.refresh_token.id)
        .bind(session.refresh_token.access_token_id)
        .bind(&session.refresh_token.token_hash)
        .bind(session.refresh_token.expires_at)
        .bind(session.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("session"));
        }
        Ok(())
    }
}
