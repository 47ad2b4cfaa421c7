/// Persistence capabilities consumed by the auth workflows
///
/// Stores are passive adapters: they enforce uniqueness (email, user id) and
/// atomic single-record updates, nothing else.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::models::{Session, User};
use crate::error::StoreError;

pub use memory::{InMemorySessionStore, InMemoryUserStore};
pub use postgres::{run_migrations, PgSessionStore, PgUserStore};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `Duplicate` if the email is taken.
    async fn create(&self, user: User) -> Result<Uuid, StoreError>;

    /// Fails with `NotFound` if no user has this (normalized) email.
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert the session for a user that has none yet.
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Session, StoreError>;

    /// Replace the refresh-token fields and expiry of the session with
    /// `session.id` in one atomic write.
    async fn update(&self, session: Session) -> Result<(), StoreError>;
}
