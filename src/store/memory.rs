use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{SessionStore, UserStore};
use crate::auth::models::{Session, User};
use crate::error::StoreError;

/// Users keyed by their normalized email
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: User) -> Result<Uuid, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let id = user.id;
        users.insert(user.email.clone(), user);
        Ok(id)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<Uuid, Session>,
    // unique index: user id -> session id
    by_user: HashMap<Uuid, Uuid>,
}

/// Sessions with a unique user-id index, all writes under one lock
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Sessions>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.by_user.contains_key(&session.user_id) || inner.by_id.contains_key(&session.id) {
            return Err(StoreError::Duplicate("session"));
        }
        inner.by_user.insert(session.user_id, session.id);
        inner.by_id.insert(session.id, session);
        Ok(())
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Session, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .by_user
            .get(&user_id)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
            .ok_or(StoreError::NotFound("session"))
    }

    async fn update(&self, session: Session) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .by_id
            .get_mut(&session.id)
            .ok_or(StoreError::NotFound("session"))?;
        current.refresh_token = session.refresh_token;
        current.expires_at = session.expires_at;
        Ok(())
    }
}
