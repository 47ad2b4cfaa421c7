use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use session_rotor::auth::{
    AuthService, CredentialHasher, RequestContext, ServicePolicy, Session, TokenIssuer,
};
use session_rotor::error::{AuthError, StoreError};
use session_rotor::store::{InMemorySessionStore, InMemoryUserStore, SessionStore, UserStore};
use uuid::Uuid;

const SECRET: &[u8] = b"test-secret-key-at-least-32-characters-long";

struct TestApp {
    service: AuthService,
    sessions: Arc<dyn SessionStore>,
    users: Arc<InMemoryUserStore>,
}

fn policy() -> ServicePolicy {
    ServicePolicy {
        access_ttl: Duration::hours(1),
        refresh_ttl: Duration::days(30),
        query_timeout: StdDuration::from_secs(5),
        require_access_token_on_refresh: false,
    }
}

fn hasher() -> CredentialHasher {
    CredentialHasher::new(4 /* bcrypt minimum cost */)
}

fn spawn_with(sessions: Arc<dyn SessionStore>, policy: ServicePolicy) -> TestApp {
    let users = Arc::new(InMemoryUserStore::new());
    let service = AuthService::new(
        users.clone(),
        sessions.clone(),
        hasher(),
        TokenIssuer::new(SECRET, "test"),
        policy,
    );
    TestApp {
        service,
        sessions,
        users,
    }
}

fn spawn_app() -> TestApp {
    spawn_with(Arc::new(InMemorySessionStore::new()), policy())
}

fn ctx() -> RequestContext {
    RequestContext::new()
}

// --- Sign-up ---

#[tokio::test]
async fn sign_up_stores_only_the_hash_of_the_returned_refresh_token() {
    let app = spawn_app();

    let outcome = app
        .service
        .sign_up(&ctx(), "Alice", "a@x.com", "pw1")
        .await
        .expect("Failed to sign up");

    let session = app.sessions.get_by_user_id(outcome.user_id).await.unwrap();
    let plaintext = &outcome.tokens.refresh.token;

    assert_ne!(&session.refresh_token.token_hash, plaintext);
    assert!(hasher().verify(plaintext, &session.refresh_token.token_hash).await);
    assert_eq!(session.refresh_token.id, outcome.tokens.refresh.id);
    assert_eq!(session.refresh_token.access_token_id, outcome.tokens.access.id);
    assert_eq!(session.expires_at, outcome.tokens.refresh.expires_at);
}

#[tokio::test]
async fn sign_up_access_token_identifies_the_new_user() {
    let app = spawn_app();

    let outcome = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let subject = app
        .service
        .token_issuer()
        .validate_token(&outcome.tokens.access.token)
        .unwrap();
    assert_eq!(subject, outcome.user_id);
}

#[tokio::test]
async fn sign_up_never_stores_the_plain_password() {
    let app = spawn_app();
    app.service.sign_up(&ctx(), "Alice", "A@X.com", "pw1").await.unwrap();

    let user = app.users.get_by_email("a@x.com").await.unwrap();
    assert_eq!(user.email, "a@x.com");
    assert_ne!(user.password_hash, "pw1");
    assert!(hasher().verify("pw1", &user.password_hash).await);
}

#[tokio::test]
async fn sign_up_rejects_duplicate_email_case_insensitively() {
    let app = spawn_app();
    app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let err = app
        .service
        .sign_up(&ctx(), "Other Alice", " A@X.COM ", "pw2")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::AlreadyExists));
}

#[tokio::test]
async fn sign_up_rejects_invalid_input() {
    let app = spawn_app();
    let cases = [
        ("", "a@x.com", "pw1", "missing name"),
        ("Alice", "not-an-email", "pw1", "invalid email"),
        ("Alice", "", "pw1", "missing email"),
        ("Alice", "a@x.com", "", "missing password"),
    ];

    for (name, email, password, reason) in cases {
        let err = app.service.sign_up(&ctx(), name, email, password).await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidInput(_)),
            "Should reject {}: got {:?}",
            reason,
            err
        );
    }
}

// --- Login ---

#[tokio::test]
async fn login_with_wrong_password_fails_with_invalid_credentials() {
    let app = spawn_app();
    app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    for wrong in ["pw2", "PW1", "pw1 ", "x"] {
        let err = app.service.login(&ctx(), "a@x.com", wrong).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials), "password {:?}", wrong);
    }
}

#[tokio::test]
async fn login_with_unknown_email_is_indistinguishable_from_wrong_password() {
    let app = spawn_app();

    let err = app.service.login(&ctx(), "nobody@x.com", "pw1").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn login_rotates_away_the_sign_up_refresh_token() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let logged_in = app
        .service
        .login(&ctx(), "a@x.com", "pw1")
        .await
        .expect("Login should succeed");

    assert_ne!(logged_in.refresh.token, signed_up.tokens.refresh.token);
    assert_ne!(logged_in.access.id, signed_up.tokens.access.id);
    assert_eq!(logged_in.access.user_id, signed_up.user_id);

    let err = app
        .service
        .refresh(&ctx(), signed_up.user_id, &signed_up.tokens.refresh.token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));

    app.service
        .refresh(&ctx(), signed_up.user_id, &logged_in.refresh.token, None)
        .await
        .expect("Newest refresh token should work");
}

#[tokio::test]
async fn login_updates_the_session_in_place() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    let before = app.sessions.get_by_user_id(signed_up.user_id).await.unwrap();

    app.service.login(&ctx(), "a@x.com", "pw1").await.unwrap();

    let after = app.sessions.get_by_user_id(signed_up.user_id).await.unwrap();
    assert_eq!(after.id, before.id);
    assert_ne!(after.refresh_token.token_hash, before.refresh_token.token_hash);
}

// --- Refresh ---

#[tokio::test]
async fn refresh_with_latest_token_returns_a_new_one() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let mut current = signed_up.tokens.refresh.token.clone();
    for _ in 0..3 {
        let pair = app
            .service
            .refresh(&ctx(), signed_up.user_id, &current, None)
            .await
            .expect("Refresh should succeed");

        assert_ne!(pair.refresh.token, current);
        assert_eq!(pair.refresh.access_token_id, pair.access.id);
        current = pair.refresh.token;
    }
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    let token = signed_up.tokens.refresh.token;

    app.service
        .refresh(&ctx(), signed_up.user_id, &token, None)
        .await
        .expect("First refresh should succeed");

    let err = app
        .service
        .refresh(&ctx(), signed_up.user_id, &token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn refresh_with_unknown_token_fails_with_invalid_token_not_not_found() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    for bogus in ["never-issued", ""] {
        let err = app
            .service
            .refresh(&ctx(), signed_up.user_id, bogus, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)), "token {:?}", bogus);
    }
}

#[tokio::test]
async fn refresh_for_user_without_session_fails_with_not_found() {
    let app = spawn_app();

    let err = app
        .service
        .refresh(&ctx(), Uuid::new_v4(), "whatever", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn refresh_rejects_expired_session() {
    let mut policy = policy();
    policy.refresh_ttl = Duration::seconds(-1);
    let app = spawn_with(Arc::new(InMemorySessionStore::new()), policy);
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let err = app
        .service
        .refresh(&ctx(), signed_up.user_id, &signed_up.tokens.refresh.token, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn concurrent_refreshes_leave_exactly_one_valid_token() {
    let app = spawn_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    let user_id = signed_up.user_id;
    let token = signed_up.tokens.refresh.token;

    let first_ctx = ctx();
    let second_ctx = ctx();
    let (first, second) = tokio::join!(
        app.service.refresh(&first_ctx, user_id, &token, None),
        app.service.refresh(&second_ctx, user_id, &token, None),
    );

    let issued: Vec<String> = [first, second]
        .into_iter()
        .filter_map(|result| match result {
            Ok(pair) => Some(pair.refresh.token),
            Err(AuthError::InvalidToken(_)) => None,
            Err(other) => panic!("Unexpected error: {:?}", other),
        })
        .collect();
    assert!(!issued.is_empty());

    let stored = app.sessions.get_by_user_id(user_id).await.unwrap();
    let mut valid = 0;
    for candidate in &issued {
        if hasher().verify(candidate, &stored.refresh_token.token_hash).await {
            valid += 1;
        }
    }
    assert_eq!(valid, 1);
}

// --- Refresh with bearer cross-check ---

fn hardened_app() -> TestApp {
    let mut policy = policy();
    policy.require_access_token_on_refresh = true;
    spawn_with(Arc::new(InMemorySessionStore::new()), policy)
}

#[tokio::test]
async fn hardened_refresh_accepts_own_access_token() {
    let app = hardened_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    app.service
        .refresh(
            &ctx(),
            signed_up.user_id,
            &signed_up.tokens.refresh.token,
            Some(&signed_up.tokens.access.token),
        )
        .await
        .expect("Refresh with matching bearer should succeed");
}

#[tokio::test]
async fn hardened_refresh_rejects_missing_bearer() {
    let app = hardened_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let err = app
        .service
        .refresh(&ctx(), signed_up.user_id, &signed_up.tokens.refresh.token, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn hardened_refresh_rejects_bearer_of_another_user() {
    let app = hardened_app();
    let alice = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    let bob = app.service.sign_up(&ctx(), "Bob", "b@x.com", "pw2").await.unwrap();

    let err = app
        .service
        .refresh(
            &ctx(),
            alice.user_id,
            &alice.tokens.refresh.token,
            Some(&bob.tokens.access.token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    // The rejected attempt did not rotate anything
    app.service
        .refresh(
            &ctx(),
            alice.user_id,
            &alice.tokens.refresh.token,
            Some(&alice.tokens.access.token),
        )
        .await
        .expect("Alice's token should still be valid");
}

#[tokio::test]
async fn hardened_refresh_rejects_forged_bearer() {
    let app = hardened_app();
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    let forged = TokenIssuer::new(b"attacker-controlled-secret-32-bytes!!", "test")
        .generate_token_pair(signed_up.user_id, Duration::hours(1), Duration::days(1))
        .unwrap()
        .access
        .token;

    let err = app
        .service
        .refresh(&ctx(), signed_up.user_id, &signed_up.tokens.refresh.token, Some(&forged))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn hardened_refresh_rejects_expired_access_token() {
    let mut policy = policy();
    policy.require_access_token_on_refresh = true;
    policy.access_ttl = Duration::seconds(-5);
    let app = spawn_with(Arc::new(InMemorySessionStore::new()), policy);
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();

    let err = app
        .service
        .refresh(
            &ctx(),
            signed_up.user_id,
            &signed_up.tokens.refresh.token,
            Some(&signed_up.tokens.access.token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));

    // Nothing was rotated
    let stored = app.sessions.get_by_user_id(signed_up.user_id).await.unwrap();
    assert_eq!(stored.refresh_token.id, signed_up.tokens.refresh.id);
}

// --- Store failures ---

/// Session store that can be told to fail inserts or to stall
struct FaultySessionStore {
    inner: InMemorySessionStore,
    fail_create: AtomicBool,
    slow_create: AtomicBool,
    fail_get: AtomicBool,
    stall: AtomicBool,
}

impl FaultySessionStore {
    fn new() -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            fail_create: AtomicBool::new(false),
            slow_create: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            stall: AtomicBool::new(false),
        }
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
        }
    }
}

#[async_trait]
impl SessionStore for FaultySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        self.maybe_stall().await;
        if self.slow_create.load(Ordering::SeqCst) {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.create(session).await
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Session, StoreError> {
        self.maybe_stall().await;
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.get_by_user_id(user_id).await
    }

    async fn update(&self, session: Session) -> Result<(), StoreError> {
        self.maybe_stall().await;
        self.inner.update(session).await
    }
}

#[tokio::test]
async fn failed_session_insert_leaves_user_that_login_recovers() {
    let store = Arc::new(FaultySessionStore::new());
    let app = spawn_with(store.clone(), policy());
    store.fail_create.store(true, Ordering::SeqCst);

    let err = app
        .service
        .sign_up(&ctx(), "Alice", "a@x.com", "pw1")
        .await
        .unwrap_err();
    assert!(err.is_transient());

    // User row stays behind without a session
    let user = app.users.get_by_email("a@x.com").await.unwrap();
    assert!(matches!(
        app.sessions.get_by_user_id(user.id).await.unwrap_err(),
        StoreError::NotFound(_)
    ));

    store.fail_create.store(false, Ordering::SeqCst);
    let pair = app.service.login(&ctx(), "a@x.com", "pw1").await.unwrap();

    app.service
        .refresh(&ctx(), user.id, &pair.refresh.token, None)
        .await
        .expect("Session opened by login should be usable");
}

#[tokio::test]
async fn concurrent_logins_for_user_without_session_both_succeed() {
    let store = Arc::new(FaultySessionStore::new());
    let app = spawn_with(store.clone(), policy());
    store.fail_create.store(true, Ordering::SeqCst);
    app.service
        .sign_up(&ctx(), "Alice", "a@x.com", "pw1")
        .await
        .unwrap_err();
    store.fail_create.store(false, Ordering::SeqCst);
    store.slow_create.store(true, Ordering::SeqCst);

    let first_ctx = ctx();
    let second_ctx = ctx();
    let (first, second) = tokio::join!(
        app.service.login(&first_ctx, "a@x.com", "pw1"),
        app.service.login(&second_ctx, "a@x.com", "pw1"),
    );
    let first = first.expect("First login should succeed");
    let second = second.expect("Second login should succeed");

    let user = app.users.get_by_email("a@x.com").await.unwrap();
    let stored = app.sessions.get_by_user_id(user.id).await.unwrap();
    let mut valid = 0;
    for candidate in [&first.refresh.token, &second.refresh.token] {
        if hasher().verify(candidate, &stored.refresh_token.token_hash).await {
            valid += 1;
        }
    }
    assert_eq!(valid, 1);
}

#[tokio::test]
async fn login_session_lookup_failure_is_transient_and_leaves_session_untouched() {
    let store = Arc::new(FaultySessionStore::new());
    let app = spawn_with(store.clone(), policy());
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    store.fail_get.store(true, Ordering::SeqCst);

    let err = app.service.login(&ctx(), "a@x.com", "pw1").await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::TransientStore {
            source: StoreError::Unavailable(_),
            ..
        }
    ));

    store.fail_get.store(false, Ordering::SeqCst);
    app.service
        .refresh(&ctx(), signed_up.user_id, &signed_up.tokens.refresh.token, None)
        .await
        .expect("Sign-up refresh token should still be valid");
}

#[tokio::test]
async fn store_timeout_surfaces_as_transient_error() {
    let store = Arc::new(FaultySessionStore::new());
    let app = spawn_with(store.clone(), policy());
    let signed_up = app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    store.stall.store(true, Ordering::SeqCst);

    let deadline_ctx = ctx().with_timeout(StdDuration::from_millis(50));
    let err = app
        .service
        .refresh(&deadline_ctx, signed_up.user_id, &signed_up.tokens.refresh.token, None)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(matches!(
        err,
        AuthError::TransientStore {
            source: StoreError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test]
async fn cancelled_request_surfaces_as_transient_error() {
    let store = Arc::new(FaultySessionStore::new());
    let app = spawn_with(store.clone(), policy());
    app.service.sign_up(&ctx(), "Alice", "a@x.com", "pw1").await.unwrap();
    store.stall.store(true, Ordering::SeqCst);

    let cancel_ctx = ctx();
    let token = cancel_ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        token.cancel();
    });

    let err = app.service.login(&cancel_ctx, "a@x.com", "pw1").await.unwrap_err();

    assert!(matches!(
        err,
        AuthError::TransientStore {
            source: StoreError::Cancelled(_),
            ..
        }
    ));
}
