//! User account persistence.
//!
//! SQLite-backed storage for user accounts with password hashing via
//! PBKDF2-HMAC-SHA256 (ring). Passwords are stored as
//! `base64(salt):base64(hash)` strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A user account. Owns subscriptions and authors requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Unique login name.
    pub username: String,
    /// Access level. Immutable after creation.
    pub role: UserRole,
    /// Unix timestamp when the account was created.
    pub created_at: i64,
}

/// Role-based access levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Sees every request and decides approvals.
    Admin,
    /// Sees only their own requests and inventory.
    Employee,
}

impl UserRole {
    pub(crate) fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown user role: {other}"
            ))),
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Password hashing
// ═══════════════════════════════════════════════════════════════════════

/// PBKDF2-HMAC-SHA256 iteration count (OWASP 2023).
const PBKDF2_ITERATIONS: u32 = 600_000;

const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a password into a storable `base64(salt):base64(hash)` string.
fn hash_password(password: &str) -> StoreResult<String> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| StoreError::InvalidArgument("failed to generate random salt".into()))?;

    let mut hash = [0u8; KEY_LEN];
    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!("{}:{}", BASE64.encode(salt), BASE64.encode(hash)))
}

/// Verify a password against a stored `base64(salt):base64(hash)` string.
fn verify_password(password: &str, stored: &str) -> StoreResult<bool> {
    let parts: Vec<&str> = stored.splitn(2, ':').collect();
    if parts.len() != 2 {
        return Err(StoreError::InvalidArgument("malformed password hash".into()));
    }

    let salt = BASE64
        .decode(parts[0])
        .map_err(|e| StoreError::InvalidArgument(format!("invalid salt encoding: {e}")))?;
    let expected_hash = BASE64
        .decode(parts[1])
        .map_err(|e| StoreError::InvalidArgument(format!("invalid hash encoding: {e}")))?;

    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");

    Ok(pbkdf2::verify(
        PBKDF2_ALG,
        iterations,
        &salt,
        password.as_bytes(),
        &expected_hash,
    )
    .is_ok())
}

// ═══════════════════════════════════════════════════════════════════════
//  UserStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on user accounts.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a new user store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new user account.
    ///
    /// The password is hashed before storage. Fails with
    /// [`StoreError::Duplicate`] if the username is taken.
    #[instrument(skip(self, password))]
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> StoreResult<User> {
        if username.is_empty() {
            return Err(StoreError::InvalidArgument(
                "username must not be empty".into(),
            ));
        }
        if password.is_empty() {
            return Err(StoreError::InvalidArgument(
                "password must not be empty".into(),
            ));
        }

        let id = Uuid::now_v7().to_string();
        let username = username.to_string();
        let role_str = role.as_str();
        let now = Utc::now().timestamp();

        let password_hash = hash_password(password)?;

        let user = User {
            id: id.clone(),
            username: username.clone(),
            role,
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, password_hash, role, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id, username, password_hash, role_str, now],
                )
                .map_err(|e| {
                    if let rusqlite::Error::SqliteFailure(ref err, _) = e
                        && err.code == rusqlite::ErrorCode::ConstraintViolation
                    {
                        return StoreError::Duplicate {
                            entity: "user",
                            key: username.clone(),
                        };
                    }
                    StoreError::Sqlite(e)
                })?;
                Ok(())
            })
            .await?;

        debug!(user_id = %user.id, username = %user.username, role = %user.role, "user created");
        Ok(user)
    }

    /// Fetch a single user by ID, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, username, role, created_at FROM users WHERE id = ?1",
                    rusqlite::params![id],
                    map_user_row,
                );
                match result {
                    Ok(row) => row.into_user().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Fetch a single user by username, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let username = username.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, username, role, created_at FROM users WHERE username = ?1",
                    rusqlite::params![username],
                    map_user_row,
                );
                match result {
                    Ok(row) => row.into_user().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Authenticate a user by username and password.
    ///
    /// Returns `Some(User)` if the credentials are valid, `None` otherwise.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> StoreResult<Option<User>> {
        let username = username.to_string();
        let password = password.to_string();

        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, username, role, created_at, password_hash \
                     FROM users WHERE username = ?1",
                    rusqlite::params![username],
                    |row| {
                        Ok((
                            UserRow {
                                id: row.get(0)?,
                                username: row.get(1)?,
                                role: row.get(2)?,
                                created_at: row.get(3)?,
                            },
                            row.get::<_, String>(4)?,
                        ))
                    },
                );

                match result {
                    Ok((row, password_hash)) => {
                        if verify_password(&password, &password_hash)? {
                            row.into_user().map(Some)
                        } else {
                            Ok(None)
                        }
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }
}

// ── row mapping ──────────────────────────────────────────────────────

struct UserRow {
    id: String,
    username: String,
    role: String,
    created_at: i64,
}

impl UserRow {
    fn into_user(self) -> StoreResult<User> {
        let role = UserRole::from_str(&self.role)?;
        Ok(User {
            id: self.id,
            username: self.username,
            role,
            created_at: self.created_at,
        })
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> UserStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        UserStore::new(db)
    }

    #[tokio::test]
    async fn create_and_get_user() {
        let store = setup_store().await;

        let user = store
            .create("alice", "secure-password-123", UserRole::Employee)
            .await
            .unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.role, UserRole::Employee);
        assert!(user.created_at > 0);

        let fetched = store.get(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.username, "alice");
    }

    #[tokio::test]
    async fn get_nonexistent_user_returns_none() {
        let store = setup_store().await;
        assert!(store.get("nonexistent-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_by_username() {
        let store = setup_store().await;

        store
            .create("bob", "password123", UserRole::Admin)
            .await
            .unwrap();

        let found = store.get_by_username("bob").await.unwrap().unwrap();
        assert_eq!(found.username, "bob");
        assert_eq!(found.role, UserRole::Admin);

        assert!(store.get_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_valid_credentials() {
        let store = setup_store().await;

        store
            .create("charlie", "my-secret-pw", UserRole::Employee)
            .await
            .unwrap();

        let result = store.authenticate("charlie", "my-secret-pw").await.unwrap();
        assert_eq!(result.unwrap().username, "charlie");
    }

    #[tokio::test]
    async fn authenticate_wrong_password_returns_none() {
        let store = setup_store().await;

        store
            .create("diana", "correct-password", UserRole::Employee)
            .await
            .unwrap();

        let result = store.authenticate("diana", "wrong-password").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn authenticate_nonexistent_user_returns_none() {
        let store = setup_store().await;
        let result = store.authenticate("ghost", "any-password").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let store = setup_store().await;

        store
            .create("unique_name", "password1", UserRole::Employee)
            .await
            .unwrap();

        let result = store
            .create("unique_name", "password2", UserRole::Admin)
            .await;

        match result.unwrap_err() {
            StoreError::Duplicate { entity, key } => {
                assert_eq!(entity, "user");
                assert_eq!(key, "unique_name");
            }
            other => panic!("expected Duplicate, got: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_username_rejected() {
        let store = setup_store().await;
        let result = store.create("", "password", UserRole::Employee).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn empty_password_rejected() {
        let store = setup_store().await;
        let result = store.create("user", "", UserRole::Employee).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn password_hash_is_salted() {
        let hash1 = hash_password("same-password").unwrap();
        let hash2 = hash_password("same-password").unwrap();
        assert_ne!(hash1, hash2, "hashes should differ due to random salt");

        assert!(verify_password("same-password", &hash1).unwrap());
        assert!(verify_password("same-password", &hash2).unwrap());
    }
}
