//! Account lifecycle and the authorization boundary.
//!
//! Every service operation takes an already-authorized [`User`] actor;
//! this module is where tokens become actors. Role enforcement happens
//! here and in [`require_admin`], never re-derived deeper in the stack.

use std::sync::Arc;

use tracing::{info, instrument};

use officewatch_store::{User, UserRole, UserStore};

use crate::credential::TokenKeeper;
use crate::error::{ServiceError, ServiceResult};

/// A successful login: the credential plus the role the client needs for
/// its view switching.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub role: UserRole,
}

/// Signup, login, and token-to-actor resolution.
#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    tokens: Arc<TokenKeeper>,
}

impl AuthService {
    pub fn new(users: UserStore, tokens: Arc<TokenKeeper>) -> Self {
        Self { users, tokens }
    }

    /// Register a new account. A taken username is a
    /// [`ServiceError::Conflict`].
    #[instrument(skip(self, password))]
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> ServiceResult<User> {
        let user = self.users.create(username, password, role).await?;
        info!(user_id = %user.id, username = %user.username, role = %user.role, "account registered");
        Ok(user)
    }

    /// Authenticate and issue a credential.
    ///
    /// Unknown username and wrong password are indistinguishable to the
    /// caller.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<Session> {
        let user = self
            .users
            .authenticate(username, password)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("invalid username or password".into()))?;

        let token = self.tokens.issue(&user.id, user.role)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(Session {
            token,
            role: user.role,
        })
    }

    /// Resolve a token into its account.
    ///
    /// The account is re-read from the store so a token outliving its
    /// user (or a role recorded at issue time) never grants access the
    /// store no longer backs.
    #[instrument(skip(self, token))]
    pub async fn authorize(&self, token: &str) -> ServiceResult<User> {
        let claims = self.tokens.verify(token)?;
        self.users
            .get(&claims.sub)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("invalid credentials".into()))
    }
}

/// Gate an operation on the admin role.
pub fn require_admin(actor: &User) -> ServiceResult<()> {
    if actor.role != UserRole::Admin {
        return Err(ServiceError::Forbidden(format!(
            "user {} is not an admin",
            actor.username
        )));
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
