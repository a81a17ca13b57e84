//! In-memory identity provider.

use async_trait::async_trait;
use bloom_server::identity::{IdentityError, IdentityProvider, IdentityResult, Session, User};
use std::collections::HashMap;

/// Access token of the seeded user.
pub const USER_TOKEN: &str = "token-ada";
/// Refresh token of the seeded user.
pub const USER_REFRESH_TOKEN: &str = "refresh-ada";
pub const USER_ID: &str = "0b7e2a1c-user-ada";
pub const USER_EMAIL: &str = "ada@salk.edu";
pub const USER_PASSWORD: &str = "correct horse";
/// Auth code accepted by `exchange_code_for_session`.
pub const AUTH_CODE: &str = "auth-code-ada";

/// Identity provider that knows exactly one user.
#[derive(Default)]
pub struct FakeIdentity {
    users: HashMap<String, User>,
}

#[allow(dead_code)]
impl FakeIdentity {
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert(
            USER_TOKEN.to_string(),
            User {
                id: USER_ID.to_string(),
                email: Some(USER_EMAIL.to_string()),
            },
        );
        Self { users }
    }

    fn session(&self) -> Session {
        Session {
            access_token: USER_TOKEN.to_string(),
            refresh_token: USER_REFRESH_TOKEN.to_string(),
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
            user: self.users.get(USER_TOKEN).cloned(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_user(&self, access_token: &str) -> IdentityResult<Option<User>> {
        Ok(self.users.get(access_token).cloned())
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> IdentityResult<Session> {
        if self.users.contains_key(access_token) || refresh_token == USER_REFRESH_TOKEN {
            Ok(self.session())
        } else {
            Err(IdentityError::Rejected("Invalid Refresh Token".to_string()))
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Session> {
        if email == USER_EMAIL && password == USER_PASSWORD {
            Ok(self.session())
        } else {
            Err(IdentityError::Rejected("Invalid login credentials".to_string()))
        }
    }

    async fn exchange_code_for_session(&self, code: &str) -> IdentityResult<Session> {
        if code == AUTH_CODE {
            Ok(self.session())
        } else {
            Err(IdentityError::Rejected("invalid flow state".to_string()))
        }
    }

    async fn list_users(&self) -> IdentityResult<Vec<User>> {
        Ok(self.users.values().cloned().collect())
    }
}
