//! Third-party OAuth providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An external provider a user can link their account to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    GitLab,
}

impl OAuthProvider {
    /// Identifier stored alongside flow state and tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitLab => "gitlab",
        }
    }

    /// Scope requested during authorization.
    pub fn scope(&self) -> &'static str {
        match self {
            Self::GitLab => "api",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "gitlab" => Ok(Self::GitLab),
            other => Err(crate::Error::UnknownProvider(other.to_string())),
        }
    }
}
