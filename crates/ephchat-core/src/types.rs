//! Identity type shared by every ephchat component

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Minimum identity length in characters
pub const MIN_IDENTITY_LEN: usize = 3;

/// Maximum identity length in characters
pub const MAX_IDENTITY_LEN: usize = 30;

/// Normalized user identity.
///
/// Identities are case-insensitive: they are lowercased on parse and must
/// be [`MIN_IDENTITY_LEN`] to [`MAX_IDENTITY_LEN`] ASCII alphanumeric
/// characters. Surrounding whitespace is not stripped.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and normalize an identity
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(Error::InvalidIdentity("identity is empty".to_string()));
        }
        if normalized.len() < MIN_IDENTITY_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity shorter than {} characters",
                MIN_IDENTITY_LEN
            )));
        }
        if normalized.len() > MAX_IDENTITY_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity longer than {} characters",
                MAX_IDENTITY_LEN
            )));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidIdentity(format!(
                "'{}' contains non-alphanumeric characters",
                raw
            )));
        }

        Ok(Self(normalized))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}
