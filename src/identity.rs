//! Identity records and their public projection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Role granted at registration. Immutable inside this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    #[serde(rename = "user")]
    StandardUser,
    #[serde(rename = "moderator")]
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StandardUser => "user",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::StandardUser),
            "moderator" => Ok(Role::Moderator),
            other => Err(AuthError::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}

/// A persisted user. Never serialised; use [`UserView`] for output.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Insert payload; the store assigns the id
#[derive(Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Caller-facing identity view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$2b$04$abcdefghijklmnopqrstuv".to_string(),
            role: Role::Moderator,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::StandardUser, Role::Moderator] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_default_role_is_standard_user() {
        assert_eq!(Role::default(), Role::StandardUser);
    }

    #[test]
    fn test_view_serialization_excludes_hash() {
        let identity = sample();
        let json = serde_json::to_string(&identity.view()).unwrap();

        assert!(json.contains("\"role\":\"moderator\""));
        assert!(!json.contains("password"));
        assert!(!json.contains(&identity.password_hash));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let identity = sample();
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains(&identity.password_hash));
    }
}
