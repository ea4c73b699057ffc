//! Role-based tool restrictions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Marketplace role of the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Sells produce, manages inventory
    Farmer,
    /// Browses and orders produce
    Buyer,
}

impl SessionRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Buyer => "buyer",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "farmer" => Ok(Self::Farmer),
            "buyer" => Ok(Self::Buyer),
            other => Err(Error::Config(format!("unknown role: {other}"))),
        }
    }
}

/// Identity of the session user as far as the assistant knows it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    /// Display name
    pub name: Option<String>,
    /// Role, `None` for guests
    pub role: Option<SessionRole>,
    /// Marketplace user id passed to domain services
    pub user_id: Option<String>,
}

impl UserContext {
    #[must_use]
    pub const fn new(name: Option<String>, role: Option<SessionRole>) -> Self {
        Self {
            name,
            role,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Trimmed non-empty name
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Which roles may invoke a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Anyone, guests included
    Any,
    /// Only sessions with this role
    Only(SessionRole),
}

impl RoleRequirement {
    /// Check a session role against this requirement
    ///
    /// Guests fail every role-specific requirement.
    #[must_use]
    pub fn permits(self, role: Option<SessionRole>) -> bool {
        match self {
            Self::Any => true,
            Self::Only(required) => role == Some(required),
        }
    }

    /// Failure message reported to the model when access is denied
    #[must_use]
    pub fn denial_message(self) -> String {
        match self {
            Self::Any => "access denied".to_string(),
            Self::Only(required) => format!("{required} required"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_checks() {
        let farmer_only = RoleRequirement::Only(SessionRole::Farmer);

        assert!(farmer_only.permits(Some(SessionRole::Farmer)));
        assert!(!farmer_only.permits(Some(SessionRole::Buyer)));
        assert!(!farmer_only.permits(None));
        assert!(RoleRequirement::Any.permits(None));
        assert_eq!(farmer_only.denial_message(), "farmer required");
    }

    #[test]
    fn parses_roles() {
        assert_eq!("Farmer".parse::<SessionRole>().unwrap(), SessionRole::Farmer);
        assert_eq!(" buyer ".parse::<SessionRole>().unwrap(), SessionRole::Buyer);
        assert!("admin".parse::<SessionRole>().is_err());
    }

    #[test]
    fn json_role_names() {
        let role: SessionRole = serde_json::from_str("\"buyer\"").unwrap();
        assert_eq!(role, SessionRole::Buyer);
    }

    #[test]
    fn blank_name_is_ignored() {
        let ctx = UserContext::new(Some("  ".to_string()), None);
        assert!(ctx.display_name().is_none());
    }
}
