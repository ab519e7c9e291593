//! User roles as a closed variant.
//!
//! The backend reports a role string at login. Rather than comparing that
//! string ad hoc wherever behavior differs, it is parsed once into `Role`
//! and every difference in behavior goes through an exhaustive match, so
//! adding a role is a compile error until every branch is handled.

use serde::{Deserialize, Serialize};

/// Account role on the Classline backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Student account: sees own notifications and marks.
    Student,
    /// Teacher account: sees class rosters and feedback threads.
    Teacher,
    /// Admin account: full management surface.
    Admin,
}

impl Role {
    /// String representation used in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// The landing view the CLI opens after login.
    ///
    /// This is the single role-dispatch boundary; screens downstream take
    /// the view name, never the role.
    pub fn landing_view(&self) -> &'static str {
        match self {
            Role::Student => "notifications",
            Role::Teacher => "classes",
            Role::Admin => "dashboard",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::Student.as_str(), "student");
        assert_eq!(Role::Teacher.as_str(), "teacher");
        assert_eq!(Role::Admin.as_str(), "admin");
    }

    #[test]
    fn test_role_from_str_case_insensitive() {
        assert_eq!(Role::from_str("Admin").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("TEACHER").unwrap(), Role::Teacher);
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert!(Role::from_str("principal").is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let role: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(role, Role::Teacher);
    }

    #[test]
    fn test_landing_view_per_role() {
        assert_eq!(Role::Student.landing_view(), "notifications");
        assert_eq!(Role::Teacher.landing_view(), "classes");
        assert_eq!(Role::Admin.landing_view(), "dashboard");
    }
}
