//! Authentication and authorization module
//!
//! Provides JWT-based authentication and role-based access control.

mod jwt;
mod middleware;
mod password;

pub use jwt::{Claims, JwtKeys, TokenPair, TokenType};
pub use middleware::{auth_middleware, require_role};
pub use password::{hash_password, verify_password};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User roles for authorization, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to the tenant's data
    #[default]
    Viewer,
    /// Manages customers and drafts proposals
    Sales,
    /// Approves proposals, manages the product catalog
    Manager,
    /// Full tenant administration
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Sales => "sales",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn can_approve(&self) -> bool {
        *self >= Role::Manager
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "sales" => Ok(Role::Sales),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::Sales);
        assert!(Role::Sales > Role::Viewer);
    }

    #[test]
    fn test_role_permissions() {
        assert!(!Role::Sales.can_approve());
        assert!(Role::Manager.can_approve());
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Viewer, Role::Sales, Role::Manager, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }
}
