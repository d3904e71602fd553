use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role attached to a resolved session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Viewer,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "staff" => Some(Role::Staff),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Viewer => "viewer",
        }
    }
}

/// Identity resolved from a bearer token, passed explicitly into every operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_name: Option<String>,
    pub role: Role,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: None,
            role,
        }
    }

    pub fn with_details(user_id: String, user_name: Option<String>, role: Role) -> Self {
        Self {
            user_id,
            user_name,
            role,
        }
    }

    /// Viewers can read selections but not submit versions
    pub fn can_submit(&self) -> bool {
        self.role != Role::Viewer
    }
}

/// Sessions are stored by the SHA-256 hex digest of their bearer token.
pub fn session_token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_permissions() {
        for role in [Role::Admin, Role::Manager, Role::Staff, Role::Viewer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);

        assert!(UserContext::new("u1", Role::Staff).can_submit());
        assert!(!UserContext::new("u2", Role::Viewer).can_submit());
    }

    #[test]
    fn test_session_token_digest() {
        let digest = session_token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
