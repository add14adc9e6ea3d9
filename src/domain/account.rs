use serde::{Deserialize, Serialize};

/// Account records are owned by the identity service; only the role matters
/// here, since broadcasts target the client population and staff/admin
/// accounts are excluded from fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Client,
    Staff,
    Admin,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Client => "client",
            AccountRole::Staff => "staff",
            AccountRole::Admin => "admin",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "client" => Some(AccountRole::Client),
            "staff" => Some(AccountRole::Staff),
            "admin" => Some(AccountRole::Admin),
            _ => None,
        }
    }
}
