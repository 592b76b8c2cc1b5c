use serde::{Deserialize, Serialize};

/// Operator role as issued by the gateway.
///
/// Unknown role strings are rejected at the parse boundary rather than
/// mapped to a default; a session must never run with a guessed role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Moderator,
}

impl Role {
    /// Display label for headers and audit lines.
    pub fn label(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Admin => "Admin",
            Role::Moderator => "Moderator",
        }
    }

    /// Whether this role may manage other admin accounts.
    pub fn can_manage_admins(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

/// The operator profile associated 1:1 with a live credential.
///
/// Created on successful login, replaced wholesale on re-login, cleared on
/// logout. Serde renames follow the gateway's wire spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "email")]
    pub email_address: String,
    pub role: Role,
}
