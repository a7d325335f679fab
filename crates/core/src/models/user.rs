//! User identity models

use crate::types::deserialize_id;
use serde::{Deserialize, Serialize};

/// The signed-in user as returned by `GET /api/auth/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl CurrentUser {
    /// Name to show in the UI (display name, falling back to username)
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("ADMIN")
    }
}

/// Error body returned by the REST API on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_me_response_with_numeric_id() {
        let user: CurrentUser =
            serde_json::from_str(r#"{"id": 17, "username": "mina", "role": "ADMIN"}"#).unwrap();
        assert_eq!(user.id, "17");
        assert_eq!(user.display_name(), "mina");
        assert!(user.is_admin());
    }

    #[test]
    fn test_error_body_falls_back_to_error_field() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"error": "Forbidden"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Forbidden"));
    }
}
