//! Wire models of the User API.

use serde::{Deserialize, Serialize};

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: i64,
    /// Display name
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_wire_format() {
        let user = User {
            id: 42,
            name: "alice".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            serde_json::json!({"id": 42, "name": "alice"})
        );
    }
}
