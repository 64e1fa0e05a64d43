use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub position: String,
    pub use_case: String,
    pub created_at: DateTime<Utc>,
}

/// Waitlist sign-up form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWaitlistEntry {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Position cannot be empty"))]
    pub position: String,
    #[validate(length(min = 1, max = 2000, message = "Use case cannot be empty"))]
    pub use_case: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: &str, name: &str) -> CreateWaitlistEntry {
        CreateWaitlistEntry {
            email: email.into(),
            name: name.into(),
            position: "Student".into(),
            use_case: "Studying".into(),
        }
    }

    #[test]
    fn test_valid_entry() {
        assert!(entry("ada@example.com", "Ada").validate().is_ok());
    }

    #[test]
    fn test_invalid_fields_reported() {
        let errors = entry("not-an-email", "").validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("name"));
        assert!(!fields.contains_key("position"));
    }
}
