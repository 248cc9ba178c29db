use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const MIN_PASSWORD_LEN: usize = 6;
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// The locally remembered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Connection identifier from the last session, if any. Goes stale on
    /// reconnect.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

/// Sign-up form input.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

fn email_pattern() -> Result<&'static Regex, ClientError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(EMAIL_PATTERN))
        .as_ref()
        .map_err(|e| ClientError::Validation(vec![format!("Email check unavailable: {}", e)]))
}

impl Registration {
    /// Checks every field and returns all problems at once. Name and email are
    /// trimmed first, so surrounding whitespace is neither an error nor kept.
    pub fn validate(&self) -> Result<Profile, ClientError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("Name is required".to_string());
        }

        let email = self.email.trim();
        if email.is_empty() {
            problems.push("Email is required".to_string());
        } else if !email_pattern()?.is_match(email) {
            problems.push("Invalid email".to_string());
        }

        if self.password.is_empty() {
            problems.push("Password is required".to_string());
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            problems.push(format!("Password must be at least {} characters", MIN_PASSWORD_LEN));
        }

        if !problems.is_empty() {
            return Err(ClientError::Validation(problems));
        }

        Ok(Profile {
            id: None,
            name: self.name.trim().to_string(),
            email: email.to_string(),
        })
    }
}
