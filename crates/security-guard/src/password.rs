//! Password policy, token generation and hashing

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::patterns::{COMMON_PASSWORDS, DIGIT, LOWERCASE, SPECIAL_CHAR, UPPERCASE};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Checks every rule and reports all failures
pub fn validate_password(password: &str) -> PasswordCheck {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !UPPERCASE.is_match(password) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !LOWERCASE.is_match(password) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !DIGIT.is_match(password) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !SPECIAL_CHAR.is_match(password) {
        errors.push("Password must contain at least one special character".to_string());
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        errors.push("Password is too common".to_string());
    }

    PasswordCheck {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Random alphanumeric token
pub fn generate_secure_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Lowercase hex SHA-256 digest
pub fn hash_data(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        let weak = validate_password("password");
        assert!(!weak.is_valid);
        assert!(weak.errors.contains(&"Password is too common".to_string()));
        assert!(weak
            .errors
            .contains(&"Password must contain at least one uppercase letter".to_string()));

        let short = validate_password("Ab1!");
        assert_eq!(short.errors, vec!["Password must be at least 8 characters long"]);

        assert!(validate_password("Portf0lio!Mgr").is_valid);
    }

    #[test]
    fn test_token() {
        let token = generate_secure_token(DEFAULT_TOKEN_LENGTH);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_secure_token(DEFAULT_TOKEN_LENGTH));
    }

    #[test]
    fn test_hash() {
        assert_eq!(
            hash_data("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_data("abc").len(), 64);
    }
}
