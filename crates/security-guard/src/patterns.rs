//! Regular expression tables used by the sanitizer and password policy

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Markup and script fragments rejected in any sanitized input
    pub static ref SUSPICIOUS_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?is)<script\b.*?</script>").unwrap(),
        Regex::new(r"(?i)javascript:").unwrap(),
        Regex::new(r"(?i)on\w+\s*=").unwrap(),
        Regex::new(r"(?i)data:text/html").unwrap(),
        Regex::new(r"(?i)vbscript:").unwrap(),
        Regex::new(r"(?i)expression\s*\(").unwrap(),
        Regex::new(r"(?i)eval\s*\(").unwrap(),
        Regex::new(r"(?i)document\.").unwrap(),
        Regex::new(r"(?i)window\.").unwrap(),
        Regex::new(r"(?i)alert\s*\(").unwrap(),
        Regex::new(r"(?i)confirm\s*\(").unwrap(),
        Regex::new(r"(?i)prompt\s*\(").unwrap(),
    ];

    pub static ref SQL_INJECTION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(union|select|insert|update|delete|drop|create|alter|exec|execute)\b").unwrap(),
        Regex::new(r"(--|/\*|\*/|;)").unwrap(),
        Regex::new(r"(?i)\b(and|or)\b\s+\d+\s*=\s*\d+").unwrap(),
        Regex::new(r#"(?i)\b(and|or)\b\s+['"]\w+['"]\s*=\s*['"]\w+['"]"#).unwrap(),
    ];

    pub static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap();
    pub static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    pub static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();

    pub static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    pub static ref LOWERCASE: Regex = Regex::new(r"[a-z]").unwrap();
    pub static ref DIGIT: Regex = Regex::new(r"\d").unwrap();
    pub static ref SPECIAL_CHAR: Regex = Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap();
}

pub const COMMON_PASSWORDS: [&str; 10] = [
    "password", "123456", "qwerty", "admin", "letmein", "welcome", "monkey", "dragon", "master",
    "football",
];

/// First suspicious pattern matching `input`, if any
pub fn find_suspicious(input: &str) -> Option<&'static Regex> {
    SUSPICIOUS_PATTERNS.iter().find(|p| p.is_match(input))
}

pub fn find_sql_injection(input: &str) -> Option<&'static Regex> {
    SQL_INJECTION_PATTERNS.iter().find(|p| p.is_match(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspicious_patterns() {
        assert!(find_suspicious("<script>alert(1)</script>").is_some());
        assert!(find_suspicious("<SCRIPT>\nx\n</SCRIPT>").is_some());
        assert!(find_suspicious("<img onerror = x>").is_some());
        assert!(find_suspicious("JavaScript:void(0)").is_some());
        assert!(find_suspicious("document.cookie").is_some());
        assert!(find_suspicious("Apple Inc. quarterly report").is_none());
    }

    #[test]
    fn test_sql_patterns() {
        assert!(find_sql_injection("1 UNION SELECT password").is_some());
        assert!(find_sql_injection("name'; --").is_some());
        assert!(find_sql_injection("x or 1=1").is_some());
        assert!(find_sql_injection("x OR 'a'='a'").is_some());
        assert!(find_sql_injection("Tesla Motors").is_none());
    }
}
