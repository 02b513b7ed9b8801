//! # Input Sanitizer
//!
//! Kind-specific cleaning followed by a suspicious-pattern check. This is a
//! pattern pre-filter for user input, not a parser-grade XSS or SQL defense.
//!
//! The functions here are pure; [`crate::SecurityGuard::sanitize_input`] turns
//! a [`Rejection`] carrying an event tag into a logged security event.

use portfolio_monitor_core::validation::validate_email;
use portfolio_monitor_core::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::patterns::{find_sql_injection, find_suspicious, CONTROL_CHARS, HTML_TAG, WHITESPACE_RUN};

pub const SUSPICIOUS_INPUT: &str = "SUSPICIOUS_INPUT";
pub const SQL_INJECTION_ATTEMPT: &str = "SQL_INJECTION_ATTEMPT";

const ALLOWED_URL_SCHEMES: [&str; 4] = ["http", "https", "mailto", "tel"];
/// Characters of rejected input kept in event details
const PREVIEW_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Html,
    Url,
    Email,
    Number,
    Sql,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Html => "html",
            InputKind::Url => "url",
            InputKind::Email => "email",
            InputKind::Number => "number",
            InputKind::Sql => "sql",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKind {
    type Err = AppError;

    /// Unknown kinds fall back to text
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "html" => InputKind::Html,
            "url" => InputKind::Url,
            "email" => InputKind::Email,
            "number" => InputKind::Number,
            "sql" => InputKind::Sql,
            _ => InputKind::Text,
        })
    }
}

/// Why an input was refused
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub error: AppError,
    /// Security event to record, if the refusal is security relevant
    pub event: Option<&'static str>,
    pub pattern: Option<String>,
    pub preview: String,
}

impl Rejection {
    fn invalid(message: &str, kind: InputKind, input: &str) -> Self {
        Self {
            error: AppError::validation(message, Some(kind.as_str()), Some(input)),
            event: None,
            pattern: None,
            preview: preview(input),
        }
    }

    fn flagged(message: &str, kind: InputKind, input: &str, event: &'static str, pattern: &str) -> Self {
        Self {
            error: AppError::validation(message, Some(kind.as_str()), Some(input)),
            event: Some(event),
            pattern: Some(pattern.to_string()),
            preview: preview(input),
        }
    }
}

fn preview(input: &str) -> String {
    input.chars().take(PREVIEW_LEN).collect()
}

fn check_suspicious(cleaned: &str, kind: InputKind, message: &str) -> Result<(), Rejection> {
    match find_suspicious(cleaned) {
        Some(pattern) => Err(Rejection::flagged(
            message,
            kind,
            cleaned,
            SUSPICIOUS_INPUT,
            pattern.as_str(),
        )),
        None => Ok(()),
    }
}

/// Cleans `input` according to `kind`
pub fn sanitize(input: &str, kind: InputKind) -> Result<String, Rejection> {
    match kind {
        InputKind::Text => sanitize_text(input),
        InputKind::Html => sanitize_html(input),
        InputKind::Url => sanitize_url(input),
        InputKind::Email => sanitize_email(input),
        InputKind::Number => sanitize_number(input).map(|n| n.normalize().to_string()),
        InputKind::Sql => sanitize_sql(input),
    }
}

pub fn sanitize_text(input: &str) -> Result<String, Rejection> {
    let stripped = CONTROL_CHARS.replace_all(input, "");
    let cleaned = WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string();
    check_suspicious(&cleaned, InputKind::Text, "Input contains suspicious content")?;
    Ok(cleaned)
}

pub fn sanitize_html(input: &str) -> Result<String, Rejection> {
    let cleaned = HTML_TAG
        .replace_all(input, "")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/");
    check_suspicious(&cleaned, InputKind::Html, "HTML contains suspicious content")?;
    Ok(cleaned)
}

pub fn sanitize_url(input: &str) -> Result<String, Rejection> {
    let parsed = url::Url::parse(input.trim())
        .map_err(|_| Rejection::invalid("Invalid URL format", InputKind::Url, input))?;
    if !ALLOWED_URL_SCHEMES.contains(&parsed.scheme()) {
        return Err(Rejection::invalid("Invalid URL protocol", InputKind::Url, input));
    }
    check_suspicious(input, InputKind::Url, "URL contains suspicious content")?;
    Ok(parsed.to_string())
}

pub fn sanitize_email(input: &str) -> Result<String, Rejection> {
    let trimmed = input.trim();
    validate_email(trimmed).map_err(|error| Rejection {
        error,
        event: None,
        pattern: None,
        preview: preview(input),
    })?;
    check_suspicious(trimmed, InputKind::Email, "Email contains suspicious content")?;
    Ok(trimmed.to_lowercase())
}

pub fn sanitize_number(input: &str) -> Result<Decimal, Rejection> {
    let trimmed = input.trim();
    check_suspicious(trimmed, InputKind::Number, "Number contains suspicious content")?;
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| Rejection::invalid("Invalid number format", InputKind::Number, input))
}

pub fn sanitize_sql(input: &str) -> Result<String, Rejection> {
    match find_sql_injection(input) {
        Some(pattern) => Err(Rejection::flagged(
            "SQL injection attempt detected",
            InputKind::Sql,
            input,
            SQL_INJECTION_ATTEMPT,
            pattern.as_str(),
        )),
        None => Ok(input.to_string()),
    }
}
