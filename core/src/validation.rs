//! Field validators and order form validation
//!
//! Validators return `AppError::Validation` at the point of detection. The
//! form helpers gather the first failure message per field instead of
//! stopping at the first failing field.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::types::OrderDraft;

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref LOWERCASE: Regex = Regex::new(r"[a-z]").unwrap();
    static ref DIGIT: Regex = Regex::new(r"\d").unwrap();
    static ref SPECIAL_CHAR: Regex = Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap();
    static ref ORDER_REF: Regex = Regex::new(r"^ORD\d{8}$").unwrap();
}

/// Minimum password length used when no explicit length is given
pub const DEFAULT_PASSWORD_LENGTH: usize = 8;

pub fn validate_email(value: &str) -> AppResult<()> {
    if EMAIL_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(AppError::validation(
            "Invalid email format",
            Some("email"),
            Some(value),
        ))
    }
}

/// Length plus upper, lower, digit and special character classes
pub fn validate_password_strength(value: &str, min_length: usize) -> AppResult<()> {
    if value.chars().count() < min_length {
        return Err(AppError::field(
            format!("Password must be at least {} characters long", min_length),
            "password",
        ));
    }

    let complete = UPPERCASE.is_match(value)
        && LOWERCASE.is_match(value)
        && DIGIT.is_match(value)
        && SPECIAL_CHAR.is_match(value);
    if !complete {
        return Err(AppError::field(
            "Password must contain uppercase, lowercase, number, and special character",
            "password",
        ));
    }
    Ok(())
}

/// Parses `value` as a number and checks the optional bounds
pub fn validate_number(
    value: &str,
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> AppResult<Decimal> {
    let number = Decimal::from_str(value.trim()).map_err(|_| {
        AppError::validation("Value must be a number", Some("number"), Some(value))
    })?;

    if let Some(min) = min.filter(|min| number < *min) {
        return Err(AppError::validation(
            format!("Value must be at least {}", min),
            Some("number"),
            Some(value),
        ));
    }
    if let Some(max) = max.filter(|max| number > *max) {
        return Err(AppError::validation(
            format!("Value must be at most {}", max),
            Some("number"),
            Some(value),
        ));
    }
    Ok(number)
}

pub fn validate_required(value: Option<&str>, field_name: &str) -> AppResult<()> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(AppError::field(
            format!("{} is required", field_name),
            field_name,
        )),
    }
}

pub fn validate_string_length(value: &str, min: usize, max: Option<usize>) -> AppResult<()> {
    let length = value.chars().count();
    if length < min {
        return Err(AppError::validation(
            format!("Value must be at least {} characters long", min),
            Some("string"),
            Some(value),
        ));
    }
    if let Some(max) = max.filter(|max| length > *max) {
        return Err(AppError::validation(
            format!("Value must be at most {} characters long", max),
            Some("string"),
            Some(value),
        ));
    }
    Ok(())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

pub fn validate_date(
    value: &str,
    min: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
) -> AppResult<DateTime<Utc>> {
    let date = parse_date(value)
        .ok_or_else(|| AppError::validation("Invalid date format", Some("date"), Some(value)))?;

    if let Some(min) = min.filter(|min| date < *min) {
        return Err(AppError::validation(
            format!("Date must be after {}", min.to_rfc3339()),
            Some("date"),
            Some(value),
        ));
    }
    if let Some(max) = max.filter(|max| date > *max) {
        return Err(AppError::validation(
            format!("Date must be before {}", max.to_rfc3339()),
            Some("date"),
            Some(value),
        ));
    }
    Ok(date)
}

pub fn validate_url(value: &str) -> AppResult<url::Url> {
    url::Url::parse(value)
        .map_err(|_| AppError::validation("Invalid URL format", Some("url"), Some(value)))
}

/// A single rule in a form schema
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Email,
    Password { min_length: usize },
    Number { min: Option<Decimal>, max: Option<Decimal> },
    Length { min: usize, max: Option<usize> },
    Date { min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>> },
    Url,
}

impl Rule {
    fn check(&self, value: Option<&str>, field: &str) -> AppResult<()> {
        if let Rule::Required = self {
            return validate_required(value, field);
        }
        let value = value.unwrap_or_default();
        match self {
            Rule::Required => Ok(()),
            Rule::Email => validate_email(value),
            Rule::Password { min_length } => validate_password_strength(value, *min_length),
            Rule::Number { min, max } => validate_number(value, *min, *max).map(|_| ()),
            Rule::Length { min, max } => validate_string_length(value, *min, *max),
            Rule::Date { min, max } => validate_date(value, *min, *max).map(|_| ()),
            Rule::Url => validate_url(value).map(|_| ()),
        }
    }
}

/// Outcome of a multi-field validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormValidation {
    pub is_valid: bool,
    /// First failure message per field
    pub errors: BTreeMap<String, String>,
}

impl FormValidation {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Runs each field's rules in order, recording the first failure per field
pub fn validate_form(
    data: &HashMap<String, String>,
    schema: &[(&str, Vec<Rule>)],
) -> FormValidation {
    let mut errors = BTreeMap::new();

    for (field, rules) in schema {
        let value = data.get(*field).map(String::as_str);
        if let Some(err) = rules.iter().find_map(|rule| rule.check(value, field).err()) {
            errors.insert(field.to_string(), err.message().to_string());
        }
    }

    FormValidation::from_errors(errors)
}

/// Checks an order form: security, positive quantity and value, and a side
pub fn validate_order_data(draft: &OrderDraft) -> FormValidation {
    let mut errors = BTreeMap::new();

    if draft.security_id.map_or(true, |id| id == 0) {
        errors.insert("security".to_string(), "Please select a security".to_string());
    }
    if draft.quantity.map_or(true, |q| q <= Decimal::ZERO) {
        errors.insert(
            "quantity".to_string(),
            "Quantity must be greater than 0".to_string(),
        );
    }
    if draft.order_value.map_or(true, |v| v <= Decimal::ZERO) {
        errors.insert(
            "orderValue".to_string(),
            "Order value must be greater than 0".to_string(),
        );
    }
    if draft.transaction_type.is_none() {
        errors.insert(
            "transactionType".to_string(),
            "Please select transaction type".to_string(),
        );
    }

    FormValidation::from_errors(errors)
}

/// `ORD` followed by the last 8 digits of the millisecond timestamp
pub fn generate_order_ref(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(100_000_000);
    format!("ORD{:08}", millis)
}

pub fn is_valid_order_ref(value: &str) -> bool {
    ORDER_REF.is_match(value)
}
