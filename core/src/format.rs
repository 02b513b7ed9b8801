//! Display formatting for money, percentages and dates (en-US conventions)

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Formats the absolute value with `decimals` places and thousands separators
fn grouped_abs(value: Decimal, decimals: u32) -> String {
    let rounded = value
        .abs()
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", decimals as usize, rounded);
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group_thousands(int), frac),
        None => group_thousands(&text),
    }
}

fn is_negative(value: Decimal, decimals: u32) -> bool {
    value.is_sign_negative()
        && !value
            .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
            .is_zero()
}

/// `$1,234.56`, negatives as `-$1,234.56`
pub fn format_currency(amount: Decimal) -> String {
    let body = grouped_abs(amount, 2);
    if is_negative(amount, 2) {
        format!("-${}", body)
    } else {
        format!("${}", body)
    }
}

/// Signed percentage, e.g. `+12.34%` or `-3.10%`
pub fn format_percentage(value: Decimal, decimals: u32) -> String {
    let body = grouped_abs(value, decimals);
    if is_negative(value, decimals) {
        format!("-{}%", body)
    } else {
        format!("+{}%", body)
    }
}

/// Number with thousands separators and a fixed number of decimals
pub fn format_number(value: Decimal, decimals: u32) -> String {
    let body = grouped_abs(value, decimals);
    if is_negative(value, decimals) {
        format!("-{}", body)
    } else {
        body
    }
}

/// Date rendering styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateStyle {
    /// `Jan 15, 2024`
    #[default]
    Short,
    /// `Monday, January 15, 2024`
    Long,
    /// `Jan 15, 2024, 09:30 AM`
    Time,
    /// `2024-01-15`
    Iso,
}

pub fn format_date(date: DateTime<Utc>, style: DateStyle) -> String {
    match style {
        DateStyle::Short => date.format("%b %-d, %Y").to_string(),
        DateStyle::Long => date.format("%A, %B %-d, %Y").to_string(),
        DateStyle::Time => date.format("%b %-d, %Y, %I:%M %p").to_string(),
        DateStyle::Iso => date.format("%Y-%m-%d").to_string(),
    }
}
