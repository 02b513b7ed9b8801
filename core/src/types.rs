//! Core portfolio types shared by every Portfolio Monitor crate.
//!
//! Field names follow the record store's JSON layout (camelCase, with the
//! `idSecurityDetail` style foreign keys), so the same structs are used for
//! wire decoding and for the in-memory fixtures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Identifier types used by the record store
pub type UserId = u64;
pub type SecurityId = u64;
pub type OrderId = u64;
pub type AccountEntryId = u64;

/// Balance assumed for users without any ledger rows
pub const DEFAULT_RUNNING_BALANCE: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// Default currency attached to transaction audit entries
pub const DEFAULT_CURRENCY: &str = "USD";

/// Tradable security (fund or equity) with its latest quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDetail {
    /// Unique security identifier
    pub id: SecurityId,

    /// Display name (e.g., "Apple Inc.")
    pub security_name: String,

    /// Ticker symbol (e.g., "AAPL")
    pub security_symbol: String,

    /// Reference value
    pub value: Decimal,

    /// Latest known price
    pub current_price: Decimal,

    /// Daily change in percent
    pub change_percent: Decimal,

    /// Daily change in currency units
    pub change_value: Decimal,
}

/// Order record as stored by the remote JSON server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    /// Store-assigned identifier (0 before the store has assigned one)
    #[serde(default)]
    pub id: OrderId,

    /// Security the order trades
    #[serde(rename = "idSecurityDetail")]
    pub security_id: SecurityId,

    /// Human-facing reference, `ORD` followed by 8 digits
    pub order_ref_no: String,

    /// Current lifecycle status
    pub order_status: OrderStatus,

    /// Buy or Sell
    pub transaction_type: TransactionType,

    /// Total value of the order
    pub order_value: Decimal,

    /// Number of units
    pub quantity: Decimal,

    /// When the order was placed
    pub order_date: DateTime<Utc>,

    /// When the record was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,

    /// Owning user
    pub created_by: UserId,
}

impl OrderDetail {
    /// Returns true for orders that count towards holdings
    pub fn is_completed(&self) -> bool {
        self.order_status == OrderStatus::Completed
    }

    /// Returns true for orders shown in transaction history
    pub fn is_settled(&self) -> bool {
        matches!(
            self.order_status,
            OrderStatus::Executed | OrderStatus::Completed
        )
    }
}

/// Order lifecycle: Submitted → Executed → Completed, or Cancelled/Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order accepted by the client, not yet executed
    Submitted,

    /// Order executed, settlement pending
    Executed,

    /// Order settled
    Completed,

    /// Order cancelled (terminal)
    Cancelled,

    /// Order failed (terminal)
    Failed,
}

impl OrderStatus {
    /// All statuses in lifecycle order
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Submitted,
        OrderStatus::Executed,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    /// Returns the store's string tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Executed => "Executed",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
        }
    }

    /// Returns true when no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Checks whether the lifecycle allows moving to `next`
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Submitted, OrderStatus::Executed)
            | (OrderStatus::Submitted, OrderStatus::Cancelled)
            | (OrderStatus::Submitted, OrderStatus::Failed)
            | (OrderStatus::Executed, OrderStatus::Completed)
            | (OrderStatus::Executed, OrderStatus::Cancelled)
            | (OrderStatus::Executed, OrderStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AppError::validation(
                    format!("Unknown order status '{}'", s),
                    Some("orderStatus"),
                    Some(s),
                )
            })
    }
}

/// Buy or sell side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    /// Returns the store's string tag
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "Buy",
            TransactionType::Sell => "Sell",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            _ => Err(AppError::validation(
                format!("Unknown transaction type '{}'", s),
                Some("transactionType"),
                Some(s),
            )),
        }
    }
}

/// Registered user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
}

impl UserDetail {
    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One row of a user's cash ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    pub id: AccountEntryId,
    pub id_user_login_detail: UserId,
    pub credit: Decimal,
    pub debit: Decimal,
    pub running_balance: Decimal,
    #[serde(default)]
    pub id_order_detail: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    pub created_by: UserId,
}

/// Net position in one security, derived from completed orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHolding {
    pub security_id: SecurityId,
    pub security_name: String,
    pub security_symbol: String,
    /// Net quantity; negative when sells exceed tracked buys
    pub total_quantity: Decimal,
    /// Cost basis
    pub total_value: Decimal,
    pub average_price: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub change_percent: Decimal,
    pub change_value: Decimal,
}

impl PortfolioHolding {
    /// Starts an empty holding for the given security
    pub fn empty(security: &SecurityDetail) -> Self {
        Self {
            security_id: security.id,
            security_name: security.security_name.clone(),
            security_symbol: security.security_symbol.clone(),
            total_quantity: Decimal::ZERO,
            total_value: Decimal::ZERO,
            average_price: Decimal::ZERO,
            current_price: security.current_price,
            current_value: Decimal::ZERO,
            change_percent: security.change_percent,
            change_value: security.change_value,
        }
    }

    /// Unrealized gain (positive) or loss (negative)
    pub fn gain_loss(&self) -> Decimal {
        self.current_value - self.total_value
    }
}

/// Transaction history row: an order joined with its security
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub order: OrderDetail,
    pub security_name: Option<String>,
    pub security_symbol: Option<String>,
    pub current_price: Option<Decimal>,
}

/// Order entry form contents before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(rename = "idSecurityDetail")]
    pub security_id: Option<SecurityId>,
    pub transaction_type: Option<TransactionType>,
    pub quantity: Option<Decimal>,
    pub order_value: Option<Decimal>,
    pub order_date: Option<DateTime<Utc>>,
    pub created_by: UserId,
}

/// Coarse triage label attached to errors and audit events
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_detail_json_layout() {
        let json = r#"{
            "id": 1,
            "idSecurityDetail": 3,
            "orderRefNo": "ORD20240101",
            "orderStatus": "Completed",
            "transactionType": "Buy",
            "orderValue": 1755.00,
            "quantity": 10,
            "orderDate": "2024-01-15T09:30:00Z",
            "createdOn": "2024-01-15T09:30:00Z",
            "createdBy": 1
        }"#;

        let order: OrderDetail = serde_json::from_str(json).unwrap();
        assert_eq!(order.security_id, 3);
        assert_eq!(order.order_value, dec!(1755));
        assert!(order.is_completed());
        assert!(order.is_settled());

        let encoded = serde_json::to_value(&order).unwrap();
        assert_eq!(encoded["idSecurityDetail"], 3);
        assert_eq!(encoded["orderStatus"], "Completed");
    }

    #[test]
    fn test_order_status_lifecycle() {
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Executed));
        assert!(OrderStatus::Executed.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Submitted));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Executed));
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Executed.is_terminal());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("completed".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!("SELL".parse::<TransactionType>().unwrap(), TransactionType::Sell);
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }
}
