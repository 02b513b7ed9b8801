//! Portfolio and transaction aggregation
//!
//! Pure functions that reduce the order records fetched from the store into
//! holdings, gain/loss figures and transaction analytics. Nothing here
//! performs I/O; callers fetch the arrays and pass them in.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::stats::tally;
use crate::types::{
    AccountDetail, OrderDetail, OrderStatus, PortfolioHolding, SecurityDetail, SecurityId,
    TransactionRecord, TransactionType, UserId, DEFAULT_RUNNING_BALANCE,
};

/// Filters accepted by the portfolio summary view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioFilters {
    /// Keep holdings that have an order with this exact reference
    pub order_ref_no: Option<String>,
    /// Case-insensitive substring of the security name or symbol
    pub security_name: Option<String>,
    pub transaction_type: Option<TransactionType>,
    /// Both bounds must be set for the date filter to apply
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

/// Filters accepted by the transaction history view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilters {
    /// Substring of the order reference
    pub order_ref_no: Option<String>,
    pub security_name: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub order_status: Option<OrderStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

fn within(date: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    match (from, to) {
        (Some(from), Some(to)) => date >= from && date <= to,
        _ => true,
    }
}

fn matches_text(security: &SecurityDetail, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    security.security_name.to_lowercase().contains(&needle)
        || security.security_symbol.to_lowercase().contains(&needle)
}

/// Folds a user's completed orders into per-security holdings.
///
/// Buys add quantity and cost, sells subtract both. The average price and
/// current value are only recomputed while the running quantity is positive,
/// so a position sold down to zero keeps its last average. Orders referencing
/// unknown securities are skipped. Holdings come back ordered by security id.
pub fn build_holdings(
    orders: &[OrderDetail],
    securities: &[SecurityDetail],
    user_id: UserId,
) -> Vec<PortfolioHolding> {
    let by_id: HashMap<SecurityId, &SecurityDetail> =
        securities.iter().map(|s| (s.id, s)).collect();
    let mut portfolio: BTreeMap<SecurityId, PortfolioHolding> = BTreeMap::new();

    for order in orders
        .iter()
        .filter(|o| o.created_by == user_id && o.is_completed())
    {
        let Some(security) = by_id.get(&order.security_id) else {
            continue;
        };

        let holding = portfolio
            .entry(security.id)
            .or_insert_with(|| PortfolioHolding::empty(security));

        match order.transaction_type {
            TransactionType::Buy => {
                holding.total_quantity += order.quantity;
                holding.total_value += order.order_value;
            }
            TransactionType::Sell => {
                holding.total_quantity -= order.quantity;
                holding.total_value -= order.order_value;
            }
        }

        if holding.total_quantity > Decimal::ZERO {
            holding.average_price = holding.total_value / holding.total_quantity;
            holding.current_value = holding.total_quantity * security.current_price;
        }
    }

    portfolio.into_values().collect()
}

/// Builds holdings for `user_id` and applies the summary filters.
///
/// `orders` is the full order list; the reference filter only applies when
/// some order carries that reference at all.
pub fn portfolio_summary(
    orders: &[OrderDetail],
    securities: &[SecurityDetail],
    user_id: UserId,
    filters: &PortfolioFilters,
) -> Vec<PortfolioHolding> {
    let user_orders: Vec<&OrderDetail> = orders.iter().filter(|o| o.created_by == user_id).collect();
    let has_order = |holding: &PortfolioHolding, pred: &dyn Fn(&OrderDetail) -> bool| {
        user_orders
            .iter()
            .any(|o| o.security_id == holding.security_id && pred(o))
    };

    let mut holdings = build_holdings(orders, securities, user_id);

    if let Some(ref_no) = filters.order_ref_no.as_deref().filter(|r| !r.is_empty()) {
        if orders.iter().any(|o| o.order_ref_no == ref_no) {
            holdings.retain(|h| has_order(h, &|o| o.order_ref_no == ref_no));
        }
    }

    if let Some(name) = filters.security_name.as_deref().filter(|n| !n.is_empty()) {
        let needle = name.to_lowercase();
        holdings.retain(|h| {
            h.security_name.to_lowercase().contains(&needle)
                || h.security_symbol.to_lowercase().contains(&needle)
        });
    }

    if let Some(kind) = filters.transaction_type {
        holdings.retain(|h| has_order(h, &|o| o.transaction_type == kind));
    }

    if let (Some(from), Some(to)) = (filters.from_date, filters.to_date) {
        holdings.retain(|h| has_order(h, &|o| o.order_date >= from && o.order_date <= to));
    }

    holdings
}

/// Executed and Completed orders matching `filters`, joined with their security
pub fn transaction_history(
    orders: &[OrderDetail],
    securities: &[SecurityDetail],
    filters: &TransactionFilters,
) -> Vec<TransactionRecord> {
    let by_id: HashMap<SecurityId, &SecurityDetail> =
        securities.iter().map(|s| (s.id, s)).collect();
    let name_filter = filters.security_name.as_deref().filter(|n| !n.is_empty());
    let ref_filter = filters.order_ref_no.as_deref().filter(|r| !r.is_empty());

    orders
        .iter()
        .filter(|o| o.is_settled())
        .filter(|o| ref_filter.map_or(true, |r| o.order_ref_no.contains(r)))
        .filter(|o| {
            name_filter.map_or(true, |n| {
                by_id
                    .get(&o.security_id)
                    .is_some_and(|s| matches_text(s, n))
            })
        })
        .filter(|o| filters.transaction_type.map_or(true, |t| o.transaction_type == t))
        .filter(|o| filters.order_status.map_or(true, |s| o.order_status == s))
        .filter(|o| within(o.order_date, filters.from_date, filters.to_date))
        .map(|o| {
            let security = by_id.get(&o.security_id);
            TransactionRecord {
                order: o.clone(),
                security_name: security.map(|s| s.security_name.clone()),
                security_symbol: security.map(|s| s.security_symbol.clone()),
                current_price: security.map(|s| s.current_price),
            }
        })
        .collect()
}

/// Percent change from `from` to `to`; zero when `from` is zero
pub fn calculate_percentage_change(from: Decimal, to: Decimal) -> Decimal {
    if from.is_zero() {
        return Decimal::ZERO;
    }
    (to - from) / from * Decimal::ONE_HUNDRED
}

/// Absolute change from `from` to `to`
pub fn calculate_absolute_change(from: Decimal, to: Decimal) -> Decimal {
    to - from
}

/// Portfolio-wide totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_gain_loss: Decimal,
    pub total_gain_loss_percent: Decimal,
    pub item_count: usize,
}

pub fn calculate_portfolio_metrics(holdings: &[PortfolioHolding]) -> PortfolioMetrics {
    let total_value: Decimal = holdings.iter().map(|h| h.current_value).sum();
    let total_cost: Decimal = holdings.iter().map(|h| h.total_value).sum();
    let total_gain_loss = calculate_absolute_change(total_cost, total_value);
    let total_gain_loss_percent = if total_cost > Decimal::ZERO {
        total_gain_loss / total_cost * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    PortfolioMetrics {
        total_value,
        total_cost,
        total_gain_loss,
        total_gain_loss_percent,
        item_count: holdings.len(),
    }
}

/// Holding field used for sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HoldingSortKey {
    SecurityName,
    SecuritySymbol,
    TotalQuantity,
    TotalValue,
    AveragePrice,
    CurrentPrice,
    #[default]
    CurrentValue,
    ChangePercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

fn compare_by(a: &PortfolioHolding, b: &PortfolioHolding, key: HoldingSortKey) -> Ordering {
    match key {
        HoldingSortKey::SecurityName => a
            .security_name
            .to_lowercase()
            .cmp(&b.security_name.to_lowercase()),
        HoldingSortKey::SecuritySymbol => a
            .security_symbol
            .to_lowercase()
            .cmp(&b.security_symbol.to_lowercase()),
        HoldingSortKey::TotalQuantity => a.total_quantity.cmp(&b.total_quantity),
        HoldingSortKey::TotalValue => a.total_value.cmp(&b.total_value),
        HoldingSortKey::AveragePrice => a.average_price.cmp(&b.average_price),
        HoldingSortKey::CurrentPrice => a.current_price.cmp(&b.current_price),
        HoldingSortKey::CurrentValue => a.current_value.cmp(&b.current_value),
        HoldingSortKey::ChangePercent => a.change_percent.cmp(&b.change_percent),
    }
}

/// Returns a sorted copy; the input is left untouched
pub fn sort_holdings(
    holdings: &[PortfolioHolding],
    key: HoldingSortKey,
    order: SortOrder,
) -> Vec<PortfolioHolding> {
    let mut sorted = holdings.to_vec();
    sorted.sort_by(|a, b| match order {
        SortOrder::Asc => compare_by(a, b, key),
        SortOrder::Desc => compare_by(b, a, key),
    });
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainLossFilter {
    #[default]
    All,
    Gain,
    Loss,
}

/// Holding list filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingFilter {
    pub security_name: Option<String>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    #[serde(default)]
    pub gain_loss: GainLossFilter,
}

pub fn filter_holdings(holdings: &[PortfolioHolding], filter: &HoldingFilter) -> Vec<PortfolioHolding> {
    let needle = filter.security_name.as_ref().map(|n| n.to_lowercase());

    holdings
        .iter()
        .filter(|h| {
            needle
                .as_ref()
                .map_or(true, |n| h.security_name.to_lowercase().contains(n))
        })
        .filter(|h| filter.min_value.map_or(true, |min| h.current_value >= min))
        .filter(|h| filter.max_value.map_or(true, |max| h.current_value <= max))
        .filter(|h| match filter.gain_loss {
            GainLossFilter::All => true,
            GainLossFilter::Gain => h.gain_loss() > Decimal::ZERO,
            GainLossFilter::Loss => h.gain_loss() < Decimal::ZERO,
        })
        .cloned()
        .collect()
}

/// One slice of the allocation chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    /// Security symbol
    pub name: String,
    pub value: Decimal,
    /// Share of total current value, in percent
    pub percentage: Decimal,
}

pub fn allocation_chart_data(holdings: &[PortfolioHolding]) -> Vec<AllocationSlice> {
    let total: Decimal = holdings.iter().map(|h| h.current_value).sum();

    holdings
        .iter()
        .map(|h| AllocationSlice {
            name: h.security_symbol.clone(),
            value: h.current_value,
            percentage: if total > Decimal::ZERO {
                h.current_value / total * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            },
        })
        .collect()
}

/// Trade counts and volumes over a set of orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAnalytics {
    pub total_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_volume: Decimal,
    pub average_trade_size: Decimal,
    /// Buys as a percentage of all trades
    pub buy_share_percent: Decimal,
}

pub fn transaction_analytics(orders: &[OrderDetail]) -> TransactionAnalytics {
    let total_trades = orders.len();
    let buy_trades = orders
        .iter()
        .filter(|o| o.transaction_type == TransactionType::Buy)
        .count();
    let total_volume: Decimal = orders.iter().map(|o| o.order_value).sum();

    let mut analytics = TransactionAnalytics {
        total_trades,
        buy_trades,
        sell_trades: total_trades - buy_trades,
        by_status: tally(orders, |o| o.order_status.as_str()),
        total_volume,
        ..Default::default()
    };

    if total_trades > 0 {
        let count = Decimal::from(total_trades);
        analytics.average_trade_size = total_volume / count;
        analytics.buy_share_percent = Decimal::from(buy_trades) / count * Decimal::ONE_HUNDRED;
    }

    analytics
}

/// Running balance of the user's last ledger row
pub fn current_balance(accounts: &[AccountDetail], user_id: UserId) -> Decimal {
    accounts
        .iter()
        .filter(|a| a.id_user_login_detail == user_id)
        .last()
        .map(|a| a.running_balance)
        .unwrap_or(DEFAULT_RUNNING_BALANCE)
}

/// Random walk step for demo quotes, rounded to cents
pub fn simulate_price_movement<R: Rng>(rng: &mut R, price: Decimal, volatility: Decimal) -> Decimal {
    let jitter = Decimal::from_f64(rng.gen::<f64>() - 0.5).unwrap_or_default();
    (price + jitter * volatility * price).round_dp(2)
}
