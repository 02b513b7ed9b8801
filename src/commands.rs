//! CLI command handlers

use anyhow::Result;
use audit_trail::{AuditFilters, ExportFormat};
use clap::{Args, ValueEnum};
use chrono::{DateTime, Utc};
use legacy_bridge::{LegacyOperation, Priority};
use metrics_exporter_prometheus::PrometheusHandle;
use portfolio_monitor_core::aggregator::{
    GainLossFilter, HoldingFilter, HoldingSortKey, PortfolioFilters, SortOrder, TransactionFilters,
};
use portfolio_monitor_core::format::{format_currency, format_date, format_percentage, DateStyle};
use portfolio_monitor_core::validation::{is_valid_order_ref, parse_date, validate_form, Rule};
use portfolio_monitor_core::{AppError, OrderDraft, OrderStatus, TimeRange, TransactionType};
use std::collections::HashMap;
use rust_decimal::Decimal;
use security_guard::InputKind;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::{Dashboard, PortfolioMonitor};

fn parse_cli_date(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date(value).ok_or_else(|| format!("'{}' is not a date (YYYY-MM-DD or RFC 3339)", value))
}

fn parse_order_ref(value: &str) -> Result<String, String> {
    let reference = value.trim().to_uppercase();
    if is_valid_order_ref(&reference) {
        Ok(reference)
    } else {
        Err(format!("'{}' is not an order reference (ORD followed by 8 digits)", value))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortField {
    Name,
    Symbol,
    Quantity,
    Cost,
    AveragePrice,
    Price,
    Value,
    Change,
}

impl From<SortField> for HoldingSortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Name => HoldingSortKey::SecurityName,
            SortField::Symbol => HoldingSortKey::SecuritySymbol,
            SortField::Quantity => HoldingSortKey::TotalQuantity,
            SortField::Cost => HoldingSortKey::TotalValue,
            SortField::AveragePrice => HoldingSortKey::AveragePrice,
            SortField::Price => HoldingSortKey::CurrentPrice,
            SortField::Value => HoldingSortKey::CurrentValue,
            SortField::Change => HoldingSortKey::ChangePercent,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GainLossArg {
    Gain,
    Loss,
}

impl From<GainLossArg> for GainLossFilter {
    fn from(arg: GainLossArg) -> Self {
        match arg {
            GainLossArg::Gain => GainLossFilter::Gain,
            GainLossArg::Loss => GainLossFilter::Loss,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct DashboardArgs {
    /// Random price steps to apply to the quotes first
    #[arg(long, default_value_t = 0)]
    pub ticks: u32,
    /// Size of one price step as a fraction of price
    #[arg(long, default_value = "0.02")]
    pub volatility: Decimal,
}

#[derive(Debug, Clone, Args)]
pub struct PortfolioArgs {
    /// Keep holdings with an order carrying this exact reference
    #[arg(long, value_parser = parse_order_ref)]
    pub order_ref: Option<String>,
    /// Security name or symbol substring
    #[arg(long)]
    pub security: Option<String>,
    /// Buy or Sell
    #[arg(long = "type")]
    pub transaction_type: Option<TransactionType>,
    #[arg(long, value_parser = parse_cli_date)]
    pub from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_cli_date)]
    pub to: Option<DateTime<Utc>>,
    /// Lowest current value to keep
    #[arg(long)]
    pub min_value: Option<Decimal>,
    /// Highest current value to keep
    #[arg(long)]
    pub max_value: Option<Decimal>,
    /// Only positions in gain or in loss
    #[arg(long, value_enum)]
    pub gain_loss: Option<GainLossArg>,
    #[arg(long, value_enum)]
    pub sort: Option<SortField>,
    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,
}

impl PortfolioArgs {
    fn filters(&self) -> PortfolioFilters {
        PortfolioFilters {
            order_ref_no: self.order_ref.clone(),
            security_name: self.security.clone(),
            transaction_type: self.transaction_type,
            from_date: self.from,
            to_date: self.to,
        }
    }

    fn holding_filter(&self) -> HoldingFilter {
        HoldingFilter {
            security_name: None,
            min_value: self.min_value,
            max_value: self.max_value,
            gain_loss: self.gain_loss.map(Into::into).unwrap_or_default(),
        }
    }

    fn sort(&self) -> Option<(HoldingSortKey, SortOrder)> {
        let order = if self.asc { SortOrder::Asc } else { SortOrder::Desc };
        self.sort.map(|field| (field.into(), order))
    }
}

#[derive(Debug, Clone, Args)]
pub struct TransactionArgs {
    /// Order reference substring
    #[arg(long)]
    pub order_ref: Option<String>,
    #[arg(long)]
    pub security: Option<String>,
    #[arg(long = "type")]
    pub transaction_type: Option<TransactionType>,
    #[arg(long)]
    pub status: Option<OrderStatus>,
    #[arg(long, value_parser = parse_cli_date)]
    pub from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_cli_date)]
    pub to: Option<DateTime<Utc>>,
    /// Print as csv, json or tsv instead of a table
    #[arg(long)]
    pub export: Option<ExportFormat>,
}

impl TransactionArgs {
    fn filters(&self) -> TransactionFilters {
        TransactionFilters {
            order_ref_no: self.order_ref.clone(),
            security_name: self.security.clone(),
            transaction_type: self.transaction_type,
            order_status: self.status,
            from_date: self.from,
            to_date: self.to,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct OrderArgs {
    #[arg(long)]
    pub security_id: Option<u64>,
    #[arg(long = "type")]
    pub transaction_type: Option<TransactionType>,
    /// Units, taken as typed and run through the number sanitizer
    #[arg(long)]
    pub quantity: Option<String>,
    #[arg(long)]
    pub value: Option<String>,
    #[arg(long, value_parser = parse_cli_date)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Args)]
pub struct MonitorArgs {
    /// 1h, 24h, 7d or 30d
    #[arg(long, default_value = "24h")]
    pub range: TimeRange,
    /// Also print the Prometheus metrics
    #[arg(long)]
    pub metrics: bool,
    /// Run threat analysis, blocking IPs over the violation threshold
    #[arg(long)]
    pub sweep: bool,
}

#[derive(Debug, Clone, Args)]
pub struct LegacyArgs {
    /// portfolio_sync, trade_execution, risk_assessment, compliance_check or data_migration
    pub operation: LegacyOperation,
    #[arg(long, default_value = "normal")]
    pub priority: Priority,
    /// JSON payload
    #[arg(long, default_value = "{}")]
    pub payload: String,
}

#[derive(Debug, Clone, Args)]
pub struct AuditArgs {
    #[arg(long)]
    pub action: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, default_value = "json")]
    pub format: ExportFormat,
}

fn print_dashboard(dashboard: &Dashboard) {
    let metrics = &dashboard.metrics;
    println!("Welcome back, {} ({})", dashboard.user.full_name(), dashboard.user.role);
    println!("  Portfolio value: {}", format_currency(metrics.total_value));
    println!("  Total cost:      {}", format_currency(metrics.total_cost));
    println!(
        "  Gain/loss:       {} ({})",
        format_currency(metrics.total_gain_loss),
        format_percentage(metrics.total_gain_loss_percent, 2)
    );
    println!("  Cash balance:    {}", format_currency(dashboard.current_balance));
    println!(
        "  Trades:          {} ({} buy / {} sell)",
        dashboard.analytics.total_trades, dashboard.analytics.buy_trades, dashboard.analytics.sell_trades
    );
    for slice in &dashboard.allocation {
        println!("    {:<6} {:>12} {:>8}%", slice.name, format_currency(slice.value), slice.percentage.round_dp(1));
    }
}

pub async fn dashboard(app: &PortfolioMonitor, args: &DashboardArgs) -> Result<()> {
    for _ in 0..args.ticks {
        app.tick_prices(args.volatility).await?;
    }
    let dashboard = app.dashboard().await?;
    print_dashboard(&dashboard);
    Ok(())
}

pub async fn portfolio(app: &PortfolioMonitor, args: &PortfolioArgs) -> Result<()> {
    let holdings = app
        .portfolio(&args.filters(), &args.holding_filter(), args.sort())
        .await?;
    println!("{:<6} {:<28} {:>8} {:>12} {:>12}", "Symbol", "Name", "Qty", "Cost", "Value");
    for h in &holdings {
        println!(
            "{:<6} {:<28} {:>8} {:>12} {:>12}",
            h.security_symbol,
            h.security_name,
            h.total_quantity,
            format_currency(h.total_value),
            format_currency(h.current_value)
        );
    }
    Ok(())
}

pub async fn transactions(app: &PortfolioMonitor, args: &TransactionArgs) -> Result<()> {
    let filters = args.filters();
    if let Some(format) = args.export {
        println!("{}", app.export_transactions(&filters, format).await?);
        return Ok(());
    }

    for t in app.transactions(&filters).await? {
        println!(
            "{} {} {:<4} {:<6} {:>6} {:>12} {}",
            t.order.order_ref_no,
            format_date(t.order.order_date, DateStyle::Short),
            t.order.transaction_type,
            t.security_symbol.as_deref().unwrap_or("?"),
            t.order.quantity,
            format_currency(t.order.order_value),
            t.order.order_status
        );
    }
    Ok(())
}

/// Sanitizes the typed amounts, then checks them as form fields
fn order_amounts(app: &PortfolioMonitor, args: &OrderArgs) -> Result<(Option<Decimal>, Option<Decimal>)> {
    let mut data = HashMap::new();
    // empty input is left to the order validator
    for (field, raw) in [("quantity", args.quantity.as_deref()), ("orderValue", args.value.as_deref())] {
        if let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) {
            data.insert(field.to_string(), app.security().sanitize_input(text, InputKind::Number)?);
        }
    }

    let schema: Vec<(&str, Vec<Rule>)> = data
        .keys()
        .map(|field| (field.as_str(), vec![Rule::Number { min: None, max: None }]))
        .collect();
    let form = validate_form(&data, &schema);
    if let Some((field, message)) = form.errors.into_iter().next() {
        return Err(AppError::field(message, field).into());
    }

    let amount = |field: &str| data.get(field).and_then(|value| value.parse().ok());
    Ok((amount("quantity"), amount("orderValue")))
}

pub async fn order(app: &PortfolioMonitor, args: &OrderArgs) -> Result<()> {
    let user = app.auth().require_user()?;
    let (quantity, order_value) = order_amounts(app, args)?;
    let draft = OrderDraft {
        security_id: args.security_id,
        transaction_type: args.transaction_type,
        quantity,
        order_value,
        order_date: args.date,
        created_by: user.id,
    };
    let order = app.create_order(draft).await?;
    println!("Order {} submitted ({})", order.order_ref_no, order.order_status);
    Ok(())
}

pub async fn monitor(app: &PortfolioMonitor, args: &MonitorArgs, metrics: &PrometheusHandle) -> Result<()> {
    let snapshot = app.monitor(args.range).await;
    print_json(&snapshot)?;
    if args.sweep {
        print_json(&app.sweep_threats())?;
    }
    if args.metrics {
        println!("{}", metrics.render());
    }
    Ok(())
}

pub async fn legacy(app: &PortfolioMonitor, args: &LegacyArgs) -> Result<()> {
    let payload: Value = serde_json::from_str(&args.payload)?;
    let handle = app.enqueue_legacy(args.operation, payload, args.priority)?;
    info!(id = %handle.id, "Waiting for legacy job");
    let item = handle.wait().await?;
    print_json(&item)
}

pub async fn audit(app: &PortfolioMonitor, args: &AuditArgs) -> Result<()> {
    let filters = AuditFilters {
        user_id: args.user.clone(),
        action: args.action.clone(),
        limit: args.limit,
        ..Default::default()
    };
    println!("{}", app.export_audit(args.format, &filters).await?);
    Ok(())
}

/// Walks through every service once
pub async fn demo(app: &PortfolioMonitor, metrics: &PrometheusHandle) -> Result<()> {
    println!("== Dashboard");
    dashboard(
        app,
        &DashboardArgs {
            ticks: 0,
            volatility: Decimal::new(2, 2),
        },
    )
    .await?;

    println!("\n== Transactions (csv)");
    let csv = app
        .export_transactions(&TransactionFilters::default(), ExportFormat::Csv)
        .await?;
    println!("{}", csv);

    println!("\n== Order entry");
    let user = app.auth().require_user()?;
    let rejected = app
        .create_order(OrderDraft {
            security_id: Some(1),
            transaction_type: Some(TransactionType::Buy),
            quantity: Some(Decimal::ZERO),
            order_value: Some(Decimal::from(100)),
            order_date: None,
            created_by: user.id,
        })
        .await;
    match rejected {
        Ok(order) => warn!("Zero-quantity order was accepted: {}", order.order_ref_no),
        Err(err) => println!("Rejected: {}", err.message()),
    }

    let order = app
        .create_order(OrderDraft {
            security_id: Some(2),
            transaction_type: Some(TransactionType::Buy),
            quantity: Some(Decimal::from(2)),
            order_value: Some(Decimal::new(65050, 2)),
            order_date: None,
            created_by: user.id,
        })
        .await?;
    println!("Submitted {}", order.order_ref_no);
    let executed = app.update_order_status(order.id, OrderStatus::Executed).await?;
    println!("{} is now {}", executed.order_ref_no, executed.order_status);

    println!("\n== Input sanitizer");
    match app
        .security()
        .sanitize_input("<script>alert(1)</script>", InputKind::Html)
    {
        Ok(cleaned) => println!("Accepted: {}", cleaned),
        Err(err) => println!("Blocked: {}", err.message()),
    }

    println!("\n== Legacy queue");
    let jobs = [
        (LegacyOperation::PortfolioSync, Priority::Low),
        (LegacyOperation::TradeExecution, Priority::High),
        (LegacyOperation::RiskAssessment, Priority::Normal),
    ]
    .into_iter()
    .map(|(operation, priority)| (operation, json!({ "userId": user.id }), priority))
    .collect();
    for handle in app.enqueue_legacy_batch(jobs)? {
        handle.wait().await?;
    }
    for item in app.queue().history() {
        println!("{} [{}] {:?}", item.operation, item.priority, item.status);
    }

    println!("\n== System monitor");
    monitor(
        app,
        &MonitorArgs {
            range: TimeRange::LastHour,
            metrics: false,
            sweep: true,
        },
        metrics,
    )
    .await?;
    print_json(&app.optimize_memory())?;
    Ok(())
}
