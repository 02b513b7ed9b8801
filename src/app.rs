//! # Application Context
//!
//! `PortfolioMonitor` builds every service from an [`AppConfig`] and hands
//! out shared references; nothing lives in globals. Views fetch records
//! through the TTL cache, reduce them with the core aggregator and log the
//! access to the audit trail. Mutating actions pass the sanitizer and the
//! rate limiter first.

use anyhow::{anyhow, Context, Result};
use audit_trail::{
    AuditFilters, AuditLog, AuditStats, ErrorHandler, ErrorStats, ExportFormat, IdentityProvider,
    LogReporter, StoreSink,
};
use chrono::Utc;
use legacy_bridge::{
    JobHandle, LegacyBridge, LegacyOperation, LegacyQueue, LegacyResult, MemoryReport,
    PerformanceMonitor, PerformanceStats, Priority, QueueStatus, ServiceStats,
    SimulatedLegacySystem,
};
use metrics::increment_counter;
use portfolio_monitor_core::aggregator::{
    allocation_chart_data, build_holdings, calculate_absolute_change, calculate_percentage_change,
    calculate_portfolio_metrics, current_balance, filter_holdings, portfolio_summary,
    simulate_price_movement, sort_holdings, transaction_analytics, transaction_history,
    AllocationSlice, HoldingFilter, HoldingSortKey, PortfolioFilters, PortfolioMetrics, SortOrder,
    TransactionAnalytics, TransactionFilters,
};
use portfolio_monitor_core::export::{json_rows_to_delimited, transactions_to_csv};
use portfolio_monitor_core::validation::{generate_order_ref, validate_order_data};
use portfolio_monitor_core::{
    AccountDetail, AppError, AppResult, OrderDetail, OrderDraft, OrderId, OrderStatus,
    PortfolioHolding, SecurityDetail, TimeRange, TransactionRecord,
};
use portfolio_monitor_database::{
    InMemoryStore, LocalStorage, RecordStore, RestStore, StoreBackend, StoreResult, TtlCache,
};
use security_guard::{InputKind, SecurityGuard, SecurityStats, ThreatReport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthService, SessionUser, StorageIdentity};
use crate::config::AppConfig;

const SECURITIES_KEY: &str = "securities";
const ORDERS_KEY: &str = "orders";
const ACCOUNTS_KEY: &str = "accounts";
/// Order submissions allowed per user per rate-limit window
const ORDER_SUBMIT_LIMIT: usize = 10;

/// Everything the dashboard shows for the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub user: SessionUser,
    pub metrics: PortfolioMetrics,
    pub current_balance: rust_decimal::Decimal,
    pub holdings: Vec<PortfolioHolding>,
    pub allocation: Vec<AllocationSlice>,
    pub analytics: TransactionAnalytics,
}

/// System monitor figures
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub service: ServiceStats,
    pub performance: PerformanceStats,
    pub queue: QueueStatus,
    pub audit: AuditStats,
    pub errors: ErrorStats,
    pub security: SecurityStats,
}

pub struct PortfolioMonitor {
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    cache: Arc<TtlCache<Value>>,
    audit: Arc<AuditLog>,
    errors: Arc<ErrorHandler>,
    security: Arc<SecurityGuard>,
    performance: Arc<PerformanceMonitor>,
    queue: LegacyQueue,
    auth: AuthService,
}

impl PortfolioMonitor {
    /// Wires every service from `config`. Must run inside a Tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.store.backend {
            StoreBackend::Rest => Arc::new(
                RestStore::new(&config.store).context("Failed to build record store client")?,
            ),
            StoreBackend::Memory => {
                Arc::new(InMemoryStore::seeded().context("Failed to load store fixtures")?)
            }
        };
        Self::with_store(config, store)
    }

    /// Same as [`PortfolioMonitor::new`] over an existing record store
    pub fn with_store(config: AppConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("PortfolioMonitor must be created inside a Tokio runtime"))?;

        let local = Arc::new(match &config.storage.local_path {
            Some(path) => LocalStorage::open(path)
                .with_context(|| format!("Failed to open local storage at {}", path.display()))?,
            None => LocalStorage::in_memory(),
        });
        let session = Arc::new(LocalStorage::in_memory());
        let identity = StorageIdentity::new(local.clone(), session);
        let provider: Arc<dyn IdentityProvider> = Arc::new(identity.clone());

        let audit = Arc::new(if config.audit.persist_remote {
            AuditLog::with_sink(
                config.audit.clone(),
                provider.clone(),
                Arc::new(StoreSink::new(store.clone())),
                local.clone(),
            )
        } else {
            AuditLog::new(config.audit.clone(), provider.clone())
        });
        let errors = Arc::new(ErrorHandler::new(
            audit.clone(),
            provider.clone(),
            Arc::new(LogReporter::default()),
        ));
        let security = Arc::new(SecurityGuard::new(
            config.security.clone(),
            audit.clone(),
            provider.clone(),
        ));
        let performance = Arc::new(PerformanceMonitor::new(audit.clone(), provider));
        let bridge = Arc::new(LegacyBridge::new(
            Arc::new(SimulatedLegacySystem::new()),
            performance.clone(),
            audit.clone(),
            errors.clone(),
        ));
        let queue = LegacyQueue::new(bridge, config.queue.clone());
        let auth = AuthService::new(identity, audit.clone(), errors.clone(), security.clone());
        let cache = Arc::new(TtlCache::new(config.cache.clone()));

        info!(backend = ?config.store.backend, "Portfolio monitor initialized");
        audit.log_system_event("STARTUP", json!({ "version": crate::VERSION }));

        Ok(Self {
            config,
            store,
            cache,
            audit,
            errors,
            security,
            performance,
            queue,
            auth,
        })
    }

    /// Cache-through fetch, timed and error-routed
    async fn cached<T, F, Fut>(&self, key: &str, fetch: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        if let Some(hit) = self.cache.get(key) {
            match serde_json::from_value(hit) {
                Ok(value) => return Ok(value),
                Err(err) => warn!("Discarding undecodable cache entry {}: {}", key, err),
            }
        }

        let timer = self.performance.start_timer(format!("fetch_{}", key));
        let fetched = fetch().await;
        self.performance.end_timer(timer);

        match fetched {
            Ok(value) => {
                self.cache.set_with_default_ttl(key, serde_json::to_value(&value)?);
                Ok(value)
            }
            Err(err) => {
                let err = AppError::from(err);
                self.errors
                    .handle_error(&err, json!({ "context": "fetch", "resource": key }));
                Err(err)
            }
        }
    }

    pub async fn securities(&self) -> AppResult<Vec<SecurityDetail>> {
        self.cached(SECURITIES_KEY, || self.store.securities()).await
    }

    pub async fn orders(&self) -> AppResult<Vec<OrderDetail>> {
        self.cached(ORDERS_KEY, || self.store.orders()).await
    }

    async fn accounts(&self, user: &SessionUser) -> AppResult<Vec<AccountDetail>> {
        let key = format!("{}:{}", ACCOUNTS_KEY, user.id);
        self.cached(&key, || self.store.accounts_by_user(user.id)).await
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> AppResult<Dashboard> {
        let user = self.auth.require_user()?;
        let orders = self.orders().await?;
        let securities = self.securities().await?;
        let accounts = self.accounts(&user).await?;

        let holdings = build_holdings(&orders, &securities, user.id);
        let user_orders: Vec<OrderDetail> = orders
            .into_iter()
            .filter(|o| o.created_by == user.id)
            .collect();

        let dashboard = Dashboard {
            metrics: calculate_portfolio_metrics(&holdings),
            current_balance: current_balance(&accounts, user.id),
            allocation: allocation_chart_data(&holdings),
            analytics: transaction_analytics(&user_orders),
            holdings,
            user,
        };
        self.audit.log_data_access(
            "dashboard",
            "READ",
            json!({ "holdings": dashboard.holdings.len() }),
        );
        Ok(dashboard)
    }

    /// Moves every cached quote one random step; later views read the moved prices
    pub async fn tick_prices(&self, volatility: rust_decimal::Decimal) -> AppResult<Vec<SecurityDetail>> {
        let mut securities = self.securities().await?;
        {
            let mut rng = rand::thread_rng();
            for security in &mut securities {
                let price = simulate_price_movement(&mut rng, security.current_price, volatility);
                security.change_value = calculate_absolute_change(security.value, price);
                security.change_percent =
                    calculate_percentage_change(security.value, price).round_dp(2);
                security.current_price = price;
            }
        }
        self.cache
            .set_with_default_ttl(SECURITIES_KEY, serde_json::to_value(&securities)?);
        debug!(count = securities.len(), "Quotes moved");
        Ok(securities)
    }

    #[instrument(skip(self))]
    pub async fn portfolio(
        &self,
        filters: &PortfolioFilters,
        holding: &HoldingFilter,
        sort: Option<(HoldingSortKey, SortOrder)>,
    ) -> AppResult<Vec<PortfolioHolding>> {
        let user = self.auth.require_user()?;
        let orders = self.orders().await?;
        let securities = self.securities().await?;

        let summary = portfolio_summary(&orders, &securities, user.id, filters);
        let mut holdings = filter_holdings(&summary, holding);
        if let Some((key, order)) = sort {
            holdings = sort_holdings(&holdings, key, order);
        }
        self.audit.log_data_access(
            "portfolio",
            "READ",
            json!({ "filters": filters, "results": holdings.len() }),
        );
        Ok(holdings)
    }

    /// The signed-in user's settled transactions
    #[instrument(skip(self))]
    pub async fn transactions(&self, filters: &TransactionFilters) -> AppResult<Vec<TransactionRecord>> {
        let user = self.auth.require_user()?;
        let orders: Vec<OrderDetail> = self
            .orders()
            .await?
            .into_iter()
            .filter(|o| o.created_by == user.id)
            .collect();
        let securities = self.securities().await?;

        let records = transaction_history(&orders, &securities, filters);
        self.audit.log_data_access(
            "transactions",
            "READ",
            json!({ "filters": filters, "results": records.len() }),
        );
        Ok(records)
    }

    pub async fn export_transactions(
        &self,
        filters: &TransactionFilters,
        format: ExportFormat,
    ) -> AppResult<String> {
        let records = self.transactions(filters).await?;
        let rendered = match format {
            ExportFormat::Csv => transactions_to_csv(&records),
            ExportFormat::Json => serde_json::to_string_pretty(&records)?,
            ExportFormat::Tsv => {
                let rows = records
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                json_rows_to_delimited(&rows, '\t')
            }
        };
        self.audit.log_data_access(
            "transactions",
            "EXPORT",
            json!({ "format": format.to_string(), "rows": records.len() }),
        );
        Ok(rendered)
    }

    /// Validates and submits a new order for the signed-in user
    #[instrument(skip(self, draft))]
    pub async fn create_order(&self, draft: OrderDraft) -> AppResult<OrderDetail> {
        let user = self.auth.require_user()?;
        match self.submit_order(&user, draft).await {
            Ok(order) => Ok(order),
            Err(err) => {
                self.errors
                    .handle_error(&err, json!({ "context": "create_order", "userId": user.id }));
                Err(err)
            }
        }
    }

    async fn submit_order(&self, user: &SessionUser, draft: OrderDraft) -> AppResult<OrderDetail> {
        let validation = validate_order_data(&draft);
        if let Some((field, message)) = validation.errors.iter().next() {
            return Err(AppError::field(message.clone(), field.as_str()));
        }
        let (Some(security_id), Some(transaction_type), Some(quantity), Some(order_value)) = (
            draft.security_id,
            draft.transaction_type,
            draft.quantity,
            draft.order_value,
        ) else {
            return Err(AppError::validation("Incomplete order", None::<String>, None::<String>));
        };

        // only well-formed drafts count against the limit
        if !self
            .security
            .check_rate_limit(&format!("order:{}", user.id), Some(ORDER_SUBMIT_LIMIT))
        {
            return Err(AppError::business_logic(
                "Too many orders submitted. Please wait before trying again.",
                Some("create_order"),
            ));
        }

        // numeric fields go through the same filter as typed form input
        self.security
            .sanitize_input(&quantity.to_string(), InputKind::Number)?;
        self.security
            .sanitize_input(&order_value.to_string(), InputKind::Number)?;

        let security = self
            .securities()
            .await?
            .into_iter()
            .find(|s| s.id == security_id)
            .ok_or_else(|| {
                AppError::business_logic(
                    format!("Unknown security {}", security_id),
                    Some("create_order"),
                )
            })?;

        let now = Utc::now();
        let order = OrderDetail {
            id: 0,
            security_id,
            order_ref_no: generate_order_ref(now),
            order_status: OrderStatus::Submitted,
            transaction_type,
            order_value,
            quantity,
            order_date: draft.order_date.unwrap_or(now),
            created_on: Some(now),
            created_by: user.id,
        };

        let created = self.store.create_order(order).await?;
        self.cache.clear(Some(ORDERS_KEY));

        increment_counter!("orders_created_total", "side" => transaction_type.as_str());
        self.audit.log_transaction(
            &transaction_type.as_str().to_uppercase(),
            order_value,
            json!({
                "orderId": created.id,
                "orderRefNo": created.order_ref_no,
                "security": security.security_symbol,
                "quantity": quantity,
            }),
        );
        info!(order_ref = %created.order_ref_no, "Order submitted");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> AppResult<OrderDetail> {
        self.auth.require_user()?;
        let current = self
            .orders()
            .await?
            .into_iter()
            .find(|o| o.id == order_id)
            .ok_or_else(|| {
                AppError::business_logic(format!("Order {} not found", order_id), Some("update_order_status"))
            })?;

        if !current.order_status.can_transition_to(status) {
            let err = AppError::business_logic(
                format!("Cannot move order from {} to {}", current.order_status, status),
                Some("update_order_status"),
            );
            self.errors
                .handle_error(&err, json!({ "context": "update_order_status", "orderId": order_id }));
            return Err(err);
        }

        let updated = self.store.update_order_status(order_id, status).await?;
        self.cache.clear(Some(ORDERS_KEY));
        self.audit.log_data_access(
            "order",
            "UPDATE",
            json!({
                "orderId": order_id,
                "from": current.order_status,
                "to": status,
            }),
        );
        Ok(updated)
    }

    pub fn enqueue_legacy(
        &self,
        operation: LegacyOperation,
        payload: Value,
        priority: Priority,
    ) -> LegacyResult<JobHandle> {
        self.queue.enqueue(operation, payload, priority)
    }

    /// Queues jobs together so they start in priority order
    pub fn enqueue_legacy_batch(
        &self,
        jobs: Vec<(LegacyOperation, Value, Priority)>,
    ) -> LegacyResult<Vec<JobHandle>> {
        self.queue.enqueue_batch(jobs)
    }

    /// Read-only statistics; see [`Self::sweep_threats`] for the blocking pass
    pub async fn monitor(&self, range: TimeRange) -> MonitorSnapshot {
        let cache_stats = self.cache.stats();
        MonitorSnapshot {
            performance: self.performance.performance_stats(range, &cache_stats),
            service: self.performance.service_stats(cache_stats, self.queue.pending_len()),
            queue: self.queue.status(),
            audit: self.audit.stats(range).await,
            errors: self.errors.error_stats(range),
            security: self.security.security_stats(range),
        }
    }

    /// Runs threat analysis, which may block IPs
    pub fn sweep_threats(&self) -> ThreatReport {
        self.security.analyze_threats()
    }

    pub fn optimize_memory(&self) -> MemoryReport {
        let purged_limits = self.security.cleanup_rate_limits();
        debug!(purged_limits, "Rate limit windows cleaned");
        self.performance.optimize_memory(&self.cache)
    }

    pub async fn export_audit(&self, format: ExportFormat, filters: &AuditFilters) -> AppResult<String> {
        self.audit.export(format, filters).await
    }

    /// Waits for pending audit persistence
    pub async fn shutdown(&self) {
        self.audit.log_system_event("SHUTDOWN", Value::Null);
        self.audit.flush().await;
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn errors(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    pub fn security(&self) -> &Arc<SecurityGuard> {
        &self.security
    }

    pub fn queue(&self) -> &LegacyQueue {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{Credentials, DEMO_EMAIL, DEMO_PASSWORD};
    use portfolio_monitor_core::{ErrorKind, TransactionType};
    use portfolio_monitor_core::aggregator::GainLossFilter;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.audit.persist_remote = false;
        config
    }

    pub(crate) async fn signed_in() -> PortfolioMonitor {
        let app = PortfolioMonitor::new(memory_config()).unwrap();
        app.auth()
            .login(&Credentials::new(DEMO_EMAIL, DEMO_PASSWORD))
            .unwrap();
        app
    }

    #[test]
    fn test_requires_runtime() {
        assert!(PortfolioMonitor::new(memory_config()).is_err());
    }

    #[tokio::test]
    async fn test_views_require_login() {
        let app = PortfolioMonitor::new(memory_config()).unwrap();
        let err = app.dashboard().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_fetches_go_through_cache() {
        let app = signed_in().await;
        app.securities().await.unwrap();
        app.securities().await.unwrap();

        let stats = app.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_portfolio_sorted_by_value() {
        let app = signed_in().await;
        let holdings = app
            .portfolio(
                &PortfolioFilters::default(),
                &HoldingFilter::default(),
                Some((HoldingSortKey::CurrentValue, SortOrder::Desc)),
            )
            .await
            .unwrap();
        assert_eq!(holdings.len(), 5);
        assert!(holdings
            .windows(2)
            .all(|pair| pair[0].current_value >= pair[1].current_value));
    }

    #[tokio::test]
    async fn test_create_order_invalidates_orders_cache() {
        let app = signed_in().await;
        let before = app.orders().await.unwrap().len();

        let order = app
            .create_order(OrderDraft {
                security_id: Some(1),
                transaction_type: Some(TransactionType::Buy),
                quantity: Some(dec!(3)),
                order_value: Some(dec!(526.50)),
                order_date: None,
                created_by: 1,
            })
            .await
            .unwrap();
        assert!(order.order_ref_no.starts_with("ORD"));
        assert_eq!(order.order_status, OrderStatus::Submitted);
        assert_eq!(app.orders().await.unwrap().len(), before + 1);

        let event = app
            .audit()
            .recent()
            .into_iter()
            .find(|e| e.action == "TRANSACTION_BUY")
            .unwrap();
        assert_eq!(event.details["security"], "AAPL");
    }

    #[tokio::test]
    async fn test_portfolio_holding_filters() {
        let app = signed_in().await;
        let all = PortfolioFilters::default();

        let gains = app
            .portfolio(
                &all,
                &HoldingFilter {
                    gain_loss: GainLossFilter::Gain,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(!gains.is_empty());
        assert!(gains.iter().all(|h| h.gain_loss() > Decimal::ZERO));

        let none = app
            .portfolio(
                &all,
                &HoldingFilter {
                    min_value: Some(dec!(1000000)),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_tick_prices_updates_cached_quotes() {
        let app = signed_in().await;
        let moved = app.tick_prices(dec!(0.02)).await.unwrap();
        assert_eq!(app.securities().await.unwrap(), moved);

        for security in &moved {
            assert_eq!(security.change_value, security.current_price - security.value);
        }
    }

    #[tokio::test]
    async fn test_rejected_drafts_do_not_use_order_limit() {
        let app = signed_in().await;
        let draft = |quantity| OrderDraft {
            security_id: Some(2),
            transaction_type: Some(TransactionType::Sell),
            quantity: Some(quantity),
            order_value: Some(dec!(100)),
            order_date: None,
            created_by: 1,
        };

        for _ in 0..ORDER_SUBMIT_LIMIT + 2 {
            let err = app.create_order(draft(dec!(0))).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        for _ in 0..ORDER_SUBMIT_LIMIT {
            app.create_order(draft(dec!(1))).await.unwrap();
        }

        let err = app.create_order(draft(dec!(1))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessLogic);
        assert!(err.message().starts_with("Too many orders"));
    }

    #[tokio::test]
    async fn test_update_order_status_checks_lifecycle() {
        let app = signed_in().await;
        // order 4 is Submitted, order 1 Completed
        let updated = app.update_order_status(4, OrderStatus::Executed).await.unwrap();
        assert_eq!(updated.order_status, OrderStatus::Executed);

        let err = app
            .update_order_status(1, OrderStatus::Submitted)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessLogic);
        assert_eq!(app.errors().error_queue().len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_leaves_blocklist_to_sweep() {
        let app = signed_in().await;
        let threshold = app.security().config().per_ip_block_threshold;
        for _ in 0..=threshold {
            assert!(app
                .security()
                .sanitize_input("<script>alert(1)</script>", InputKind::Html)
                .is_err());
        }

        app.monitor(TimeRange::LastHour).await;
        assert_eq!(app.security().blocked_ip_count(), 0);

        let report = app.sweep_threats();
        let client_ip = &app.security().config().client_ip;
        assert_eq!(report.newly_blocked, vec![client_ip.clone()]);
        assert!(app.security().is_ip_blocked(client_ip));
    }

    #[tokio::test]
    async fn test_monitor_snapshot() {
        let app = signed_in().await;
        app.dashboard().await.unwrap();

        let snapshot = app.monitor(TimeRange::LastHour).await;
        assert!(snapshot.performance.total_operations >= 3);
        assert_eq!(snapshot.queue.queue_length, 0);
        assert!(snapshot.audit.total_actions >= 2);
        assert!(!app.sweep_threats().high_activity);
    }
}
