//! In-process record store seeded from the bundled JSON fixtures

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use portfolio_monitor_core::{
    AccountDetail, OrderDetail, OrderId, OrderStatus, SecurityDetail, SecurityId, UserDetail,
    UserId,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;

const SEED: &str = include_str!("../fixtures/db.json");

/// Contents of a JSON server database file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub user_details: Vec<UserDetail>,
    #[serde(default)]
    pub security_details: Vec<SecurityDetail>,
    #[serde(default)]
    pub order_details: Vec<OrderDetail>,
    #[serde(default)]
    pub account_details: Vec<AccountDetail>,
    #[serde(default, rename = "audit-logs")]
    pub audit_logs: Vec<Value>,
}

impl Dataset {
    /// The bundled demo dataset
    pub fn seed() -> StoreResult<Self> {
        Ok(serde_json::from_str(SEED)?)
    }
}

/// Record store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Dataset>,
}

impl InMemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            data: RwLock::new(dataset),
        }
    }

    /// Store preloaded with the demo users, securities, orders and ledger
    pub fn seeded() -> StoreResult<Self> {
        Ok(Self::new(Dataset::seed()?))
    }

    pub fn audit_log_count(&self) -> usize {
        self.data.read().audit_logs.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn users(&self) -> StoreResult<Vec<UserDetail>> {
        Ok(self.data.read().user_details.clone())
    }

    async fn user(&self, id: UserId) -> StoreResult<UserDetail> {
        self.data
            .read()
            .user_details
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("userDetails/{}", id)))
    }

    async fn securities(&self) -> StoreResult<Vec<SecurityDetail>> {
        Ok(self.data.read().security_details.clone())
    }

    async fn security(&self, id: SecurityId) -> StoreResult<SecurityDetail> {
        self.data
            .read()
            .security_details
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("securityDetails/{}", id)))
    }

    async fn orders(&self) -> StoreResult<Vec<OrderDetail>> {
        Ok(self.data.read().order_details.clone())
    }

    async fn orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderDetail>> {
        Ok(self
            .data
            .read()
            .order_details
            .iter()
            .filter(|o| o.created_by == user_id)
            .cloned()
            .collect())
    }

    async fn orders_by_status(&self, status: OrderStatus) -> StoreResult<Vec<OrderDetail>> {
        Ok(self
            .data
            .read()
            .order_details
            .iter()
            .filter(|o| o.order_status == status)
            .cloned()
            .collect())
    }

    async fn create_order(&self, mut order: OrderDetail) -> StoreResult<OrderDetail> {
        let mut data = self.data.write();
        order.id = data.order_details.iter().map(|o| o.id).max().unwrap_or(0) + 1;
        if order.created_on.is_none() {
            order.created_on = Some(Utc::now());
        }
        data.order_details.push(order.clone());
        debug!("Stored order {} as id {}", order.order_ref_no, order.id);
        Ok(order)
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<OrderDetail> {
        let mut data = self.data.write();
        let order = data
            .order_details
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::not_found(format!("orderDetails/{}", order_id)))?;
        order.order_status = status;
        Ok(order.clone())
    }

    async fn accounts_by_user(&self, user_id: UserId) -> StoreResult<Vec<AccountDetail>> {
        Ok(self
            .data
            .read()
            .account_details
            .iter()
            .filter(|a| a.id_user_login_detail == user_id)
            .cloned()
            .collect())
    }

    async fn post_audit_log(&self, entry: &Value) -> StoreResult<()> {
        self.data.write().audit_logs.push(entry.clone());
        Ok(())
    }

    async fn audit_logs(&self, query: &[(String, String)]) -> StoreResult<Vec<Value>> {
        // exact-match filtering on top-level fields, as the JSON server does
        let matches = |entry: &Value| {
            query.iter().all(|(key, expected)| match entry.get(key) {
                Some(Value::String(s)) => s == expected,
                Some(other) => other.to_string() == *expected,
                None => true,
            })
        };
        Ok(self
            .data
            .read()
            .audit_logs
            .iter()
            .filter(|e| matches(e))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_monitor_core::TransactionType;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_seed_dataset() {
        let data = Dataset::seed().unwrap();
        assert_eq!(data.user_details.len(), 2);
        assert_eq!(data.security_details.len(), 8);
        assert_eq!(data.order_details.len(), 12);
        assert_eq!(data.account_details.len(), 5);
        assert_eq!(data.security_details[0].current_price, dec!(175.50));
    }

    #[tokio::test]
    async fn test_order_queries() {
        let store = InMemoryStore::seeded().unwrap();
        assert_eq!(store.orders_by_user(1).await.unwrap().len(), 12);
        assert!(store.orders_by_user(2).await.unwrap().is_empty());
        assert_eq!(
            store
                .orders_by_status(OrderStatus::Completed)
                .await
                .unwrap()
                .len(),
            6
        );
        let found = store.order_by_ref("ORD20240105").await.unwrap().unwrap();
        assert_eq!(found.transaction_type, TransactionType::Sell);
        assert!(store.order_by_ref("ORD00000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_update_order() {
        let store = InMemoryStore::seeded().unwrap();
        let template = store.orders().await.unwrap().remove(0);

        let created = store
            .create_order(OrderDetail {
                id: 0,
                order_ref_no: "ORD12345678".to_string(),
                order_status: OrderStatus::Submitted,
                created_on: None,
                ..template
            })
            .await
            .unwrap();
        assert_eq!(created.id, 13);
        assert!(created.created_on.is_some());

        let updated = store
            .update_order_status(13, OrderStatus::Executed)
            .await
            .unwrap();
        assert_eq!(updated.order_status, OrderStatus::Executed);

        let missing = store.update_order_status(99, OrderStatus::Executed).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_audit_log_filters() {
        let store = InMemoryStore::default();
        store
            .post_audit_log(&json!({"action": "AUTH_LOGIN", "userId": 1}))
            .await
            .unwrap();
        store
            .post_audit_log(&json!({"action": "DATA_READ", "userId": 2}))
            .await
            .unwrap();

        let logins = store
            .audit_logs(&[("action".to_string(), "AUTH_LOGIN".to_string())])
            .await
            .unwrap();
        assert_eq!(logins.len(), 1);

        let by_user = store
            .audit_logs(&[("userId".to_string(), "2".to_string())])
            .await
            .unwrap();
        assert_eq!(by_user[0]["action"], "DATA_READ");
        assert_eq!(store.audit_log_count(), 2);
    }
}
