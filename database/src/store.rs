//! # Record Store
//!
//! The remote JSON server is the system of record for users, securities,
//! orders, account ledgers and persisted audit logs. `RecordStore` is the
//! seam; `RestStore` talks HTTP, `InMemoryStore` serves seeded fixtures.

use async_trait::async_trait;
use portfolio_monitor_core::{
    AccountDetail, OrderDetail, OrderId, OrderStatus, SecurityDetail, SecurityId, UserDetail,
    UserId,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Collection paths on the JSON server
pub mod paths {
    pub const USERS: &str = "userDetails";
    pub const SECURITIES: &str = "securityDetails";
    pub const ORDERS: &str = "orderDetails";
    pub const ACCOUNTS: &str = "accountDetails";
    pub const AUDIT_LOGS: &str = "audit-logs";
}

/// Access to the system of record
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn users(&self) -> StoreResult<Vec<UserDetail>>;

    async fn user(&self, id: UserId) -> StoreResult<UserDetail>;

    async fn securities(&self) -> StoreResult<Vec<SecurityDetail>>;

    async fn security(&self, id: SecurityId) -> StoreResult<SecurityDetail>;

    async fn security_by_symbol(&self, symbol: &str) -> StoreResult<Option<SecurityDetail>> {
        Ok(self
            .securities()
            .await?
            .into_iter()
            .find(|s| s.security_symbol == symbol))
    }

    async fn orders(&self) -> StoreResult<Vec<OrderDetail>>;

    async fn orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderDetail>>;

    async fn orders_by_status(&self, status: OrderStatus) -> StoreResult<Vec<OrderDetail>>;

    async fn order_by_ref(&self, order_ref_no: &str) -> StoreResult<Option<OrderDetail>> {
        Ok(self
            .orders()
            .await?
            .into_iter()
            .find(|o| o.order_ref_no == order_ref_no))
    }

    /// Appends an order; the store assigns the id
    async fn create_order(&self, order: OrderDetail) -> StoreResult<OrderDetail>;

    /// Replaces the order's status and returns the updated record
    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<OrderDetail>;

    async fn accounts_by_user(&self, user_id: UserId) -> StoreResult<Vec<AccountDetail>>;

    async fn post_audit_log(&self, entry: &Value) -> StoreResult<()>;

    /// Persisted audit entries; `query` is forwarded as exact-match filters
    async fn audit_logs(&self, query: &[(String, String)]) -> StoreResult<Vec<Value>>;
}

/// HTTP client for the JSON server
pub struct RestStore {
    client: Client,
    base_url: Url,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            })
        }
    }

    #[instrument(skip(self, query))]
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> StoreResult<T> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("API GET Error ({}): {}", path, e);
                StoreError::from(e)
            })?;
        Ok(Self::check(response)?.json().await?)
    }

    #[instrument(skip(self, body))]
    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> StoreResult<T> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            error!("API POST Error ({}): {}", path, e);
            StoreError::from(e)
        })?;
        Ok(Self::check(response)?.json().await?)
    }

    #[instrument(skip(self, body))]
    async fn put<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> StoreResult<T> {
        let url = self.endpoint(path)?;
        debug!("PUT {}", url);
        let response = self.client.put(url).json(body).send().await.map_err(|e| {
            error!("API PUT Error ({}): {}", path, e);
            StoreError::from(e)
        })?;
        Ok(Self::check(response)?.json().await?)
    }

    fn by_id(collection: &str, id: u64) -> String {
        format!("{}/{}", collection, id)
    }

    fn filter(key: &str, value: impl ToString) -> Vec<(String, String)> {
        vec![(key.to_string(), value.to_string())]
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn users(&self) -> StoreResult<Vec<UserDetail>> {
        self.get(paths::USERS, &[]).await
    }

    async fn user(&self, id: UserId) -> StoreResult<UserDetail> {
        self.get(&Self::by_id(paths::USERS, id), &[]).await
    }

    async fn securities(&self) -> StoreResult<Vec<SecurityDetail>> {
        self.get(paths::SECURITIES, &[]).await
    }

    async fn security(&self, id: SecurityId) -> StoreResult<SecurityDetail> {
        self.get(&Self::by_id(paths::SECURITIES, id), &[]).await
    }

    async fn orders(&self) -> StoreResult<Vec<OrderDetail>> {
        self.get(paths::ORDERS, &[]).await
    }

    async fn orders_by_user(&self, user_id: UserId) -> StoreResult<Vec<OrderDetail>> {
        self.get(paths::ORDERS, &Self::filter("createdBy", user_id)).await
    }

    async fn orders_by_status(&self, status: OrderStatus) -> StoreResult<Vec<OrderDetail>> {
        self.get(paths::ORDERS, &Self::filter("orderStatus", status))
            .await
    }

    async fn create_order(&self, order: OrderDetail) -> StoreResult<OrderDetail> {
        // let the server assign the id
        let mut body = serde_json::to_value(&order)?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("id");
        }
        self.post(paths::ORDERS, &body).await
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> StoreResult<OrderDetail> {
        let path = Self::by_id(paths::ORDERS, order_id);
        let mut order: OrderDetail = self.get(&path, &[]).await?;
        order.order_status = status;
        self.put(&path, &order).await
    }

    async fn accounts_by_user(&self, user_id: UserId) -> StoreResult<Vec<AccountDetail>> {
        self.get(paths::ACCOUNTS, &Self::filter("idUserLoginDetail", user_id))
            .await
    }

    async fn post_audit_log(&self, entry: &Value) -> StoreResult<()> {
        let _: Value = self.post(paths::AUDIT_LOGS, entry).await?;
        Ok(())
    }

    async fn audit_logs(&self, query: &[(String, String)]) -> StoreResult<Vec<Value>> {
        self.get(paths::AUDIT_LOGS, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let store = RestStore::new(&StoreConfig {
            base_url: "http://localhost:4000/api".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            store.endpoint(paths::ORDERS).unwrap().as_str(),
            "http://localhost:4000/api/orderDetails"
        );
        assert_eq!(
            store
                .endpoint(&RestStore::by_id(paths::USERS, 1))
                .unwrap()
                .as_str(),
            "http://localhost:4000/api/userDetails/1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = RestStore::new(&StoreConfig {
            base_url: "::not-a-url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // port 9 (discard) is closed on test machines
        let store = RestStore::new(&StoreConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let err = store.securities().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport { .. }));
    }
}
