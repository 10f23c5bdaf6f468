use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{decode_json, ensure_success, send_error};
use crate::config::SupabaseConfig;
use crate::workflows::collaborators::{
    CashOrderReceipt, CashOrderRow, CashOrderStore, GeoPoint, OrderLedger, OrderRecord,
    OrderStatus, PaidOrder, RouteSchedule, StoreError,
};
use crate::workflows::intake::submission::Submission;

const SERVICE: &str = "supabase";
const ORDER_COLUMNS: &str =
    "id,stripe_session_id,stripe_customer_id,stripe_subscription_id,status,deposit_amount,is_deposit";

/// Data store adapter over the PostgREST interface.
pub struct SupabaseStore {
    client: Client,
    url: String,
    service_key: String,
    public_origin: String,
}

impl SupabaseStore {
    pub fn new(client: Client, config: &SupabaseConfig, public_origin: impl Into<String>) -> Self {
        Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            public_origin: public_origin.into(),
        }
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn select_orders(
        &self,
        filter: (&str, String),
        limit: Option<usize>,
    ) -> Result<Vec<OrderRecord>, StoreError> {
        let mut query = vec![("select", ORDER_COLUMNS.to_string()), (filter.0, filter.1)];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let response = self
            .table(Method::GET, "orders")
            .query(&query)
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        Ok(decode_json(SERVICE, response).await?)
    }

    async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: (&str, String),
        body: &B,
    ) -> Result<Vec<Value>, StoreError> {
        let response = self
            .table(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&[filter])
            .json(body)
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        Ok(decode_json(SERVICE, response).await?)
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl CashOrderStore for SupabaseStore {
    async fn insert_cash_order(
        &self,
        submission: &Submission,
        geo: Option<&GeoPoint>,
    ) -> Result<CashOrderReceipt, StoreError> {
        let row = CashOrderRow::from_submission(submission, geo, &self.public_origin)?;
        let response = self
            .table(Method::POST, "orders")
            .header("Prefer", "return=representation")
            .query(&[("select", "*")])
            .json(&[&row])
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        let inserted: Vec<Value> = decode_json(SERVICE, response).await?;

        let stored = inserted.first();
        let order_id = stored
            .and_then(|value| value.get("order_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(row.order_id)
            .unwrap_or_default();
        let status = stored
            .and_then(|value| value.get("status"))
            .and_then(Value::as_str)
            .unwrap_or(row.status)
            .to_string();
        debug!(order_id = %order_id, "cash order row inserted");
        Ok(CashOrderReceipt { order_id, status })
    }
}

#[async_trait]
impl OrderLedger for SupabaseStore {
    async fn order_for_session(&self, session_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let rows = self
            .select_orders(("stripe_session_id", eq(session_id)), Some(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_paid_order(&self, order: &PaidOrder) -> Result<(), StoreError> {
        let response = self
            .table(Method::POST, "orders")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "stripe_session_id")])
            .json(&[order])
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: OrderStatus,
    ) -> Result<usize, StoreError> {
        let rows = self
            .patch(
                "orders",
                ("stripe_subscription_id", eq(subscription_id)),
                &json!({ "status": status.label() }),
            )
            .await?;
        Ok(rows.len())
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let rows = self.select_orders(("id", eq(order_id)), Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    async fn mark_cancelled(
        &self,
        order_id: &str,
        status: OrderStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows = self
            .patch(
                "orders",
                ("id", eq(order_id)),
                &json!({ "status": status.label(), "cancelled_at": cancelled_at }),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn save_route_schedule(&self, schedule: &RouteSchedule) -> Result<(), StoreError> {
        self.patch(
            "routes",
            ("id", eq(&schedule.route_id)),
            &json!({
                "service_start_date": schedule.service_start_date,
                "cadence": schedule.cadence.label(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn orders_on_route(&self, route_id: &str) -> Result<Vec<OrderRecord>, StoreError> {
        self.select_orders(("route_id", eq(route_id)), None).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use httpmock::Method::PATCH;
    use serde_json::json;

    use super::*;
    use crate::workflows::gateways::http_client;

    fn store(server: &MockServer) -> SupabaseStore {
        let config = SupabaseConfig {
            url: server.base_url(),
            service_key: "service-key".to_string(),
        };
        SupabaseStore::new(
            http_client(Duration::from_secs(2)).expect("client"),
            &config,
            "https://intake.example.com",
        )
    }

    #[tokio::test]
    async fn fetch_order_filters_by_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/orders")
                .header("apikey", "service-key")
                .query_param("id", "eq.ord_1")
                .query_param("limit", "1");
            then.status(200).json_body(json!([{
                "id": "ord_1",
                "stripe_subscription_id": "sub_1",
                "stripe_customer_id": "cus_1",
                "status": "active",
                "deposit_amount": 25
            }]));
        });

        let order = store(&server)
            .fetch_order("ord_1")
            .await
            .expect("query succeeds")
            .expect("order present");

        mock.assert();
        assert_eq!(order.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(order.deposit_amount, Some(rust_decimal_macros::dec!(25)));
    }

    #[tokio::test]
    async fn paid_orders_upsert_on_session_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/orders")
                .query_param("on_conflict", "stripe_session_id")
                .header("prefer", "resolution=merge-duplicates,return=minimal")
                .body_contains("\"stripe_session_id\":\"cs_1\"");
            then.status(201);
        });

        let order = PaidOrder {
            stripe_session_id: "cs_1".to_string(),
            order_id: Some("abc".to_string()),
            customer_email: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            amount_total_cents: Some(12500),
            currency: Some("usd".to_string()),
            billing_type: None,
            is_deposit: false,
            deposit_amount: None,
            status: OrderStatus::Paid,
            paid_at: Utc::now(),
            metadata: Default::default(),
        };
        store(&server)
            .upsert_paid_order(&order)
            .await
            .expect("upsert succeeds");

        mock.assert();
    }

    #[tokio::test]
    async fn cancelling_a_missing_order_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PATCH).path("/rest/v1/orders");
            then.status(200).json_body(json!([]));
        });

        let err = store(&server)
            .mark_cancelled("ghost", OrderStatus::CancelledBeforeStart, Utc::now())
            .await
            .expect_err("no rows patched");
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn store_outage_is_retryable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/orders");
            then.status(503).body("unavailable");
        });

        let err = store(&server)
            .orders_on_route("r1")
            .await
            .expect_err("outage");
        assert!(err.is_retryable());
    }
}
