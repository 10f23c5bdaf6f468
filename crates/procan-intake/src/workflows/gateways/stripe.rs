use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{decode_json, ensure_success, send_error};
use crate::config::StripeConfig;
use crate::workflows::collaborators::{
    BalanceCredit, CancelTiming, CheckoutMode, CheckoutSession, CheckoutSessionRequest,
    GatewayError, PaymentGateway, SubscriptionBilling, TrialEndUpdate,
};

const SERVICE: &str = "stripe";

/// Payment processor adapter speaking the form-encoded REST API.
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(client: Client, config: &StripeConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut request = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        let response = request.send().await.map_err(send_error(SERVICE))?;
        ensure_success(SERVICE, response).await
    }
}

fn field(key: impl Into<String>, value: impl ToString) -> (String, String) {
    (key.into(), value.to_string())
}

fn price_line(
    form: &mut Vec<(String, String)>,
    index: usize,
    request: &CheckoutSessionRequest,
    name: &str,
    unit_amount: i64,
    interval_months: Option<u32>,
) {
    let prefix = format!("line_items[{index}]");
    form.push(field(format!("{prefix}[quantity]"), 1));
    form.push(field(format!("{prefix}[price_data][currency]"), request.currency));
    form.push(field(format!("{prefix}[price_data][unit_amount]"), unit_amount));
    form.push(field(format!("{prefix}[price_data][product_data][name]"), name));
    form.push(field(
        format!("{prefix}[price_data][product_data][description]"),
        &request.description,
    ));
    if let Some(months) = interval_months {
        form.push(field(format!("{prefix}[price_data][recurring][interval]"), "month"));
        form.push(field(
            format!("{prefix}[price_data][recurring][interval_count]"),
            months,
        ));
    }
}

/// Encode a session request as processor form fields.
pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        field("success_url", &request.success_url),
        field("cancel_url", &request.cancel_url),
    ];
    if let Some(email) = &request.customer_email {
        form.push(field("customer_email", email));
    }

    let nested_metadata = match request.mode {
        CheckoutMode::Payment => {
            form.push(field("mode", "payment"));
            price_line(&mut form, 0, request, &request.product_name, request.amount_cents, None);
            "payment_intent_data"
        }
        CheckoutMode::DepositPayment => {
            form.push(field("mode", "payment"));
            form.push(field("customer_creation", "always"));
            form.push(field("payment_intent_data[setup_future_usage]", "off_session"));
            let name = format!("{} deposit", request.product_name);
            price_line(&mut form, 0, request, &name, request.amount_cents, None);
            "payment_intent_data"
        }
        CheckoutMode::Setup => {
            form.push(field("mode", "setup"));
            form.push(field("currency", request.currency));
            form.push(field("customer_creation", "always"));
            "setup_intent_data"
        }
        CheckoutMode::Subscription {
            interval_months,
            recurring_cents,
            one_time_cents,
        } => {
            form.push(field("mode", "subscription"));
            price_line(
                &mut form,
                0,
                request,
                &request.product_name,
                recurring_cents,
                Some(interval_months),
            );
            if one_time_cents > 0 {
                price_line(&mut form, 1, request, "Deep clean (one-time)", one_time_cents, None);
            }
            "subscription_data"
        }
    };

    for (key, value) in &request.metadata {
        form.push(field(format!("metadata[{key}]"), value));
        form.push(field(format!("{nested_metadata}[metadata][{key}]"), value));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = session_form(&request);
        debug!(
            mode = request.mode.label(),
            amount_cents = request.amount_cents,
            "creating checkout session"
        );
        let response = self
            .post_form("checkout/sessions", &form, Some(&request.idempotency_key))
            .await?;
        decode_json(SERVICE, response).await
    }
}

#[async_trait]
impl SubscriptionBilling for StripeGateway {
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        timing: CancelTiming,
    ) -> Result<(), GatewayError> {
        let path = format!("subscriptions/{subscription_id}");
        match timing {
            CancelTiming::Immediately => {
                let response = self
                    .client
                    .delete(self.endpoint(&path))
                    .bearer_auth(&self.secret_key)
                    .send()
                    .await
                    .map_err(send_error(SERVICE))?;
                ensure_success(SERVICE, response).await?;
            }
            CancelTiming::AtPeriodEnd => {
                let form = [
                    field("cancel_at_period_end", "true"),
                    field("proration_behavior", "none"),
                ];
                self.post_form(&path, &form, None).await?;
            }
        }
        Ok(())
    }

    async fn credit_customer_balance(&self, credit: &BalanceCredit) -> Result<(), GatewayError> {
        let path = format!("customers/{}/balance_transactions", credit.customer_id);
        let form = [
            field("amount", -credit.amount_cents),
            field("currency", "usd"),
            field("description", &credit.description),
        ];
        self.post_form(&path, &form, Some(&credit.idempotency_key))
            .await?;
        Ok(())
    }

    async fn set_trial_end(&self, update: &TrialEndUpdate) -> Result<(), GatewayError> {
        let path = format!("subscriptions/{}", update.subscription_id);
        let form = [
            field("trial_end", update.trial_end.timestamp()),
            field("proration_behavior", "none"),
        ];
        self.post_form(&path, &form, Some(&update.idempotency_key))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::workflows::gateways::http_client;

    fn gateway(server: &MockServer) -> StripeGateway {
        let config = StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: None,
            api_base: server.base_url(),
        };
        StripeGateway::new(http_client(Duration::from_secs(2)).expect("client"), &config)
    }

    fn request(mode: CheckoutMode) -> CheckoutSessionRequest {
        let mut metadata = BTreeMap::new();
        metadata.insert("order_id".to_string(), "abc123".to_string());
        CheckoutSessionRequest {
            mode,
            amount_cents: 12500,
            currency: "usd",
            customer_email: Some("sam@example.com".to_string()),
            product_name: "ProCan Sanitation Service".to_string(),
            description: "Harbor Street Diner".to_string(),
            success_url: "https://intake.example.com/ok".to_string(),
            cancel_url: "https://intake.example.com/cancel".to_string(),
            metadata,
            idempotency_key: "checkout_abc123".to_string(),
        }
    }

    fn value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn subscription_form_carries_interval_and_one_time_line() {
        let form = session_form(&request(CheckoutMode::Subscription {
            interval_months: 3,
            recurring_cents: 35625,
            one_time_cents: 17500,
        }));
        assert_eq!(value(&form, "mode"), Some("subscription"));
        assert_eq!(
            value(&form, "line_items[0][price_data][recurring][interval_count]"),
            Some("3")
        );
        assert_eq!(value(&form, "line_items[0][price_data][unit_amount]"), Some("35625"));
        assert_eq!(value(&form, "line_items[1][price_data][unit_amount]"), Some("17500"));
        assert_eq!(value(&form, "subscription_data[metadata][order_id]"), Some("abc123"));
    }

    #[test]
    fn deposit_form_saves_card_for_later() {
        let form = session_form(&request(CheckoutMode::DepositPayment));
        assert_eq!(value(&form, "mode"), Some("payment"));
        assert_eq!(
            value(&form, "payment_intent_data[setup_future_usage]"),
            Some("off_session")
        );
    }

    #[test]
    fn setup_form_has_no_line_items() {
        let form = session_form(&request(CheckoutMode::Setup));
        assert_eq!(value(&form, "mode"), Some("setup"));
        assert!(form.iter().all(|(name, _)| !name.starts_with("line_items")));
    }

    #[tokio::test]
    async fn creates_session_with_idempotency_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/checkout/sessions")
                .header("authorization", "Bearer sk_test_123")
                .header("idempotency-key", "checkout_abc123")
                .body_contains("mode=payment");
            then.status(200).json_body(json!({
                "id": "cs_test_42",
                "url": "https://checkout.stripe.com/c/pay/cs_test_42"
            }));
        });

        let session = gateway(&server)
            .create_checkout_session(request(CheckoutMode::Payment))
            .await
            .expect("session created");

        mock.assert();
        assert_eq!(session.id, "cs_test_42");
    }

    #[tokio::test]
    async fn processor_errors_keep_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/checkout/sessions");
            then.status(500).body("boom");
        });

        let err = gateway(&server)
            .create_checkout_session(request(CheckoutMode::Payment))
            .await
            .expect_err("processor failure");

        assert!(err.is_retryable());
        assert!(matches!(err, GatewayError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn balance_credit_is_negative() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/customers/cus_9/balance_transactions")
                .header("idempotency-key", "route_r1_order_o1_depositcredit")
                .body_contains("amount=-2500");
            then.status(200).json_body(json!({ "id": "cbtxn_1" }));
        });

        gateway(&server)
            .credit_customer_balance(&BalanceCredit {
                customer_id: "cus_9".to_string(),
                amount_cents: 2500,
                description: "deposit credit".to_string(),
                idempotency_key: "route_r1_order_o1_depositcredit".to_string(),
            })
            .await
            .expect("credit applied");

        mock.assert();
    }

    #[tokio::test]
    async fn trial_end_is_sent_as_unix_seconds() {
        let server = MockServer::start();
        let trial_end = Utc
            .with_ymd_and_hms(2026, 4, 6, 15, 0, 0)
            .single()
            .expect("valid timestamp");
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/subscriptions/sub_7")
                .body_contains(&format!("trial_end={}", trial_end.timestamp()));
            then.status(200).json_body(json!({ "id": "sub_7" }));
        });

        gateway(&server)
            .set_trial_end(&TrialEndUpdate {
                subscription_id: "sub_7".to_string(),
                trial_end,
                idempotency_key: "route_r1_sub_sub_7_trialend_2026-04-06".to_string(),
            })
            .await
            .expect("trial end set");

        mock.assert();
    }

    #[tokio::test]
    async fn immediate_cancel_deletes_subscription() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE).path("/v1/subscriptions/sub_7");
            then.status(200).json_body(json!({ "id": "sub_7", "status": "canceled" }));
        });

        gateway(&server)
            .cancel_subscription("sub_7", CancelTiming::Immediately)
            .await
            .expect("cancelled");

        mock.assert();
    }
}
