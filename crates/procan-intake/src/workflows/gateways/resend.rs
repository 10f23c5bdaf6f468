use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ensure_success, send_error};
use crate::config::EmailConfig;
use crate::workflows::collaborators::{GatewayError, Notifier, OutboundEmail};

const SERVICE: &str = "resend";

/// Transactional email over the provider's JSON API. Messages are plain text.
pub struct ResendNotifier {
    client: Client,
    api_key: String,
    api_base: String,
    from: String,
}

impl ResendNotifier {
    pub fn new(client: Client, config: &EmailConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), GatewayError> {
        if email.to.is_empty() {
            return Ok(());
        }
        let payload = json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "text": email.text,
        });
        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::workflows::gateways::http_client;

    fn notifier(server: &MockServer) -> ResendNotifier {
        let config = EmailConfig {
            api_key: "re_test".to_string(),
            api_base: server.base_url(),
            from: "ProCan <orders@example.com>".to_string(),
            notify_to: None,
        };
        ResendNotifier::new(http_client(Duration::from_secs(2)).expect("client"), &config)
    }

    #[tokio::test]
    async fn sends_plain_text_message() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/emails")
                .header("authorization", "Bearer re_test")
                .json_body(json!({
                    "from": "ProCan <orders@example.com>",
                    "to": ["sam@example.com"],
                    "subject": "Order confirmed",
                    "text": "Thanks!"
                }));
            then.status(200).json_body(json!({ "id": "em_1" }));
        });

        notifier(&server)
            .send(&OutboundEmail {
                to: vec!["sam@example.com".to_string()],
                subject: "Order confirmed".to_string(),
                text: "Thanks!".to_string(),
            })
            .await
            .expect("email sent");

        mock.assert();
    }

    #[tokio::test]
    async fn empty_recipient_list_is_a_no_op() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/emails");
            then.status(500);
        });

        notifier(&server)
            .send(&OutboundEmail {
                to: Vec::new(),
                subject: "unused".to_string(),
                text: String::new(),
            })
            .await
            .expect("nothing to send");

        mock.assert_hits(0);
    }
}
