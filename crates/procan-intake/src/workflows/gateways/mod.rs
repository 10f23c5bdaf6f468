//! HTTP adapters for the payment processor, data store, geocoder, and email provider.

pub mod nominatim;
pub mod resend;
pub mod stripe;
pub mod supabase;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::collaborators::GatewayError;

pub use nominatim::NominatimGeocoder;
pub use resend::ResendNotifier;
pub use stripe::StripeGateway;
pub use supabase::SupabaseStore;

/// Shared client for every outbound call; `timeout` bounds each request end to end.
pub fn http_client(timeout: Duration) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| GatewayError::transport("http client", error))
}

/// Turn a non-2xx response into [`GatewayError::Rejected`], decoding the body otherwise.
pub(crate) async fn decode_json<T>(service: &'static str, response: Response) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    let response = ensure_success(service, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|error| GatewayError::decode(service, error))
}

pub(crate) async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(service, status = status.as_u16(), "upstream rejected request");
    Err(GatewayError::Rejected {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn send_error(service: &'static str) -> impl Fn(reqwest::Error) -> GatewayError {
    move |error| GatewayError::transport(service, error)
}
