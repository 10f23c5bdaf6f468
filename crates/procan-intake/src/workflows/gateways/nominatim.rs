use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{decode_json, send_error};
use crate::config::GeocoderConfig;
use crate::workflows::collaborators::{GatewayError, GeoPoint, Geocoder};

const SERVICE: &str = "nominatim";

/// OpenStreetMap search proxy. The upstream usage policy asks for an identifying user agent.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl SearchHit {
    fn into_point(self) -> Option<GeoPoint> {
        Some(GeoPoint {
            lat: self.lat.trim().parse().ok()?,
            lon: self.lon.trim().parse().ok()?,
            kind: self.kind.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
        })
    }
}

impl NominatimGeocoder {
    pub fn new(client: Client, config: &GeocoderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeoPoint>, GatewayError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
                ("countrycodes", "us"),
            ])
            .send()
            .await
            .map_err(send_error(SERVICE))?;
        let hits: Vec<SearchHit> = decode_json(SERVICE, response).await?;
        Ok(hits.into_iter().filter_map(SearchHit::into_point).collect())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn best_match(&self, query: &str) -> Result<Option<GeoPoint>, GatewayError> {
        Ok(self.search(query, 1).await?.into_iter().next())
    }

    async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<GeoPoint>, GatewayError> {
        self.search(query, limit).await
    }
}
