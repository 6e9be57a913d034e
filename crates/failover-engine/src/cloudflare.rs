//! Cloudflare DNS provider.

use crate::error::DnsError;
use crate::switcher::DnsProvider;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

/// Cloudflare v4 API base URL
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Zone name for a domain: its last two labels
pub fn root_domain(domain: &str) -> &str {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    match domain.rmatch_indices('.').nth(1) {
        Some((idx, _)) => &domain[idx + 1..],
        None => domain,
    }
}

/// Record type for the content being written
pub fn record_type_for(content: &str) -> &'static str {
    match content.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => "A",
        Ok(IpAddr::V6(_)) => "AAAA",
        Err(_) => "CNAME",
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    pub ttl: u32,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    proxied: bool,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

/// [`DnsProvider`] backed by the Cloudflare REST API
pub struct CloudflareProvider {
    client: reqwest::Client,
    api_base: String,
    api_token: String,
    zone_ids: Mutex<HashMap<String, String>>,
}

impl CloudflareProvider {
    pub fn new(
        api_token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DnsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            zone_ids: Mutex::new(HashMap::new()),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, DnsError> {
        let response = request.bearer_auth(&self.api_token).send().await?;
        let envelope: Envelope<T> = response.json().await?;

        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DnsError::Api(if detail.is_empty() {
                "request unsuccessful".to_string()
            } else {
                detail
            }));
        }

        envelope
            .result
            .ok_or_else(|| DnsError::Api("response carried no result".to_string()))
    }

    /// Check that the API token is active
    pub async fn verify_token(&self) -> Result<(), DnsError> {
        let url = format!("{}/user/tokens/verify", self.api_base);
        let token: TokenStatus = self.send(self.client.get(url)).await?;
        if token.status != "active" {
            return Err(DnsError::InactiveToken(token.status));
        }
        info!("Cloudflare API token verified");
        Ok(())
    }

    async fn zone_id(&self, domain: &str) -> Result<String, DnsError> {
        let zone = root_domain(domain);
        if let Some(id) = self.zone_ids.lock().get(zone) {
            return Ok(id.clone());
        }

        let url = format!("{}/zones", self.api_base);
        let zones: Vec<Zone> = self
            .send(self.client.get(url).query(&[("name", zone)]))
            .await?;
        let id = zones
            .into_iter()
            .next()
            .map(|z| z.id)
            .ok_or_else(|| DnsError::ZoneNotFound(zone.to_string()))?;

        debug!(zone = %zone, zone_id = %id, "Resolved Cloudflare zone");
        self.zone_ids.lock().insert(zone.to_string(), id.clone());
        Ok(id)
    }

    /// First record named exactly `domain`
    pub async fn get_record(&self, domain: &str) -> Result<(String, DnsRecord), DnsError> {
        let zone_id = self.zone_id(domain).await?;
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let records: Vec<DnsRecord> = self
            .send(self.client.get(url).query(&[("name", domain)]))
            .await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| DnsError::RecordNotFound(domain.to_string()))?;
        Ok((zone_id, record))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn get_current_target(&self, domain: &str) -> Result<String, DnsError> {
        let (_, record) = self.get_record(domain).await?;
        Ok(record.content)
    }

    async fn update_record(&self, domain: &str, address: &str) -> Result<(), DnsError> {
        let (zone_id, record) = self.get_record(domain).await?;
        let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);
        let update = RecordUpdate {
            record_type: record_type_for(address),
            name: domain,
            content: address,
            proxied: record.proxied,
            ttl: record.ttl,
        };

        let _: DnsRecord = self.send(self.client.put(url).json(&update)).await?;
        info!(domain = %domain, record_type = update.record_type, content = %address, "Cloudflare record updated");
        Ok(())
    }
}
