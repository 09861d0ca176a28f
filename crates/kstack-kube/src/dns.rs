//! Cloudflare DNS records
//!
//! Records point the stack's hostnames at the gateway's load balancer. They are matched by
//! exact name and type, so repeated deploys converge instead of piling up duplicates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{KubeError, Result};

pub const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";

/// A DNS record as exchanged with the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    /// Seconds; 1 means automatic
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

fn default_ttl() -> u32 {
    1
}

impl DnsRecord {
    /// `A` record with automatic TTL, not proxied
    pub fn a(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: None,
            record_type: "A".to_string(),
            name: name.into(),
            content: ip.into(),
            ttl: default_ttl(),
            proxied: false,
        }
    }

    fn same_target(&self, other: &DnsRecord) -> bool {
        self.content == other.content && self.ttl == other.ttl && self.proxied == other.proxied
    }
}

/// What [`CloudflareClient::upsert_record`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>> {
        if self.success {
            return Ok(self.result);
        }
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect();
        Err(KubeError::Dns(messages.join(", ")))
    }
}

/// DNS records of one Cloudflare zone
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    zone_id: String,
}

impl CloudflareClient {
    pub fn new(token: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: CLOUDFLARE_API.to_string(),
            token: token.into(),
            zone_id: zone_id.into(),
        }
    }

    /// Point the client at another API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Option<T>> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            KubeError::Dns(format!("unexpected response (HTTP {}): {}", status, e))
        })?;
        envelope.into_result()
    }

    /// The record with exactly this name and type
    pub async fn find_record(&self, name: &str, record_type: &str) -> Result<Option<DnsRecord>> {
        let request = self
            .http
            .get(self.records_url())
            .query(&[("name", name), ("type", record_type)]);
        let records: Vec<DnsRecord> = self.send(request).await?.unwrap_or_default();
        Ok(records
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type))
    }

    /// Create the record, or update it when its target differs
    pub async fn upsert_record(&self, record: &DnsRecord) -> Result<UpsertOutcome> {
        match self.find_record(&record.name, &record.record_type).await? {
            Some(existing) if existing.same_target(record) => {
                debug!(name = %record.name, "DNS record up to date");
                Ok(UpsertOutcome::Unchanged)
            }
            Some(existing) => {
                let id = existing.id.ok_or_else(|| {
                    KubeError::Dns(format!("record {} has no id", record.name))
                })?;
                info!(name = %record.name, content = %record.content, "updating DNS record");
                let request = self
                    .http
                    .put(format!("{}/{}", self.records_url(), id))
                    .json(record);
                self.send::<DnsRecord>(request).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                info!(name = %record.name, content = %record.content, "creating DNS record");
                let request = self.http.post(self.records_url()).json(record);
                self.send::<DnsRecord>(request).await?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Delete the record if present; returns whether something was deleted
    pub async fn delete_record(&self, name: &str, record_type: &str) -> Result<bool> {
        let Some(existing) = self.find_record(name, record_type).await? else {
            return Ok(false);
        };
        let id = existing
            .id
            .ok_or_else(|| KubeError::Dns(format!("record {} has no id", name)))?;

        info!(name, "deleting DNS record");
        let request = self.http.delete(format!("{}/{}", self.records_url(), id));
        self.send::<serde_json::Value>(request).await?;
        Ok(true)
    }
}
