//! DNS provider port and adapters.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ProviderError;

/// A DNS zone as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(rename = "id")]
    pub zone_id: String,
    pub name: String,
}

/// A DNS record as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "id")]
    pub record_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

/// Record lookup filter (exact name + type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub name: String,
    pub record_type: String,
}

/// Parameters for record creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRecordParams {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// DNS provider port.
#[async_trait::async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zones whose name matches `domain`.
    async fn list_zones(&self, domain: &str) -> Result<Vec<Zone>, ProviderError>;

    /// Records in a zone matching the filter.
    async fn list_records(
        &self,
        zone_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<DnsRecord>, ProviderError>;

    async fn create_record(
        &self,
        zone_id: &str,
        params: &CreateRecordParams,
    ) -> Result<DnsRecord, ProviderError>;

    /// Delete a record. Deleting an absent record is
    /// [`ProviderError::NotFound`]; compensation callers treat that as
    /// "nothing to undo".
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self) -> Result<T, ProviderError> {
        if !self.success {
            let message = self
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProviderError::InvalidRequest(message));
        }
        self.result
            .ok_or_else(|| ProviderError::InvalidRequest("empty result".into()))
    }
}

/// Production adapter: a registrar/CDN-style JSON API
/// (`/zones`, `/zones/{id}/dns_records`), bearer-token auth.
pub struct ApiDnsProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl ApiDnsProvider {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait::async_trait]
impl DnsProvider for ApiDnsProvider {
    async fn list_zones(&self, domain: &str) -> Result<Vec<Zone>, ProviderError> {
        let envelope: ApiEnvelope<Vec<Zone>> = self
            .client
            .get(format!("{}/zones", self.base_url))
            .bearer_auth(&self.api_token)
            .query(&[("name", domain)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    async fn list_records(
        &self,
        zone_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        let envelope: ApiEnvelope<Vec<DnsRecord>> = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .bearer_auth(&self.api_token)
            .query(&[("name", filter.name.as_str()), ("type", filter.record_type.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    async fn create_record(
        &self,
        zone_id: &str,
        params: &CreateRecordParams,
    ) -> Result<DnsRecord, ProviderError> {
        let envelope: ApiEnvelope<DnsRecord> = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .bearer_auth(&self.api_token)
            .json(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, zone_id, record_id
            ))
            .bearer_auth(&self.api_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-memory deterministic mock with failure injection.
#[derive(Default)]
pub struct MockDnsProvider {
    zones: RwLock<Vec<Zone>>,
    records: RwLock<Vec<(String, DnsRecord)>>,
    next_record_id: AtomicU64,
    fail_creates: RwLock<Option<String>>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(self, zone_id: &str, name: &str) -> Self {
        self.zones.write().push(Zone {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Make all subsequent creates fail with a network error.
    pub fn fail_creates(&self, reason: &str) {
        *self.fail_creates.write() = Some(reason.to_string());
    }

    /// Records currently present in a zone.
    pub fn records_in_zone(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.records
            .read()
            .iter()
            .filter(|(z, _)| z == zone_id)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_zones(&self, domain: &str) -> Result<Vec<Zone>, ProviderError> {
        Ok(self
            .zones
            .read()
            .iter()
            .filter(|z| z.name == domain)
            .cloned()
            .collect())
    }

    async fn list_records(
        &self,
        zone_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(z, r)| {
                z == zone_id && r.name == filter.name && r.record_type == filter.record_type
            })
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_record(
        &self,
        zone_id: &str,
        params: &CreateRecordParams,
    ) -> Result<DnsRecord, ProviderError> {
        if let Some(reason) = self.fail_creates.read().clone() {
            return Err(ProviderError::Network(reason));
        }
        let record = DnsRecord {
            record_id: format!("rec-{}", self.next_record_id.fetch_add(1, Ordering::SeqCst)),
            name: params.name.clone(),
            record_type: params.record_type.clone(),
            content: params.content.clone(),
            proxied: params.proxied,
        };
        self.records
            .write()
            .push((zone_id.to_string(), record.clone()));
        Ok(record)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ProviderError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|(z, r)| !(z == zone_id && r.record_id == record_id));
        if records.len() == before {
            return Err(ProviderError::NotFound(format!(
                "record {record_id} in zone {zone_id}"
            )));
        }
        Ok(())
    }
}

/// Logging-only adapter for credential-less local runs. Every call succeeds
/// with synthetic identifiers.
#[derive(Default)]
pub struct LoggingDnsProvider;

#[async_trait::async_trait]
impl DnsProvider for LoggingDnsProvider {
    async fn list_zones(&self, domain: &str) -> Result<Vec<Zone>, ProviderError> {
        info!(domain, "dns: list_zones");
        Ok(vec![Zone {
            zone_id: "zone-log".into(),
            name: domain.to_string(),
        }])
    }

    async fn list_records(
        &self,
        zone_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        info!(zone_id, name = %filter.name, "dns: list_records");
        Ok(Vec::new())
    }

    async fn create_record(
        &self,
        zone_id: &str,
        params: &CreateRecordParams,
    ) -> Result<DnsRecord, ProviderError> {
        info!(zone_id, name = %params.name, content = %params.content, "dns: create_record");
        Ok(DnsRecord {
            record_id: "rec-log".into(),
            name: params.name.clone(),
            record_type: params.record_type.clone(),
            content: params.content.clone(),
            proxied: params.proxied,
        })
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), ProviderError> {
        info!(zone_id, record_id, "dns: delete_record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn mock_delete_of_absent_record_is_not_found() {
        let provider = MockDnsProvider::new().with_zone("z1", "example-platform.com");
        let err = provider.delete_record("z1", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn mock_create_then_list_then_delete() {
        let provider = MockDnsProvider::new().with_zone("z1", "example-platform.com");
        let created = provider
            .create_record(
                "z1",
                &CreateRecordParams {
                    name: "acme.example-platform.com".into(),
                    record_type: "A".into(),
                    content: "203.0.113.10".into(),
                    ttl: 300,
                    proxied: true,
                },
            )
            .await
            .unwrap();

        let found = provider
            .list_records(
                "z1",
                &RecordFilter {
                    name: "acme.example-platform.com".into(),
                    record_type: "A".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(found, vec![created.clone()]);

        provider.delete_record("z1", &created.record_id).await.unwrap();
        assert!(provider.records_in_zone("z1").is_empty());
    }

    #[tokio::test]
    async fn api_provider_lists_zones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example-platform.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [{ "id": "z1", "name": "example-platform.com" }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let provider = ApiDnsProvider::new(server.uri(), "token");
        let zones = provider.list_zones("example-platform.com").await.unwrap();
        assert_eq!(zones[0].zone_id, "z1");
    }

    #[tokio::test]
    async fn api_provider_creates_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/zones/z1/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {
                    "id": "r9",
                    "name": "acme.example-platform.com",
                    "type": "A",
                    "content": "203.0.113.10",
                    "proxied": true
                },
                "errors": []
            })))
            .mount(&server)
            .await;

        let provider = ApiDnsProvider::new(server.uri(), "token");
        let record = provider
            .create_record(
                "z1",
                &CreateRecordParams {
                    name: "acme.example-platform.com".into(),
                    record_type: "A".into(),
                    content: "203.0.113.10".into(),
                    ttl: 300,
                    proxied: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(record.record_id, "r9");
    }

    #[tokio::test]
    async fn api_provider_classifies_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = ApiDnsProvider::new(server.uri(), "bad-token");
        let err = provider.list_zones("example-platform.com").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn api_provider_surfaces_envelope_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "result": null,
                "errors": [{ "message": "invalid zone filter" }]
            })))
            .mount(&server)
            .await;

        let provider = ApiDnsProvider::new(server.uri(), "token");
        let err = provider.list_zones("example-platform.com").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
