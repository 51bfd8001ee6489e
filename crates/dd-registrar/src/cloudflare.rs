/// Cloudflare Registrar API client.
///
/// Uses the Cloudflare v4 REST API. Registrar endpoints live under the
/// account; DNS lives under the zone, so DNS calls first resolve the zone id
/// from the domain name. Cloudflare does not sell registrations or renewals
/// through the API (it renews automatically at cost), so those operations are
/// reported as unsupported.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

use crate::dns_sync::{self, RecordBackend, RemoteRecord};
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{conclude, require_domain, RegistrarClient};

const CLOUDFLARE_API: Endpoint = Endpoint::single("https://api.cloudflare.com/client/v4");
const PROVIDER: RegistrarProvider = RegistrarProvider::Cloudflare;

pub struct CloudflareRegistrarClient {
    http: HttpContext,
    api_key: String,
    email: Option<String>,
    account_id: Option<String>,
}

impl CloudflareRegistrarClient {
    pub fn new(api_key: &str, email: Option<&str>, account_id: Option<&str>, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(CLOUDFLARE_API.live, options),
            api_key: api_key.to_string(),
            email: email.map(|s| s.to_string()),
            account_id: account_id.map(|s| s.to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        if let Some(email) = &self.email {
            req.header("X-Auth-Email", email)
                .header("X-Auth-Key", &self.api_key)
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    /// One v4 call. Unwraps `result` or turns `errors[]` into a vendor error.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "cloudflare request");
        let mut req = self.apply_auth(self.http.client.request(method, self.http.url(path)));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;

        if resp["success"].as_bool() == Some(true) {
            return Ok(resp["result"].clone());
        }
        let errors: Vec<&Value> = resp["errors"].as_array().map(|a| a.iter().collect()).unwrap_or_default();
        match errors.first() {
            Some(first) => Err(RegistrarError::vendor_with_details(
                first["code"].as_i64().map(|c| c.to_string()),
                first["message"].as_str().unwrap_or("Unknown Cloudflare error"),
                errors.iter().filter_map(|e| e["message"].as_str().map(String::from)).collect(),
            )),
            None if status.is_success() => Err(RegistrarError::MalformedResponse(
                "Cloudflare reply carried neither success nor errors".into(),
            )),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    async fn resolve_account_id(&self) -> Result<String, RegistrarError> {
        if let Some(ref id) = self.account_id {
            return Ok(id.clone());
        }
        let result = self.call(Method::GET, "/accounts?per_page=1", None).await?;
        result.as_array()
            .and_then(|arr| arr.first())
            .and_then(|a| a["id"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RegistrarError::vendor(None, "Failed to resolve Cloudflare account ID"))
    }

    async fn registrar_path(&self, domain: &str) -> Result<String, RegistrarError> {
        let account_id = self.resolve_account_id().await?;
        Ok(format!("/accounts/{}/registrar/domains/{}", account_id, domain))
    }

    /// Resolve the zone once for a batch of record operations.
    async fn scope(&self, domain: &str) -> Result<ZoneScope<'_>, RegistrarError> {
        require_domain(domain)?;
        let zone_id = self.zone_id(domain).await?;
        Ok(ZoneScope { client: self, zone_id })
    }

    async fn zone_id(&self, domain: &str) -> Result<String, RegistrarError> {
        let result = self.call(Method::GET, &format!("/zones?name={}", domain), None).await?;
        result.as_array()
            .and_then(|arr| arr.first())
            .and_then(|z| z["id"].as_str())
            .map(String::from)
            .ok_or_else(|| {
                RegistrarError::vendor(Some("ZONE_NOT_FOUND".into()), format!("No Cloudflare zone for {}", domain))
            })
    }

    fn parse_domain(d: &Value) -> DomainInfo {
        let mut info = DomainInfo::new(
            d["name"].as_str().unwrap_or(""),
            DomainStatus::from_vendor(d["status"].as_str().unwrap_or("unknown")),
        );
        info.registration_date = d["created_at"].as_str().and_then(parse_timestamp);
        info.expiration_date = d["expires_at"].as_str().and_then(parse_timestamp);
        info.updated_date = d["updated_at"].as_str().and_then(parse_timestamp);
        info.auto_renew = d["auto_renew"].as_bool().unwrap_or(false);
        info.registrar_lock = d["locked"].as_bool().unwrap_or(false);
        info.privacy_protection = d["privacy"].as_bool().unwrap_or(false);
        info.nameservers = transport::str_array(&d["name_servers"]);
        info
    }

    /// Cloudflare returns FQDN record names; the neutral model uses `@` and
    /// labels relative to the zone.
    fn relative_name(name: &str, domain: &str) -> String {
        if name.eq_ignore_ascii_case(domain) {
            return "@".to_string();
        }
        let suffix = format!(".{}", domain);
        match name.strip_suffix(&suffix) {
            Some(label) => label.to_string(),
            None => name.to_string(),
        }
    }

    fn absolute_name(name: &str, domain: &str) -> String {
        if name == "@" || name.is_empty() {
            domain.to_string()
        } else if name.ends_with(domain) {
            name.to_string()
        } else {
            format!("{}.{}", name, domain)
        }
    }

    fn record_body(record: &DnsRecordModel, domain: &str) -> Value {
        let mut body = json!({
            "type": record.record_type,
            "name": Self::absolute_name(&record.name, domain),
            "content": record.value,
            "ttl": record.ttl,
        });
        if let Some(priority) = record.priority {
            body["priority"] = json!(priority);
        }
        body
    }

    fn parse_record(r: &Value, domain: &str) -> Option<RemoteRecord> {
        let handle = r["id"].as_str()?.to_string();
        let mut record = DnsRecordModel::new(
            &Self::relative_name(r["name"].as_str().unwrap_or(""), domain),
            r["type"].as_str().unwrap_or(""),
            r["content"].as_str().unwrap_or(""),
            r["ttl"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(1),
        );
        record.priority = r["priority"].as_u64().and_then(|p| u16::try_from(p).ok());
        Some(RemoteRecord { handle, record })
    }

    async fn set_registrar_flag(&self, domain: &str, flag: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let path = self.registrar_path(domain).await?;
        self.call(Method::PUT, &path, Some(json!({ flag: enable }))).await?;
        Ok(DomainChange::new(domain))
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let path = self.registrar_path(domain).await?;
        let d = self.call(Method::GET, &path, None).await?;
        let mut result = Availability::new(domain, d["available"].as_bool().unwrap_or(false) && d["can_register"].as_bool().unwrap_or(true));
        result.is_tld_supported = d["supported_tld"].as_bool().unwrap_or(true);
        Ok(result)
    }

    async fn zone(&self, domain: &str) -> Result<DnsZone, RegistrarError> {
        let records = self.scope(domain).await?.list_records(domain).await?;
        Ok(DnsZone {
            domain_name: domain.to_string(),
            records: records.into_iter().map(|r| r.record).collect(),
            nameservers: None,
        })
    }

    async fn add_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        dns_sync::add_one(&self.scope(domain).await?, domain, record).await
    }

    async fn update_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        dns_sync::update_one(&self.scope(domain).await?, domain, record).await
    }

    async fn delete_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        dns_sync::delete_one(&self.scope(domain).await?, domain, record).await
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let path = self.registrar_path(domain).await?;
        let d = self.call(Method::GET, &path, None).await?;
        let mut info = Self::parse_domain(&d);
        if info.domain_name.is_empty() {
            info.domain_name = domain.to_string();
        }
        Ok(info)
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let account_id = self.resolve_account_id().await?;
        let result = self
            .call(Method::GET, &format!("/accounts/{}/registrar/domains", account_id), None)
            .await?;
        Ok(result.as_array()
            .map(|arr| arr.iter().map(|d| Self::parse_domain(d).into()).collect())
            .unwrap_or_default())
    }
}

/// Record operations against one resolved zone.
struct ZoneScope<'a> {
    client: &'a CloudflareRegistrarClient,
    zone_id: String,
}

#[async_trait]
impl RecordBackend for ZoneScope<'_> {
    async fn list_records(&self, domain: &str) -> Result<Vec<RemoteRecord>, RegistrarError> {
        let zone = &self.zone_id;
        let result = self
            .client
            .call(Method::GET, &format!("/zones/{}/dns_records?per_page=500", zone), None)
            .await?;
        Ok(result.as_array()
            .map(|arr| arr.iter().filter_map(|r| CloudflareRegistrarClient::parse_record(r, domain)).collect())
            .unwrap_or_default())
    }

    async fn create_record(&self, domain: &str, record: &DnsRecordModel) -> Result<Option<u64>, RegistrarError> {
        let zone = &self.zone_id;
        self.client.call(
            Method::POST,
            &format!("/zones/{}/dns_records", zone),
            Some(CloudflareRegistrarClient::record_body(record, domain)),
        )
        .await?;
        // Cloudflare ids are hex strings.
        Ok(None)
    }

    async fn modify_record(&self, domain: &str, existing: &RemoteRecord, desired: &DnsRecordModel) -> Result<(), RegistrarError> {
        let zone = &self.zone_id;
        self.client.call(
            Method::PUT,
            &format!("/zones/{}/dns_records/{}", zone, existing.handle),
            Some(CloudflareRegistrarClient::record_body(desired, domain)),
        )
        .await
        .map(|_| ())
    }

    async fn remove_record(&self, domain: &str, existing: &RemoteRecord) -> Result<(), RegistrarError> {
        let zone = &self.zone_id;
        self.client.call(Method::DELETE, &format!("/zones/{}/dns_records/{}", zone, existing.handle), None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RegistrarClient for CloudflareRegistrarClient {
    fn provider(&self) -> RegistrarProvider {
        PROVIDER
    }

    async fn check_availability(&self, domain: &str) -> DomainAvailabilityResult {
        conclude(PROVIDER, "check_availability", domain, self.availability(domain).await, |a| {
            if a.is_available { format!("{} is available", domain) } else { format!("{} is not available", domain) }
        })
    }

    async fn register_domain(&self, request: &DomainRegistrationRequest) -> DomainRegistrationResult {
        conclude(
            PROVIDER,
            "register_domain",
            &request.domain_name,
            Err(RegistrarError::Unsupported(
                "Cloudflare Registrar does not accept registrations over the API; register in the Cloudflare dashboard instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(
            PROVIDER,
            "renew_domain",
            &request.domain_name,
            Err(RegistrarError::Unsupported(
                "Cloudflare renews domains automatically; use set_auto_renew instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        conclude(
            PROVIDER,
            "transfer_domain",
            &request.domain_name,
            Err(RegistrarError::Unsupported(
                "Cloudflare transfers-in must be started from the Cloudflare dashboard instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        conclude(PROVIDER, "get_dns_zone", domain, self.zone(domain).await, |z| {
            format!("{} DNS records", z.records.len())
        })
    }

    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult {
        match self.scope(domain).await {
            Ok(scope) => dns_sync::replace_zone(&scope, domain, &zone.records).await,
            Err(err) => conclude(PROVIDER, "update_dns_zone", domain, Err(err), |_| String::new()),
        }
    }

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, self.add_record(domain, record).await, |_| {
            format!("Added {}", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, self.update_record(domain, record).await, |_| {
            format!("Updated {}", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, self.delete_record(domain, record).await, |_| {
            format!("Deleted {}", record.describe())
        })
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, _nameservers: &[String]) -> DomainUpdateResult {
        conclude(
            PROVIDER,
            "update_nameservers",
            domain,
            Err(RegistrarError::Unsupported(
                "Cloudflare Registrar domains must use Cloudflare nameservers; manage DNS records instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_privacy_protection", domain, self.set_registrar_flag(domain, "privacy", enable).await, |_| {
            format!("WHOIS privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_auto_renew", domain, self.set_registrar_flag(domain, "auto_renew", enable).await, |_| {
            format!("Auto-renew {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn get_supported_tlds(&self, _filter: Option<&[String]>) -> TldListResult {
        conclude(
            PROVIDER,
            "get_supported_tlds",
            "",
            Err(RegistrarError::Unsupported(
                "Cloudflare does not publish its TLD list over the API; use check_availability, which reports TLD support, instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        conclude(PROVIDER, "get_registered_domains", "", self.list_domains().await, |d| {
            format!("{} domains", d.len())
        })
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        let result = self.resolve_account_id().await.map(|id| DomainChange::new(&id));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, MockReply, MockServer};

    fn ok(result: Value) -> MockReply {
        MockReply::json(200, json!({ "success": true, "errors": [], "result": result }))
    }

    fn client(server: &MockServer) -> CloudflareRegistrarClient {
        CloudflareRegistrarClient::new("token", None, Some("acc1"), &options()).with_base_url(&server.base())
    }

    #[tokio::test]
    async fn availability_reads_registrar_domain() {
        let server = MockServer::start(|req| {
            assert_eq!(req.path, "/accounts/acc1/registrar/domains/fresh.dev");
            assert_eq!(req.header("authorization"), Some("Bearer token"));
            ok(json!({ "name": "fresh.dev", "available": true, "can_register": true, "supported_tld": true }))
        })
        .await;
        let env = client(&server).check_availability("fresh.dev").await;
        assert!(env.is_success());
        assert!(env.data().unwrap().is_available);
    }

    #[tokio::test]
    async fn api_errors_become_vendor_failures() {
        let server = MockServer::start(|_| {
            MockReply::json(403, json!({
                "success": false,
                "errors": [{ "code": 10000, "message": "Authentication error" }],
                "result": null
            }))
        })
        .await;
        let env = client(&server).get_domain_info("example.com").await;
        assert!(!env.is_success());
        assert_eq!(env.error_code(), Some("10000"));
        assert_eq!(env.errors(), &["Authentication error".to_string()]);
    }

    #[tokio::test]
    async fn registration_is_unsupported_without_io() {
        let server = MockServer::start(|_| ok(json!(null))).await;
        let request = crate::test_support::registration("example.com", 1);
        let env = client(&server).register_domain(&request).await;
        assert_eq!(env.error_code(), Some(crate::error::codes::UNSUPPORTED_OPERATION));
        assert!(env.message().contains("instead"));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn record_update_addresses_record_by_hex_id() {
        let server = MockServer::start(|req| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/zones") => ok(json!([{ "id": "zone9" }])),
            ("GET", "/zones/zone9/dns_records") => ok(json!([
                { "id": "abc123", "type": "A", "name": "www.example.com", "content": "192.0.2.1", "ttl": 300 },
                { "id": "def456", "type": "A", "name": "example.com", "content": "192.0.2.2", "ttl": 300 }
            ])),
            ("PUT", "/zones/zone9/dns_records/abc123") => {
                assert_eq!(req.json()["name"], "www.example.com");
                assert_eq!(req.json()["content"], "192.0.2.50");
                ok(json!({ "id": "abc123" }))
            }
            other => panic!("unexpected request {:?}", other),
        })
        .await;
        let record = DnsRecordModel::new("www", "A", "192.0.2.50", 300);
        let env = client(&server).update_dns_record("example.com", &record).await;
        assert!(env.is_success(), "{:?}", env);
    }

    #[tokio::test]
    async fn zone_replacement_resolves_the_zone_once() {
        let server = MockServer::start(|req| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/zones") => ok(json!([{ "id": "zone9" }])),
            ("GET", "/zones/zone9/dns_records") => ok(json!([
                { "id": "a1", "type": "A", "name": "example.com", "content": "192.0.2.1", "ttl": 300 },
                { "id": "t1", "type": "TXT", "name": "old.example.com", "content": "stale", "ttl": 300 }
            ])),
            ("PUT", _) | ("POST", _) | ("DELETE", _) => ok(json!({ "id": "x" })),
            other => panic!("unexpected request {:?}", other),
        })
        .await;
        let zone = DnsZone {
            domain_name: "example.com".into(),
            records: vec![
                DnsRecordModel::new("@", "A", "192.0.2.9", 300),
                DnsRecordModel::new("www", "CNAME", "example.com", 300),
            ],
            nameservers: None,
        };
        let env = client(&server).update_dns_zone("example.com", &zone).await;
        assert!(env.is_success(), "{:?}", env);
        assert_eq!(env.data().unwrap().applied, 4);
        let lookups = server.requests().iter().filter(|r| r.path == "/zones").count();
        assert_eq!(lookups, 1);
    }

    #[test]
    fn oversized_numbers_are_dropped_not_truncated() {
        let record = json!({ "id": "r1", "type": "MX", "name": "example.com", "content": "mx", "ttl": 4294967296u64, "priority": 65536 });
        let parsed = CloudflareRegistrarClient::parse_record(&record, "example.com").unwrap();
        assert_eq!(parsed.record.ttl, 1);
        assert_eq!(parsed.record.priority, None);
    }

    #[tokio::test]
    async fn zone_uses_relative_names() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/zones" => ok(json!([{ "id": "z" }])),
            _ => ok(json!([
                { "id": "1", "type": "MX", "name": "example.com", "content": "mx.example.net", "ttl": 3600, "priority": 10 }
            ])),
        })
        .await;
        let env = client(&server).get_dns_zone("example.com").await;
        let zone = env.data().unwrap();
        assert_eq!(zone.records[0].name, "@");
        assert_eq!(zone.records[0].priority, Some(10));
    }
}
