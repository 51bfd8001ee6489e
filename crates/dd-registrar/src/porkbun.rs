/// Porkbun API client.
///
/// Porkbun uses a JSON REST API with `apikey` + `secretapikey` in the body
/// of every request. All endpoints are POST. Registrations use the contact
/// profile stored on the Porkbun account; the API has no per-domain contact
/// fields.
///
/// Reference: https://porkbun.com/api/json/v3/documentation

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dns_sync::{self, RecordBackend, RemoteRecord};
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{conclude, filter_tlds, require_domain, validate_registration, RegistrarClient};

const PORKBUN_API: Endpoint = Endpoint::single("https://api.porkbun.com/api/json/v3");
const PROVIDER: RegistrarProvider = RegistrarProvider::Porkbun;

pub struct PorkbunClient {
    http: HttpContext,
    api_key: String,
    secret_key: String,
}

impl PorkbunClient {
    pub fn new(api_key: &str, secret_key: &str, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(PORKBUN_API.live, options),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn auth_body(&self) -> Value {
        json!({
            "apikey": self.api_key,
            "secretapikey": self.secret_key
        })
    }

    /// POST `path` with the credentials merged into `extra`.
    async fn post(&self, path: &str, extra: Value) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, path, "porkbun request");
        let mut body = self.auth_body();
        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }
        let (status, resp) = transport::send_json(self.http.client.post(self.http.url(path)).json(&body)).await?;

        match resp["status"].as_str() {
            Some("SUCCESS") => Ok(resp),
            Some(_) => Err(RegistrarError::vendor(
                resp["code"].as_str().map(String::from),
                resp["message"].as_str().unwrap_or("Porkbun API error"),
            )),
            None if status.is_success() => Err(RegistrarError::MalformedResponse(
                "Porkbun reply has no status field".into(),
            )),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn parse_domain(d: &Value) -> DomainInfo {
        let mut info = DomainInfo::new(
            d["domain"].as_str().unwrap_or(""),
            DomainStatus::from_vendor(d["status"].as_str().unwrap_or("unknown")),
        );
        info.registration_date = transport::first_str(d, &["createDate", "create_date"]).and_then(parse_timestamp);
        info.expiration_date = transport::first_str(d, &["expireDate", "expire_date"]).and_then(parse_timestamp);
        info.auto_renew = transport::loose_bool(&d["autoRenew"]).unwrap_or(false);
        info.privacy_protection = transport::loose_bool(&d["whoisPrivacy"]).unwrap_or(false);
        info.registrar_lock = transport::loose_bool(&d["securityLock"]).unwrap_or(false);
        info.nameservers = transport::str_array(&d["nameservers"]);
        info
    }

    fn relative_name(name: &str, domain: &str) -> String {
        if name.eq_ignore_ascii_case(domain) {
            "@".to_string()
        } else {
            name.strip_suffix(&format!(".{}", domain)).unwrap_or(name).to_string()
        }
    }

    fn record_body(record: &DnsRecordModel) -> Value {
        let name = if record.name == "@" { "" } else { record.name.as_str() };
        json!({
            "name": name,
            "type": record.record_type,
            "content": record.value,
            "ttl": record.ttl.to_string(),
            "prio": record.priority.map(|p| p.to_string()).unwrap_or_default(),
        })
    }

    fn cents(price: f64) -> u64 {
        (price * 100.0).round() as u64
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self.post(&format!("/domain/checkDomain/{}", domain), json!({})).await?;
        let r = &resp["response"];
        let mut result = Availability::new(domain, transport::loose_bool(&r["avail"]).unwrap_or(false));
        result.is_premium = transport::loose_bool(&r["premium"]).unwrap_or(false);
        result.price = transport::loose_f64(&r["price"]);
        result.currency = Some("USD".to_string());
        Ok(result)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        if request.years != 1 {
            return Err(RegistrarError::Unsupported(
                "Porkbun registers for one year; register for 1 year and use set_auto_renew instead".into(),
            ));
        }
        let domain = &request.domain_name;

        // The create call must quote the exact price in pennies.
        let quote = self.availability(domain).await?;
        if !quote.is_available {
            return Err(RegistrarError::vendor(
                Some("DOMAIN_UNAVAILABLE".into()),
                format!("{} is not available", domain),
            ));
        }
        let price = quote.price.ok_or_else(|| {
            RegistrarError::MalformedResponse(format!("Porkbun returned no price for {}", domain))
        })?;

        let resp = self
            .post(
                &format!("/domain/create/{}", domain),
                json!({ "cost": Self::cents(price), "agreeToTerms": "yes" }),
            )
            .await?;

        if !request.nameservers.is_empty() {
            self.set_nameservers(domain, &request.nameservers).await?;
        }
        if !request.auto_renew {
            self.post(&format!("/domain/updateAutoRenew/{}", domain), json!({ "status": "off" })).await?;
        }

        let now = chrono::Utc::now();
        Ok(RegistrationReceipt {
            domain_name: domain.clone(),
            order_id: transport::first_str(&resp, &["orderId"])
                .map(String::from)
                .or_else(|| transport::loose_u64(&resp["orderId"]).map(|id| id.to_string())),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, 1)),
        })
    }

    async fn set_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.post(&format!("/domain/updateNs/{}", domain), json!({ "ns": nameservers })).await?;
        Ok(DomainChange::new(domain))
    }

    async fn auto_renew(&self, domain: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let status = if enable { "on" } else { "off" };
        self.post(&format!("/domain/updateAutoRenew/{}", domain), json!({ "status": status })).await?;
        Ok(DomainChange::new(domain))
    }

    async fn zone(&self, domain: &str) -> Result<DnsZone, RegistrarError> {
        require_domain(domain)?;
        let records = self.list_records(domain).await?;
        let ns = self.post(&format!("/domain/getNs/{}", domain), json!({})).await?;
        Ok(DnsZone {
            domain_name: domain.to_string(),
            records: records.into_iter().map(|r| r.record).collect(),
            nameservers: Some(transport::str_array(&ns["ns"])),
        })
    }

    async fn list_domains(&self) -> Result<Vec<DomainInfo>, RegistrarError> {
        let resp = self.post("/domain/listAll", json!({})).await?;
        Ok(resp["domains"].as_array()
            .map(|arr| arr.iter().map(Self::parse_domain).collect())
            .unwrap_or_default())
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        // Porkbun doesn't have a single-domain endpoint; list and filter
        let all = self.list_domains().await?;
        let mut info = all
            .into_iter()
            .find(|d| d.domain_name.eq_ignore_ascii_case(domain))
            .ok_or_else(|| {
                RegistrarError::vendor(
                    Some("DOMAIN_NOT_FOUND".into()),
                    format!("Domain {} not found in Porkbun account", domain),
                )
            })?;
        if info.nameservers.is_empty() {
            let ns = self.post(&format!("/domain/getNs/{}", domain), json!({})).await?;
            info.nameservers = transport::str_array(&ns["ns"]);
        }
        Ok(info)
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let resp = self.post("/pricing/get", json!({})).await?;
        let mut tlds: Vec<TldInfo> = resp["pricing"]
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(ext, p)| {
                        let mut tld = TldInfo::new(ext, "USD");
                        tld.registration_price = transport::loose_f64(&p["registration"]);
                        tld.renewal_price = transport::loose_f64(&p["renewal"]);
                        tld.transfer_price = transport::loose_f64(&p["transfer"]);
                        tld.supports_privacy = true;
                        tld
                    })
                    .collect()
            })
            .unwrap_or_default();
        tlds.sort_by(|a, b| a.extension.cmp(&b.extension));
        Ok(filter_tlds(tlds, filter))
    }
}

#[async_trait]
impl RecordBackend for PorkbunClient {
    async fn list_records(&self, domain: &str) -> Result<Vec<RemoteRecord>, RegistrarError> {
        let resp = self.post(&format!("/dns/retrieve/{}", domain), json!({})).await?;
        Ok(resp["records"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| {
                        let id = transport::loose_u64(&r["id"])?;
                        let mut record = DnsRecordModel::new(
                            &Self::relative_name(r["name"].as_str().unwrap_or(""), domain),
                            r["type"].as_str().unwrap_or(""),
                            r["content"].as_str().unwrap_or(""),
                            transport::loose_u64(&r["ttl"]).and_then(|v| u32::try_from(v).ok()).unwrap_or(600),
                        );
                        record.priority = transport::loose_u64(&r["prio"])
                            .filter(|p| *p > 0)
                            .and_then(|p| u16::try_from(p).ok());
                        Some(RemoteRecord::numeric(id, record))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_record(&self, domain: &str, record: &DnsRecordModel) -> Result<Option<u64>, RegistrarError> {
        let resp = self.post(&format!("/dns/create/{}", domain), Self::record_body(record)).await?;
        Ok(transport::loose_u64(&resp["id"]))
    }

    async fn modify_record(&self, domain: &str, existing: &RemoteRecord, desired: &DnsRecordModel) -> Result<(), RegistrarError> {
        self.post(&format!("/dns/edit/{}/{}", domain, existing.handle), Self::record_body(desired))
            .await
            .map(|_| ())
    }

    async fn remove_record(&self, domain: &str, existing: &RemoteRecord) -> Result<(), RegistrarError> {
        self.post(&format!("/dns/delete/{}/{}", domain, existing.handle), json!({}))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RegistrarClient for PorkbunClient {
    fn provider(&self) -> RegistrarProvider {
        PROVIDER
    }

    async fn check_availability(&self, domain: &str) -> DomainAvailabilityResult {
        conclude(PROVIDER, "check_availability", domain, self.availability(domain).await, |a| {
            if a.is_available { format!("{} is available", domain) } else { format!("{} is not available", domain) }
        })
    }

    async fn register_domain(&self, request: &DomainRegistrationRequest) -> DomainRegistrationResult {
        conclude(PROVIDER, "register_domain", &request.domain_name, self.register(request).await, |r| {
            format!("Registered {} using the Porkbun account contact profile", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(
            PROVIDER,
            "renew_domain",
            &request.domain_name,
            Err(RegistrarError::Unsupported(
                "Porkbun has no renewal endpoint; use set_auto_renew instead".into(),
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
                "Porkbun has no transfer endpoint; start the transfer from the Porkbun dashboard instead".into(),
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
        dns_sync::replace_zone(self, domain, &zone.records).await
    }

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, dns_sync::add_one(self, domain, record).await, |_| {
            format!("Added {}", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, dns_sync::update_one(self, domain, record).await, |_| {
            format!("Updated {}", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, dns_sync::delete_one(self, domain, record).await, |_| {
            format!("Deleted {}", record.describe())
        })
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        conclude(PROVIDER, "update_nameservers", domain, self.set_nameservers(domain, nameservers).await, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, _enable: bool) -> DomainUpdateResult {
        conclude(
            PROVIDER,
            "set_privacy_protection",
            domain,
            Err(RegistrarError::Unsupported(
                "Porkbun applies free WHOIS privacy to every domain and offers no API toggle; change it in the Porkbun dashboard instead".into(),
            )),
            |_| String::new(),
        )
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_auto_renew", domain, self.auto_renew(domain, enable).await, |_| {
            format!("Auto-renew {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn get_supported_tlds(&self, filter: Option<&[String]>) -> TldListResult {
        conclude(PROVIDER, "get_supported_tlds", "", self.tlds(filter).await, |t| {
            format!("{} TLDs", t.len())
        })
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        let result = self
            .list_domains()
            .await
            .map(|all| all.into_iter().map(RegisteredDomainInfo::from).collect::<Vec<_>>());
        conclude(PROVIDER, "get_registered_domains", "", result, |d| format!("{} domains", d.len()))
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        let result = self.post("/ping", json!({})).await.map(|resp| {
            DomainChange::new(resp["yourIp"].as_str().unwrap_or(""))
        });
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer) -> PorkbunClient {
        PorkbunClient::new("pk1", "sk1", &options()).with_base_url(&server.base())
    }

    fn success(extra: Value) -> MockReply {
        let mut body = json!({ "status": "SUCCESS" });
        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }
        MockReply::json(200, body)
    }

    #[tokio::test]
    async fn credentials_travel_in_the_body() {
        let server = MockServer::start(|req| {
            assert_eq!(req.json()["apikey"], "pk1");
            assert_eq!(req.json()["secretapikey"], "sk1");
            success(json!({ "response": { "avail": "yes", "price": "9.73", "premium": "no" } }))
        })
        .await;
        let env = client(&server).check_availability("fresh.com").await;
        let data = env.data().unwrap();
        assert!(data.is_available);
        assert_eq!(data.price, Some(9.73));
    }

    #[tokio::test]
    async fn registration_quotes_price_in_pennies() {
        let server = MockServer::start(|req| {
            if req.path.starts_with("/domain/checkDomain") {
                success(json!({ "response": { "avail": "yes", "price": "9.73" } }))
            } else if req.path.starts_with("/domain/create") {
                assert_eq!(req.json()["cost"], 973);
                assert_eq!(req.json()["agreeToTerms"], "yes");
                success(json!({ "orderId": 4242 }))
            } else {
                success(json!({}))
            }
        })
        .await;
        let env = client(&server).register_domain(&registration("fresh.com", 1)).await;
        assert!(env.is_success(), "{:?}", env);
        assert_eq!(env.data().unwrap().order_id.as_deref(), Some("4242"));
        assert!(server.requests().iter().any(|r| r.path == "/domain/updateNs/fresh.com"));
    }

    #[tokio::test]
    async fn error_status_keeps_vendor_message() {
        let server = MockServer::start(|_| {
            MockReply::json(400, json!({ "status": "ERROR", "message": "Invalid API key. (001)" }))
        })
        .await;
        let env = client(&server).get_registered_domains().await;
        assert!(!env.is_success());
        assert_eq!(env.message(), "Invalid API key. (001)");
        assert!(!env.is_transient());
    }

    #[tokio::test]
    async fn zone_replace_reports_each_failed_record() {
        let server = MockServer::start(|req| {
            if req.path.starts_with("/dns/retrieve") {
                success(json!({ "records": [
                    { "id": "11", "name": "example.com", "type": "A", "content": "192.0.2.1", "ttl": "600", "prio": "0" },
                    { "id": "12", "name": "old.example.com", "type": "A", "content": "192.0.2.2", "ttl": "600", "prio": "0" }
                ]}))
            } else if req.path.starts_with("/dns/create") && req.json()["type"] == "TXT" {
                MockReply::json(400, json!({ "status": "ERROR", "message": "Invalid record content" }))
            } else {
                success(json!({ "id": 13 }))
            }
        })
        .await;
        let zone = DnsZone {
            domain_name: "example.com".into(),
            records: vec![
                DnsRecordModel::new("@", "A", "192.0.2.1", 600),
                DnsRecordModel::new("www", "CNAME", "example.com", 600),
                DnsRecordModel::new("@", "TXT", "bad\u{0}", 600),
            ],
            nameservers: None,
        };
        let env = client(&server).update_dns_zone("example.com", &zone).await;
        assert!(!env.is_success());
        assert_eq!(env.errors().len(), 1);
        assert!(env.errors()[0].contains("TXT"));
        assert_eq!(env.data().unwrap().applied, 2);
        assert!(server.requests().iter().any(|r| r.path == "/dns/delete/example.com/12"));
    }

    #[tokio::test]
    async fn privacy_toggle_is_unsupported() {
        let server = MockServer::start(|_| success(json!({}))).await;
        let env = client(&server).set_privacy_protection("example.com", true).await;
        assert_eq!(env.error_code(), Some(crate::error::codes::UNSUPPORTED_OPERATION));
        assert_eq!(server.request_count(), 0);
    }
}
