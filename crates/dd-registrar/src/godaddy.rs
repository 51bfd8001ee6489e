/// GoDaddy API client.
///
/// Uses the GoDaddy REST API with an `Authorization: sso-key` header. The OTE
/// environment (`api.ote-godaddy.com`) accepts the same calls without
/// charging.
///
/// Reference: https://developer.godaddy.com/doc/endpoint/domains

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const GODADDY_API: Endpoint = Endpoint {
    live: "https://api.godaddy.com/v1",
    sandbox: "https://api.ote-godaddy.com/v1",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::GoDaddy;
/// Prices come back in micro-units of the currency.
const MICRO_UNITS: f64 = 1_000_000.0;

pub struct GoDaddyClient {
    http: HttpContext,
    api_key: String,
    api_secret: String,
    consent_ip: String,
}

impl GoDaddyClient {
    pub fn new(api_key: &str, api_secret: &str, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(GODADDY_API.select(sandbox), options),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            consent_ip: "127.0.0.1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    /// IP address recorded as the party agreeing to registration terms.
    pub fn with_consent_ip(mut self, ip: &str) -> Self {
        self.consent_ip = ip.to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("sso-key {}:{}", self.api_key, self.api_secret)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "godaddy request");
        let mut req = self
            .http
            .client
            .request(method, self.http.url(path))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        Err(Self::vendor_error(status, &resp))
    }

    fn vendor_error(status: StatusCode, resp: &Value) -> RegistrarError {
        let fields: Vec<String> = resp["fields"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|f| {
                        format!(
                            "{}: {}",
                            f["path"].as_str().unwrap_or("?"),
                            f["message"].as_str().unwrap_or("invalid")
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        match resp["message"].as_str() {
            Some(message) => RegistrarError::vendor_with_details(resp["code"].as_str().map(String::from), message, fields),
            None => RegistrarError::Transport(format!("HTTP {}", status)),
        }
    }

    fn contact(c: &ContactInformation) -> Value {
        let mut address = json!({
            "address1": c.address1,
            "city": c.city,
            "state": c.state,
            "postalCode": c.postal_code,
            "country": c.country,
        });
        if let Some(address2) = &c.address2 {
            address["address2"] = json!(address2);
        }
        let mut contact = json!({
            "nameFirst": c.first_name,
            "nameLast": c.last_name,
            "email": c.email,
            "phone": c.phone,
            "addressMailing": address,
        });
        if let Some(org) = &c.organization {
            contact["organization"] = json!(org);
        }
        contact
    }

    fn contact_fields(contacts: &ResolvedContacts) -> Value {
        json!({
            "contactRegistrant": Self::contact(&contacts.registrant),
            "contactAdmin": Self::contact(&contacts.admin),
            "contactTech": Self::contact(&contacts.tech),
            "contactBilling": Self::contact(&contacts.billing),
        })
    }

    async fn consent(&self, domain: &str, privacy: bool, transfer: bool) -> Result<Value, RegistrarError> {
        let tld = tld_of(domain).unwrap_or_default();
        let path = format!("/domains/agreements?tlds={}&privacy={}&forTransfer={}", tld, privacy, transfer);
        let agreements = self.call(Method::GET, &path, None).await?;
        let keys: Vec<&str> = agreements
            .as_array()
            .map(|arr| arr.iter().filter_map(|a| a["agreementKey"].as_str()).collect())
            .unwrap_or_default();
        Ok(json!({
            "agreementKeys": keys,
            "agreedBy": self.consent_ip,
            "agreedAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }))
    }

    fn merge(target: &mut Value, extra: Value) {
        if let (Some(t), Value::Object(fields)) = (target.as_object_mut(), extra) {
            t.extend(fields);
        }
    }

    fn parse_domain(d: &Value) -> DomainInfo {
        let mut info = DomainInfo::new(
            d["domain"].as_str().unwrap_or(""),
            DomainStatus::from_vendor(d["status"].as_str().unwrap_or("unknown")),
        );
        info.registration_date = d["createdAt"].as_str().and_then(parse_timestamp);
        info.expiration_date = d["expires"].as_str().and_then(parse_timestamp);
        info.updated_date = d["modifiedAt"].as_str().and_then(parse_timestamp);
        info.auto_renew = d["renewAuto"].as_bool().unwrap_or(false);
        info.privacy_protection = d["privacy"].as_bool().unwrap_or(false);
        info.registrar_lock = d["locked"].as_bool().unwrap_or(false);
        info.nameservers = transport::str_array(&d["nameServers"]);
        info
    }

    fn parse_record(r: &Value) -> DnsRecordModel {
        let mut record = DnsRecordModel::new(
            r["name"].as_str().unwrap_or("@"),
            r["type"].as_str().unwrap_or(""),
            r["data"].as_str().unwrap_or(""),
            r["ttl"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(3600),
        );
        record.priority = r["priority"].as_u64().and_then(|p| u16::try_from(p).ok());
        record
    }

    fn record_body(record: &DnsRecordModel) -> Value {
        let mut body = json!({
            "type": record.record_type,
            "name": record.name,
            "data": record.value,
            "ttl": record.ttl,
        });
        if let Some(priority) = record.priority {
            body["priority"] = json!(priority);
        }
        body
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .call(Method::GET, &format!("/domains/available?domain={}&checkType=FULL", domain), None)
            .await?;
        let mut result = Availability::new(domain, resp["available"].as_bool().unwrap_or(false));
        result.price = resp["price"].as_f64().map(|p| p / MICRO_UNITS);
        result.currency = resp["currency"].as_str().map(String::from);
        Ok(result)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "domain": request.domain_name,
            "period": request.years,
            "privacy": request.privacy_protection,
            "renewAuto": request.auto_renew,
            "consent": self.consent(&request.domain_name, request.privacy_protection, false).await?,
        });
        if !request.nameservers.is_empty() {
            body["nameServers"] = json!(request.nameservers);
        }
        Self::merge(&mut body, Self::contact_fields(&contacts));

        let resp = self.call(Method::POST, "/domains/purchase", Some(body)).await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::loose_u64(&resp["orderId"]).map(|id| id.to_string()),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let resp = self
            .call(
                Method::POST,
                &format!("/domains/{}/renew", request.domain_name),
                Some(json!({ "period": request.years })),
            )
            .await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::loose_u64(&resp["orderId"]).map(|id| id.to_string()),
            expiration_date: request.current_expiration.map(|exp| years_from(exp, request.years)),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "authCode": request.auth_code,
            "period": request.years.max(1),
            "privacy": request.privacy_protection,
            "renewAuto": request.auto_renew,
            "consent": self.consent(&request.domain_name, request.privacy_protection, true).await?,
        });
        Self::merge(&mut body, Self::contact_fields(&contacts));
        let resp = self
            .call(Method::POST, &format!("/domains/{}/transfer", request.domain_name), Some(body))
            .await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: transport::loose_u64(&resp["orderId"]).map(|id| id.to_string()),
            status: "pending".to_string(),
        })
    }

    async fn records(&self, domain: &str) -> Result<Vec<DnsRecordModel>, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call(Method::GET, &format!("/domains/{}/records", domain), None).await?;
        Ok(resp.as_array().map(|arr| arr.iter().map(Self::parse_record).collect()).unwrap_or_default())
    }

    async fn replace_records(&self, domain: &str, records: &[DnsRecordModel]) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let body: Vec<Value> = records.iter().map(Self::record_body).collect();
        self.call(Method::PUT, &format!("/domains/{}/records", domain), Some(json!(body))).await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: records.len(), record_id: None })
    }

    async fn add_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        self.call(
            Method::PATCH,
            &format!("/domains/{}/records", domain),
            Some(json!([Self::record_body(record)])),
        )
        .await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id: None })
    }

    /// GoDaddy addresses records by (type, name). Rewrite that slot with the
    /// target record replaced or dropped.
    async fn rewrite_slot(&self, domain: &str, record: &DnsRecordModel, remove: bool) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let slot_path = format!("/domains/{}/records/{}/{}", domain, record.record_type, record.name);
        let resp = self.call(Method::GET, &slot_path, None).await?;
        let mut slot: Vec<DnsRecordModel> = resp
            .as_array()
            .map(|arr| arr.iter().map(Self::parse_record).collect())
            .unwrap_or_default();
        for r in &mut slot {
            r.name = record.name.clone();
            r.record_type = record.record_type.clone();
        }

        let index = if slot.len() == 1 {
            Some(0)
        } else {
            slot.iter().position(|r| r.value == record.value)
        };
        let Some(index) = index else {
            return Err(RegistrarError::vendor(
                Some("RECORD_NOT_FOUND".into()),
                format!("No DNS record matching {} on {}", record.describe(), domain),
            ));
        };

        if remove {
            slot.remove(index);
            if slot.is_empty() {
                self.call(Method::DELETE, &slot_path, None).await?;
                return Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id: None });
            }
        } else {
            slot[index] = record.clone();
        }
        let body: Vec<Value> = slot
            .iter()
            .map(|r| {
                let mut v = json!({ "data": r.value, "ttl": r.ttl });
                if let Some(priority) = r.priority {
                    v["priority"] = json!(priority);
                }
                v
            })
            .collect();
        self.call(Method::PUT, &slot_path, Some(json!(body))).await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: 1, record_id: None })
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call(Method::GET, &format!("/domains/{}", domain), None).await?;
        if resp["domain"].as_str().is_none() {
            return Err(RegistrarError::MalformedResponse(format!("GoDaddy returned no domain for {}", domain)));
        }
        Ok(Self::parse_domain(&resp))
    }

    async fn patch_domain(&self, domain: &str, body: Value) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(Method::PATCH, &format!("/domains/{}", domain), Some(body)).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let resp = self.call(Method::GET, "/domains/tlds", None).await?;
        let tlds = resp
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let mut tld = TldInfo::new(t["name"].as_str()?, "USD");
                        if let Some(kind) = t["type"].as_str() {
                            tld.is_country_code = kind.eq_ignore_ascii_case("COUNTRY_CODE");
                        }
                        tld.supports_privacy = true;
                        Some(tld)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(filter_tlds(tlds, filter))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let resp = self.call(Method::GET, "/domains?limit=1000", None).await?;
        match resp.as_array() {
            Some(arr) => Ok(arr.iter().map(|d| Self::parse_domain(d).into()).collect()),
            None => Err(RegistrarError::MalformedResponse("Unexpected GoDaddy API response".into())),
        }
    }
}

#[async_trait]
impl RegistrarClient for GoDaddyClient {
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
            format!("Registered {}", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(PROVIDER, "renew_domain", &request.domain_name, self.renew(request).await, |r| {
            format!("Renewed {}", r.domain_name)
        })
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        conclude(PROVIDER, "transfer_domain", &request.domain_name, self.transfer(request).await, |t| {
            format!("Transfer of {} submitted", t.domain_name)
        })
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        let result = self.records(domain).await.map(|records| DnsZone {
            domain_name: domain.to_string(),
            records,
            nameservers: None,
        });
        conclude(PROVIDER, "get_dns_zone", domain, result, |z| format!("{} DNS records", z.records.len()))
    }

    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, self.replace_records(domain, &zone.records).await, |c| {
            format!("Replaced zone with {} records", c.applied)
        })
    }

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, self.add_record(domain, record).await, |_| {
            format!("Added {}", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, self.rewrite_slot(domain, record, false).await, |_| {
            format!("Updated {}", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, self.rewrite_slot(domain, record, true).await, |_| {
            format!("Deleted {}", record.describe())
        })
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        let result = self.patch_domain(domain, json!({ "nameServers": nameservers })).await;
        conclude(PROVIDER, "update_nameservers", domain, result, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let result = self.patch_domain(domain, json!({ "exposeWhois": !enable })).await;
        conclude(PROVIDER, "set_privacy_protection", domain, result, |_| {
            format!("WHOIS privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let result = self.patch_domain(domain, json!({ "renewAuto": enable })).await;
        conclude(PROVIDER, "set_auto_renew", domain, result, |_| {
            format!("Auto-renew {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn get_supported_tlds(&self, filter: Option<&[String]>) -> TldListResult {
        conclude(PROVIDER, "get_supported_tlds", "", self.tlds(filter).await, |t| format!("{} TLDs", t.len()))
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        conclude(PROVIDER, "get_registered_domains", "", self.list_domains().await, |d| {
            format!("{} domains", d.len())
        })
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        let result = self
            .call(Method::GET, "/domains?limit=1", None)
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer) -> GoDaddyClient {
        GoDaddyClient::new("gdkey", "gdsecret", true, &options())
            .with_base_url(&server.base())
            .with_consent_ip("198.51.100.7")
    }

    #[test]
    fn sandbox_flag_selects_ote() {
        let c = GoDaddyClient::new("k", "s", true, &options());
        assert_eq!(c.http.base_url(), "https://api.ote-godaddy.com/v1");
    }

    #[tokio::test]
    async fn registration_sends_registrant_for_every_role() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/domains/agreements" => MockReply::json(200, json!([{ "agreementKey": "DNRA", "title": "Domain Name Registration Agreement" }])),
            "/domains/purchase" => MockReply::json(200, json!({ "orderId": 1234567, "itemCount": 1, "total": 11990000, "currency": "USD" })),
            other => panic!("unexpected path {}", other),
        })
        .await;
        let env = client(&server).register_domain(&registration("fresh-example.com", 2)).await;
        assert!(env.is_success(), "{:?}", env);
        assert_eq!(env.data().unwrap().order_id.as_deref(), Some("1234567"));
        let expires = env.data().unwrap().expiration_date.unwrap();
        let drift = (expires - years_from(Utc::now(), 2)).num_seconds().abs();
        assert!(drift < 60, "expiration {} is not two years out", expires);

        let purchase = server.requests().into_iter().find(|r| r.path == "/domains/purchase").unwrap();
        assert_eq!(purchase.header("authorization"), Some("sso-key gdkey:gdsecret"));
        let body = purchase.json();
        let registrant = &body["contactRegistrant"];
        assert_eq!(registrant["nameFirst"], "Jane");
        assert_eq!(registrant["organization"], "Acme Hosting");
        assert_eq!(registrant["addressMailing"]["address2"], "Suite 5");
        assert_eq!(registrant["addressMailing"]["postalCode"], "62701");
        for role in ["contactAdmin", "contactTech", "contactBilling"] {
            assert_eq!(&body[role], registrant, "{} differs from registrant", role);
        }
        assert_eq!(body["period"], 2);
        assert_eq!(body["nameServers"], json!(["ns1.example.net", "ns2.example.net"]));
        assert_eq!(body["consent"]["agreementKeys"], json!(["DNRA"]));
        assert_eq!(body["consent"]["agreedBy"], "198.51.100.7");
    }

    #[tokio::test]
    async fn explicit_admin_contact_is_kept() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/domains/agreements" => MockReply::json(200, json!([])),
            _ => MockReply::json(200, json!({ "orderId": 1 })),
        })
        .await;
        let mut request = registration("fresh-example.com", 1);
        request.contacts.admin = Some(crate::test_support::contact("Alan"));
        client(&server).register_domain(&request).await;
        let purchase = server.requests().into_iter().find(|r| r.path == "/domains/purchase").unwrap();
        let body = purchase.json();
        assert_eq!(body["contactAdmin"]["nameFirst"], "Alan");
        assert_eq!(body["contactTech"]["nameFirst"], "Jane");
    }

    #[tokio::test]
    async fn field_errors_are_listed() {
        let server = MockServer::start(|_| {
            MockReply::json(422, json!({
                "code": "INVALID_BODY",
                "message": "Request body doesn't fulfill schema, see details in `fields`",
                "fields": [{ "code": "MISMATCH_FORMAT", "message": "must match pattern", "path": "contactAdmin.phone" }]
            }))
        })
        .await;
        let env = client(&server).renew_domain(&DomainRenewalRequest {
            domain_name: "example.com".into(),
            years: 1,
            current_expiration: None,
        }).await;
        assert_eq!(env.error_code(), Some("INVALID_BODY"));
        assert_eq!(env.errors().len(), 2);
        assert_eq!(env.errors()[1], "contactAdmin.phone: must match pattern");
    }

    #[tokio::test]
    async fn availability_converts_micro_units() {
        let server = MockServer::start(|_| {
            MockReply::json(200, json!({ "available": true, "domain": "fresh.com", "definitive": true, "price": 11990000, "currency": "USD", "period": 1 }))
        })
        .await;
        let env = client(&server).check_availability("fresh.com").await;
        let data = env.data().unwrap();
        assert!(data.is_available);
        assert_eq!(data.price, Some(11.99));
    }

    #[tokio::test]
    async fn deleting_one_of_two_txt_values_rewrites_slot() {
        let server = MockServer::start(|req| match req.method.as_str() {
            "GET" => MockReply::json(200, json!([
                { "type": "TXT", "name": "@", "data": "keep-me", "ttl": 600 },
                { "type": "TXT", "name": "@", "data": "drop-me", "ttl": 600 }
            ])),
            _ => MockReply::empty(200),
        })
        .await;
        let record = DnsRecordModel::new("@", "TXT", "drop-me", 600);
        let env = client(&server).delete_dns_record("example.com", &record).await;
        assert!(env.is_success(), "{:?}", env);
        let put = server.requests().into_iter().find(|r| r.method == "PUT").unwrap();
        assert_eq!(put.path, "/domains/example.com/records/TXT/@");
        assert_eq!(put.json(), json!([{ "data": "keep-me", "ttl": 600 }]));
    }
}
