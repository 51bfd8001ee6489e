/// Client for reseller REST APIs that authenticate by request signing.
///
/// Each request carries `X-API-Key`, `X-Timestamp` (Unix seconds) and
/// `X-Signature`, an HMAC-SHA256 keyed by the API secret over
/// `api_key + METHOD + path + timestamp`, hex or base64 encoded depending on
/// the reseller. The path is the request path relative to the configured
/// base URL, without the query string. There is no public default endpoint,
/// so the base URL always comes from configuration.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};

use crate::dns_sync::{self, RecordBackend, RemoteRecord};
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::signing::{self, SignatureEncoding};
use crate::transport::{self, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const PROVIDER: RegistrarProvider = RegistrarProvider::SignedRest;

pub struct SignedRestClient {
    http: HttpContext,
    api_key: String,
    api_secret: String,
    encoding: SignatureEncoding,
}

impl SignedRestClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        api_secret: &str,
        encoding: SignatureEncoding,
        options: &TransportOptions,
    ) -> Self {
        Self {
            http: HttpContext::new(base_url, options),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            encoding,
        }
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        self.call_with_query(method, path, &[], body).await
    }

    /// The signature covers the path only; query parameters are left out.
    async fn call_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "signed api request");
        let timestamp = Utc::now().timestamp();
        let signature = signing::api_signature(
            &self.api_key,
            &self.api_secret,
            method.as_str(),
            path,
            timestamp,
            self.encoding,
        )?;
        let mut req = self
            .http
            .client
            .request(method, self.http.url(path))
            .header("X-API-Key", &self.api_key)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        let error = if resp["error"].is_object() { &resp["error"] } else { &resp };
        let code = match &error["code"] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        match transport::first_str(error, &["message", "error"]) {
            Some(message) => Err(RegistrarError::vendor_with_details(
                code,
                message,
                transport::str_array(&error["details"]),
            )),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn contact(c: &ContactInformation) -> Value {
        json!({
            "firstName": c.first_name,
            "lastName": c.last_name,
            "organization": c.organization,
            "email": c.email,
            "phone": c.phone,
            "address1": c.address1,
            "address2": c.address2,
            "city": c.city,
            "state": c.state,
            "postalCode": c.postal_code,
            "country": c.country,
        })
    }

    fn contacts(contacts: &ResolvedContacts) -> Value {
        json!({
            "registrant": Self::contact(&contacts.registrant),
            "admin": Self::contact(&contacts.admin),
            "tech": Self::contact(&contacts.tech),
            "billing": Self::contact(&contacts.billing),
        })
    }

    fn record_body(record: &DnsRecordModel) -> Value {
        let mut body = json!({
            "name": record.name,
            "type": record.record_type,
            "value": record.value,
            "ttl": record.ttl,
        });
        if let Some(priority) = record.priority {
            body["priority"] = json!(priority);
        }
        body
    }

    fn parse_record(r: &Value) -> DnsRecordModel {
        let mut record = DnsRecordModel::new(
            r["name"].as_str().unwrap_or("@"),
            r["type"].as_str().unwrap_or(""),
            r["value"].as_str().unwrap_or(""),
            r["ttl"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(3600),
        );
        record.id = transport::loose_u64(&r["id"]);
        record.priority = r["priority"].as_u64().and_then(|p| u16::try_from(p).ok());
        record
    }

    fn parse_domain(domain: &str, d: &Value) -> DomainInfo {
        let status = d["status"].as_str().map(DomainStatus::from_vendor).unwrap_or(DomainStatus::Unknown);
        let mut info = DomainInfo::new(d["domain"].as_str().unwrap_or(domain), status);
        info.registration_date = d["createdAt"].as_str().and_then(parse_timestamp);
        info.expiration_date = d["expiresAt"].as_str().and_then(parse_timestamp);
        info.updated_date = d["updatedAt"].as_str().and_then(parse_timestamp);
        info.auto_renew = transport::loose_bool(&d["autoRenew"]).unwrap_or(false);
        info.privacy_protection = transport::loose_bool(&d["privacy"]).unwrap_or(false);
        info.registrar_lock = transport::loose_bool(&d["locked"]).unwrap_or(false);
        info.nameservers = transport::str_array(&d["nameservers"]);
        info
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .call_with_query(Method::GET, "/domains/check", &[("domain", domain)], None)
            .await?;
        let mut availability = Availability::new(domain, transport::loose_bool(&resp["available"]).unwrap_or(false));
        availability.is_tld_supported = transport::loose_bool(&resp["supported"]).unwrap_or(true);
        availability.is_premium = transport::loose_bool(&resp["premium"]).unwrap_or(false);
        availability.price = transport::loose_f64(&resp["price"]);
        availability.currency = resp["currency"].as_str().map(String::from);
        Ok(availability)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let body = json!({
            "domain": request.domain_name,
            "years": request.years,
            "autoRenew": request.auto_renew,
            "privacy": request.privacy_protection,
            "nameservers": request.nameservers,
            "contacts": Self::contacts(&contacts),
        });
        let resp = self.call(Method::POST, "/domains", Some(body)).await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::first_str(&resp, &["orderId", "id"]).map(String::from),
            registration_date: resp["createdAt"].as_str().and_then(parse_timestamp).or(Some(now)),
            expiration_date: resp["expiresAt"]
                .as_str()
                .and_then(parse_timestamp)
                .or_else(|| Some(years_from(now, request.years))),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let mut body = json!({ "years": request.years });
        if let Some(current) = request.current_expiration {
            body["currentExpiration"] = json!(current.to_rfc3339());
        }
        let resp = self
            .call(Method::POST, &format!("/domains/{}/renew", request.domain_name), Some(body))
            .await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::first_str(&resp, &["orderId", "id"]).map(String::from),
            expiration_date: resp["expiresAt"].as_str().and_then(parse_timestamp),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let body = json!({
            "authCode": request.auth_code,
            "years": request.years,
            "autoRenew": request.auto_renew,
            "privacy": request.privacy_protection,
            "nameservers": request.nameservers,
            "contacts": Self::contacts(&contacts),
        });
        let resp = self
            .call(Method::POST, &format!("/domains/{}/transfer", request.domain_name), Some(body))
            .await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: transport::first_str(&resp, &["transferId", "id"]).map(String::from),
            status: resp["status"].as_str().unwrap_or("pending").to_string(),
        })
    }

    async fn zone(&self, domain: &str) -> Result<Vec<DnsRecordModel>, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call(Method::GET, &format!("/domains/{}/dns", domain), None).await?;
        Ok(resp["records"]
            .as_array()
            .map(|arr| arr.iter().map(Self::parse_record).collect())
            .unwrap_or_default())
    }

    async fn set_zone(&self, domain: &str, records: &[DnsRecordModel]) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let body = json!({ "records": records.iter().map(Self::record_body).collect::<Vec<_>>() });
        self.call(Method::PUT, &format!("/domains/{}/dns", domain), Some(body)).await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: records.len(), record_id: None })
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let d = self.call(Method::GET, &format!("/domains/{}", domain), None).await?;
        Ok(Self::parse_domain(domain, &d))
    }

    async fn put_setting(&self, domain: &str, setting: &str, body: Value) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(Method::PUT, &format!("/domains/{}/{}", domain, setting), Some(body)).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let resp = self.call(Method::GET, "/tlds", None).await?;
        let rows = resp.as_array().or_else(|| resp["tlds"].as_array());
        let tlds = rows
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let ext = t["extension"].as_str()?;
                        let mut tld = TldInfo::new(ext, t["currency"].as_str().unwrap_or("USD"));
                        tld.registration_price = transport::loose_f64(&t["registrationPrice"]);
                        tld.renewal_price = transport::loose_f64(&t["renewalPrice"]);
                        tld.transfer_price = transport::loose_f64(&t["transferPrice"]);
                        tld.min_registration_years = t["minYears"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(1);
                        tld.max_registration_years = t["maxYears"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(10);
                        tld.supports_privacy = t["privacy"].as_bool().unwrap_or(false);
                        tld.supports_dnssec = t["dnssec"].as_bool().unwrap_or(false);
                        Some(tld)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(filter_tlds(tlds, filter))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let resp = self.call(Method::GET, "/domains", None).await?;
        let rows = resp.as_array().or_else(|| resp["domains"].as_array());
        Ok(rows
            .map(|arr| {
                arr.iter()
                    .map(|d| RegisteredDomainInfo::from(Self::parse_domain("", d)))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RecordBackend for SignedRestClient {
    async fn list_records(&self, domain: &str) -> Result<Vec<RemoteRecord>, RegistrarError> {
        Ok(self
            .zone(domain)
            .await?
            .into_iter()
            .filter_map(|r| r.id.map(|id| RemoteRecord::numeric(id, r)))
            .collect())
    }

    async fn create_record(&self, domain: &str, record: &DnsRecordModel) -> Result<Option<u64>, RegistrarError> {
        let resp = self
            .call(Method::POST, &format!("/domains/{}/dns", domain), Some(Self::record_body(record)))
            .await?;
        Ok(transport::loose_u64(&resp["id"]))
    }

    async fn modify_record(&self, domain: &str, existing: &RemoteRecord, desired: &DnsRecordModel) -> Result<(), RegistrarError> {
        self.call(
            Method::PUT,
            &format!("/domains/{}/dns/{}", domain, existing.handle),
            Some(Self::record_body(desired)),
        )
        .await
        .map(|_| ())
    }

    async fn remove_record(&self, domain: &str, existing: &RemoteRecord) -> Result<(), RegistrarError> {
        self.call(Method::DELETE, &format!("/domains/{}/dns/{}", domain, existing.handle), None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RegistrarClient for SignedRestClient {
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
            format!("Transfer of {} is {}", t.domain_name, t.status)
        })
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        let result = self.zone(domain).await.map(|records| DnsZone {
            domain_name: domain.to_string(),
            records,
            nameservers: None,
        });
        conclude(PROVIDER, "get_dns_zone", domain, result, |z| format!("{} DNS records", z.records.len()))
    }

    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, self.set_zone(domain, &zone.records).await, |c| {
            format!("Replaced zone with {} records", c.applied)
        })
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
        let result = self
            .put_setting(domain, "nameservers", json!({ "nameservers": nameservers }))
            .await;
        conclude(PROVIDER, "update_nameservers", domain, result, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let result = self.put_setting(domain, "privacy", json!({ "enabled": enable })).await;
        conclude(PROVIDER, "set_privacy_protection", domain, result, |_| {
            format!("Privacy protection {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let result = self.put_setting(domain, "auto-renew", json!({ "enabled": enable })).await;
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
        let result = self.call(Method::GET, "/account", None).await.map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer, encoding: SignatureEncoding) -> SignedRestClient {
        SignedRestClient::new(&server.base(), "key123", "shh-secret", encoding, &options())
    }

    #[tokio::test]
    async fn requests_carry_verifiable_signature() {
        let server = MockServer::start(|_| MockReply::json(200, json!({ "available": true, "price": "12.00" }))).await;
        let env = client(&server, SignatureEncoding::Hex).check_availability("fresh.io").await;
        assert!(env.data().unwrap().is_available);
        assert_eq!(env.data().unwrap().price, Some(12.0));

        let req = &server.requests()[0];
        assert_eq!(req.header("x-api-key"), Some("key123"));
        let timestamp: i64 = req.header("x-timestamp").unwrap().parse().unwrap();
        let expected = signing::api_signature("key123", "shh-secret", "GET", "/domains/check", timestamp, SignatureEncoding::Hex).unwrap();
        assert_eq!(req.header("x-signature"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn availability_query_is_url_encoded() {
        let server = MockServer::start(|_| MockReply::json(200, json!({ "available": false }))).await;
        client(&server, SignatureEncoding::Hex).check_availability("bücher.de").await;

        let req = &server.requests()[0];
        assert_eq!(req.path, "/domains/check");
        assert!(req.query.contains("%C3%BC"), "raw query: {}", req.query);
        assert_eq!(req.query_param("domain").as_deref(), Some("bücher.de"));
    }

    #[tokio::test]
    async fn base64_encoding_is_honoured() {
        let server = MockServer::start(|_| MockReply::json(200, json!({ "orderId": "ord-9" }))).await;
        let env = client(&server, SignatureEncoding::Base64).register_domain(&registration("fresh.io", 1)).await;
        assert_eq!(env.data().unwrap().order_id.as_deref(), Some("ord-9"));

        let req = &server.requests()[0];
        let timestamp: i64 = req.header("x-timestamp").unwrap().parse().unwrap();
        let expected = signing::api_signature("key123", "shh-secret", "POST", "/domains", timestamp, SignatureEncoding::Base64).unwrap();
        assert_eq!(req.header("x-signature"), Some(expected.as_str()));
        let body = req.json();
        assert_eq!(body["contacts"]["billing"], body["contacts"]["registrant"]);
        assert_eq!(body["contacts"]["tech"]["address2"], "Suite 5");
    }

    #[tokio::test]
    async fn nested_error_object_is_read() {
        let server = MockServer::start(|_| {
            MockReply::json(409, json!({ "error": { "code": "DOMAIN_TAKEN", "message": "Domain is not available" } }))
        })
        .await;
        let env = client(&server, SignatureEncoding::Hex).register_domain(&registration("taken.io", 1)).await;
        assert_eq!(env.error_code(), Some("DOMAIN_TAKEN"));
        assert_eq!(env.message(), "Domain is not available");
    }

    #[tokio::test]
    async fn record_update_addresses_record_by_id() {
        let server = MockServer::start(|req| match req.method.as_str() {
            "GET" => MockReply::json(
                200,
                json!({ "records": [
                    { "id": 31, "name": "@", "type": "A", "value": "192.0.2.1", "ttl": 300 },
                    { "id": 32, "name": "www", "type": "CNAME", "value": "example.io", "ttl": 300 }
                ] }),
            ),
            _ => MockReply::json(200, json!({})),
        })
        .await;
        let record = DnsRecordModel::new("www", "CNAME", "cdn.example.net", 300);
        let env = client(&server, SignatureEncoding::Hex).update_dns_record("example.io", &record).await;
        assert_eq!(env.data().and_then(|c| c.record_id), Some(32));
        let put = &server.requests()[1];
        assert_eq!(put.method, "PUT");
        assert_eq!(put.path, "/domains/example.io/dns/32");
        assert_eq!(put.json()["value"], "cdn.example.net");
    }
}
