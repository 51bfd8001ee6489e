/// Name.com API client.
///
/// Uses the Name.com REST API v4 with HTTP Basic Auth (username + API token).
/// The development environment at `api.dev.name.com` takes a separate token
/// and the username suffixed with `-test`.
///
/// Reference: https://www.name.com/api-docs

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};

use crate::dns_sync::{self, RecordBackend, RemoteRecord};
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, require_domain, validate_registration, validate_renewal, validate_transfer, RegistrarClient,
};

const NAMECOM_API: Endpoint = Endpoint {
    live: "https://api.name.com/v4",
    sandbox: "https://api.dev.name.com/v4",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::NameCom;

pub struct NameComClient {
    http: HttpContext,
    username: String,
    api_token: String,
}

impl NameComClient {
    pub fn new(username: &str, api_token: &str, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(NAMECOM_API.select(sandbox), options),
            username: username.to_string(),
            api_token: api_token.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "name.com request");
        let mut req = self
            .http
            .client
            .request(method, self.http.url(path))
            .basic_auth(&self.username, Some(&self.api_token));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        match resp["message"].as_str() {
            Some(message) => {
                let details: Vec<String> = resp["details"].as_str().map(|d| vec![d.to_string()]).unwrap_or_default();
                Err(RegistrarError::vendor_with_details(None, message, details))
            }
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn parse_domain(d: &Value) -> DomainInfo {
        let locked = d["locked"].as_bool().unwrap_or(false);
        let expires = d["expireDate"].as_str().and_then(parse_timestamp);

        // Name.com reports no status field; derive it from the expiry.
        let status = match expires {
            Some(exp) if exp < Utc::now() => DomainStatus::Expired,
            _ => DomainStatus::Active,
        };

        let mut info = DomainInfo::new(d["domainName"].as_str().unwrap_or(""), status);
        info.registration_date = d["createDate"].as_str().and_then(parse_timestamp);
        info.expiration_date = expires;
        info.auto_renew = d["autorenewEnabled"].as_bool().unwrap_or(false);
        info.privacy_protection = d["privacyEnabled"].as_bool().unwrap_or(false);
        info.registrar_lock = locked;
        info.nameservers = transport::str_array(&d["nameservers"]);
        info
    }

    fn contact(c: &ContactInformation) -> Value {
        json!({
            "firstName": c.first_name,
            "lastName": c.last_name,
            "companyName": c.organization.clone().unwrap_or_default(),
            "address1": c.address1,
            "address2": c.address2.clone().unwrap_or_default(),
            "city": c.city,
            "state": c.state,
            "zip": c.postal_code,
            "country": c.country,
            "phone": c.phone,
            "email": c.email,
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
        let host = if record.name == "@" { "" } else { record.name.as_str() };
        let mut body = json!({
            "host": host,
            "type": record.record_type,
            "answer": record.value,
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
            .call(Method::POST, "/domains:checkAvailability", Some(json!({ "domainNames": [domain] })))
            .await?;
        let row = resp["results"]
            .as_array()
            .and_then(|arr| arr.iter().find(|r| r["domainName"].as_str().map(|d| d.eq_ignore_ascii_case(domain)).unwrap_or(false)))
            .cloned()
            .unwrap_or(Value::Null);
        let mut result = Availability::new(domain, row["purchasable"].as_bool().unwrap_or(false));
        result.is_premium = row["premium"].as_bool().unwrap_or(false);
        result.price = row["purchasePrice"].as_f64();
        result.currency = result.price.map(|_| "USD".to_string());
        Ok(result)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut domain = json!({
            "domainName": request.domain_name,
            "contacts": Self::contacts(&contacts),
            "privacyEnabled": request.privacy_protection,
            "autorenewEnabled": request.auto_renew,
        });
        if !request.nameservers.is_empty() {
            domain["nameservers"] = json!(request.nameservers);
        }
        let resp = self
            .call(Method::POST, "/domains", Some(json!({ "domain": domain, "years": request.years })))
            .await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::loose_u64(&resp["order"]).map(|o| o.to_string()),
            registration_date: resp["domain"]["createDate"].as_str().and_then(parse_timestamp).or(Some(now)),
            expiration_date: resp["domain"]["expireDate"]
                .as_str()
                .and_then(parse_timestamp)
                .or(Some(years_from(now, request.years))),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let resp = self
            .call(
                Method::POST,
                &format!("/domains/{}:renew", request.domain_name),
                Some(json!({ "years": request.years })),
            )
            .await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::loose_u64(&resp["order"]).map(|o| o.to_string()),
            expiration_date: resp["domain"]["expireDate"].as_str().and_then(parse_timestamp),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let resp = self
            .call(
                Method::POST,
                "/transfers",
                Some(json!({
                    "domainName": request.domain_name,
                    "authCode": request.auth_code,
                    "privacyEnabled": request.privacy_protection,
                })),
            )
            .await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: transport::loose_u64(&resp["order"]).map(|o| o.to_string()),
            status: resp["transfer"]["status"].as_str().unwrap_or("pending").to_string(),
        })
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call(Method::GET, &format!("/domains/{}", domain), None).await?;
        if resp["domainName"].as_str().is_none() {
            return Err(RegistrarError::MalformedResponse(format!("Name.com returned no domain for {}", domain)));
        }
        Ok(Self::parse_domain(&resp))
    }

    async fn action(&self, domain: &str, action: &str, body: Value) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(Method::POST, &format!("/domains/{}:{}", domain, action), Some(body)).await?;
        Ok(DomainChange::new(domain))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all_domains = Vec::new();
        let mut page = 1;

        loop {
            let resp = self
                .call(Method::GET, &format!("/domains?page={}&perPage=100", page), None)
                .await?;
            let domains: Vec<RegisteredDomainInfo> = resp["domains"]
                .as_array()
                .map(|arr| arr.iter().map(|d| Self::parse_domain(d).into()).collect())
                .unwrap_or_default();

            let count = domains.len();
            all_domains.extend(domains);

            // Check if there's a next page
            if resp["nextPage"].as_u64().is_none() || count == 0 {
                break;
            }
            page += 1;
        }

        Ok(all_domains)
    }
}

#[async_trait]
impl RecordBackend for NameComClient {
    async fn list_records(&self, domain: &str) -> Result<Vec<RemoteRecord>, RegistrarError> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let resp = self
                .call(Method::GET, &format!("/domains/{}/records?page={}&perPage=1000", domain, page), None)
                .await?;
            if let Some(arr) = resp["records"].as_array() {
                records.extend(arr.iter().filter_map(|r| {
                    let id = r["id"].as_u64()?;
                    let host = r["host"].as_str().filter(|h| !h.is_empty()).unwrap_or("@");
                    let mut record = DnsRecordModel::new(
                        host,
                        r["type"].as_str().unwrap_or(""),
                        r["answer"].as_str().unwrap_or(""),
                        r["ttl"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(300),
                    );
                    record.priority = r["priority"].as_u64().and_then(|p| u16::try_from(p).ok());
                    Some(RemoteRecord::numeric(id, record))
                }));
            }
            match resp["nextPage"].as_u64() {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(records)
    }

    async fn create_record(&self, domain: &str, record: &DnsRecordModel) -> Result<Option<u64>, RegistrarError> {
        let resp = self
            .call(Method::POST, &format!("/domains/{}/records", domain), Some(Self::record_body(record)))
            .await?;
        Ok(resp["id"].as_u64())
    }

    async fn modify_record(&self, domain: &str, existing: &RemoteRecord, desired: &DnsRecordModel) -> Result<(), RegistrarError> {
        self.call(
            Method::PUT,
            &format!("/domains/{}/records/{}", domain, existing.handle),
            Some(Self::record_body(desired)),
        )
        .await
        .map(|_| ())
    }

    async fn remove_record(&self, domain: &str, existing: &RemoteRecord) -> Result<(), RegistrarError> {
        self.call(Method::DELETE, &format!("/domains/{}/records/{}", domain, existing.handle), None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RegistrarClient for NameComClient {
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
        let result = match require_domain(domain) {
            Ok(()) => self.list_records(domain).await.map(|records| DnsZone {
                domain_name: domain.to_string(),
                records: records.into_iter().map(|r| r.record).collect(),
                nameservers: None,
            }),
            Err(err) => Err(err),
        };
        conclude(PROVIDER, "get_dns_zone", domain, result, |z| format!("{} DNS records", z.records.len()))
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
        let result = self.action(domain, "setNameservers", json!({ "nameservers": nameservers })).await;
        conclude(PROVIDER, "update_nameservers", domain, result, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let action = if enable { "enableWhoisPrivacy" } else { "disableWhoisPrivacy" };
        conclude(PROVIDER, "set_privacy_protection", domain, self.action(domain, action, json!({})).await, |_| {
            format!("WHOIS privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let action = if enable { "enableAutorenew" } else { "disableAutorenew" };
        conclude(PROVIDER, "set_auto_renew", domain, self.action(domain, action, json!({})).await, |_| {
            format!("Auto-renew {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn get_supported_tlds(&self, _filter: Option<&[String]>) -> TldListResult {
        conclude(
            PROVIDER,
            "get_supported_tlds",
            "",
            Err(RegistrarError::Unsupported(
                "Name.com v4 has no TLD listing; use check_availability instead".into(),
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
        let result = self
            .call(Method::GET, "/hello", None)
            .await
            .map(|resp| DomainChange::new(resp["username"].as_str().unwrap_or("")));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}
