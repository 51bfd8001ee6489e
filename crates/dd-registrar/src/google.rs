/// Google Cloud Domains API client.
///
/// Google Domains itself moved to Squarespace; accounts on Google Cloud keep
/// their registrations in Cloud Domains, addressed as
/// `projects/{project}/locations/{location}/registrations/{domain}`. Records
/// live in Cloud DNS, which is a different API, and Cloud Domains registers
/// one year at a time with renewals handled by the renewal method setting.
///
/// Reference: https://cloud.google.com/domains/docs/reference/rest

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{conclude, require_domain, validate_registration, RegistrarClient};

const GOOGLE_DOMAINS_API: Endpoint = Endpoint::single("https://domains.googleapis.com/v1");
const PROVIDER: RegistrarProvider = RegistrarProvider::Google;

pub struct GoogleDomainsClient {
    http: HttpContext,
    /// OAuth2 Bearer token
    access_token: String,
    project: String,
    location: String,
}

impl GoogleDomainsClient {
    pub fn new(access_token: &str, project: &str, location: &str, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(GOOGLE_DOMAINS_API.live, options),
            access_token: access_token.to_string(),
            project: project.to_string(),
            location: if location.is_empty() { "global".to_string() } else { location.to_string() },
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn parent(&self) -> String {
        format!("/projects/{}/locations/{}", self.project, self.location)
    }

    fn registration_path(&self, domain: &str) -> String {
        format!("{}/registrations/{}", self.parent(), domain)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "cloud domains request");
        let mut req = self
            .http
            .client
            .request(method, self.http.url(path))
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        let error = &resp["error"];
        match error["message"].as_str() {
            Some(message) => Err(RegistrarError::vendor(
                error["status"].as_str().map(String::from),
                message,
            )),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn status_of(state: &str) -> DomainStatus {
        match state {
            "ACTIVE" => DomainStatus::Active,
            "EXPIRED" => DomainStatus::Expired,
            "SUSPENDED" => DomainStatus::Suspended,
            s if s.contains("TRANSFER") => DomainStatus::PendingTransfer,
            s if s.contains("PENDING") => DomainStatus::Pending,
            s => DomainStatus::from_vendor(s),
        }
    }

    fn parse_registration(r: &Value) -> DomainInfo {
        let mut info = DomainInfo::new(
            r["domainName"].as_str().unwrap_or(""),
            Self::status_of(r["state"].as_str().unwrap_or("REGISTRATION_STATE_UNSPECIFIED")),
        );
        info.registration_date = r["createTime"].as_str().and_then(parse_timestamp);
        info.expiration_date = r["expireTime"].as_str().and_then(parse_timestamp);
        info.nameservers = transport::str_array(&r["dnsSettings"]["customDns"]["nameServers"]);
        info.privacy_protection = r["contactSettings"]["privacy"]
            .as_str()
            .map(|p| p != "PUBLIC_CONTACT_DATA")
            .unwrap_or(false);
        info.auto_renew = r["managementSettings"]["renewalMethod"].as_str() == Some("AUTOMATIC_RENEWAL");
        info.registrar_lock = r["managementSettings"]["transferLockState"].as_str() == Some("LOCKED");
        info
    }

    fn contact(c: &ContactInformation) -> Value {
        let mut lines = vec![c.address1.clone()];
        if let Some(address2) = &c.address2 {
            lines.push(address2.clone());
        }
        let mut postal = json!({
            "regionCode": c.country,
            "postalCode": c.postal_code,
            "administrativeArea": c.state,
            "locality": c.city,
            "addressLines": lines,
            "recipients": [c.full_name()],
        });
        if let Some(org) = &c.organization {
            postal["organization"] = json!(org);
        }
        json!({
            "postalAddress": postal,
            "email": c.email,
            "phoneNumber": c.phone,
        })
    }

    fn privacy_value(enable: bool) -> &'static str {
        if enable { "PRIVATE_CONTACT_DATA" } else { "PUBLIC_CONTACT_DATA" }
    }

    async fn register_parameters(&self, domain: &str) -> Result<Value, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .call(
                Method::GET,
                &format!("{}/registrations:retrieveRegisterParameters?domainName={}", self.parent(), domain),
                None,
            )
            .await?;
        Ok(resp["registerParameters"].clone())
    }

    fn price(money: &Value) -> Option<f64> {
        let units = transport::loose_f64(&money["units"])?;
        let nanos = money["nanos"].as_f64().unwrap_or(0.0);
        Some(units + nanos / 1e9)
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        let params = self.register_parameters(domain).await?;
        let state = params["availability"].as_str().unwrap_or("UNKNOWN");
        let mut result = Availability::new(domain, state == "AVAILABLE");
        result.is_tld_supported = state != "UNSUPPORTED";
        result.price = Self::price(&params["yearlyPrice"]);
        result.currency = params["yearlyPrice"]["currencyCode"].as_str().map(String::from);
        Ok(result)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        if request.years != 1 {
            return Err(RegistrarError::Unsupported(
                "Cloud Domains registers for one year; register for 1 year and use set_auto_renew instead".into(),
            ));
        }
        let params = self.register_parameters(&request.domain_name).await?;
        if params["availability"].as_str() != Some("AVAILABLE") {
            return Err(RegistrarError::vendor(
                Some("DOMAIN_UNAVAILABLE".into()),
                format!("{} is not available", request.domain_name),
            ));
        }

        // Cloud Domains has no billing contact; that role is paid by the project.
        let contacts = request.contacts.resolve();
        let mut registration = json!({
            "domainName": request.domain_name,
            "managementSettings": {
                "renewalMethod": if request.auto_renew { "AUTOMATIC_RENEWAL" } else { "MANUAL_RENEWAL" },
            },
            "contactSettings": {
                "privacy": Self::privacy_value(request.privacy_protection),
                "registrantContact": Self::contact(&contacts.registrant),
                "adminContact": Self::contact(&contacts.admin),
                "technicalContact": Self::contact(&contacts.tech),
            },
        });
        if !request.nameservers.is_empty() {
            registration["dnsSettings"] = json!({ "customDns": { "nameServers": request.nameservers } });
        }
        let mut body = json!({
            "registration": registration,
            "yearlyPrice": params["yearlyPrice"],
        });
        let notices = transport::str_array(&params["domainNotices"]);
        if !notices.is_empty() {
            body["domainNotices"] = json!(notices);
        }

        let operation = self
            .call(Method::POST, &format!("{}/registrations:register", self.parent()), Some(body))
            .await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: operation["name"].as_str().map(String::from),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, 1)),
        })
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call(Method::GET, &self.registration_path(domain), None).await?;
        Ok(Self::parse_registration(&resp))
    }

    /// `:configureXxxSettings` with an update mask.
    async fn configure(&self, domain: &str, action: &str, body: Value) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(Method::POST, &format!("{}:{}", self.registration_path(domain), action), Some(body))
            .await?;
        Ok(DomainChange::new(domain))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut path = format!("{}/registrations?pageSize=200", self.parent());
            if let Some(token) = &page_token {
                path.push_str(&format!("&pageToken={}", token));
            }
            let resp = self.call(Method::GET, &path, None).await?;
            if let Some(arr) = resp["registrations"].as_array() {
                all.extend(arr.iter().map(|r| RegisteredDomainInfo::from(Self::parse_registration(r))));
            }
            match resp["nextPageToken"].as_str().filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(all)
    }

    fn unsupported<T>(message: &str) -> Result<T, RegistrarError> {
        Err(RegistrarError::Unsupported(message.to_string()))
    }
}

#[async_trait]
impl RegistrarClient for GoogleDomainsClient {
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
            format!("Registration of {} started", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        let result = Self::unsupported("Cloud Domains has no explicit renewal; use set_auto_renew instead");
        conclude(PROVIDER, "renew_domain", &request.domain_name, result, |_| String::new())
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        let result = Self::unsupported("Cloud Domains no longer accepts transfers-in; transfer to another registrar instead");
        conclude(PROVIDER, "transfer_domain", &request.domain_name, result, |_| String::new())
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        let result = Self::unsupported("Cloud Domains does not host records; use the Cloud DNS API instead");
        conclude(PROVIDER, "get_dns_zone", domain, result, |_| String::new())
    }

    async fn update_dns_zone(&self, domain: &str, _zone: &DnsZone) -> DnsUpdateResult {
        let result = Self::unsupported("Cloud Domains does not host records; use the Cloud DNS API instead");
        conclude(PROVIDER, "update_dns_zone", domain, result, |_| String::new())
    }

    async fn add_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        let result = Self::unsupported("Cloud Domains does not host records; use the Cloud DNS API instead");
        conclude(PROVIDER, "add_dns_record", domain, result, |_| String::new())
    }

    async fn update_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        let result = Self::unsupported("Cloud Domains does not host records; use the Cloud DNS API instead");
        conclude(PROVIDER, "update_dns_record", domain, result, |_| String::new())
    }

    async fn delete_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        let result = Self::unsupported("Cloud Domains does not host records; use the Cloud DNS API instead");
        conclude(PROVIDER, "delete_dns_record", domain, result, |_| String::new())
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        let body = json!({
            "dnsSettings": { "customDns": { "nameServers": nameservers } },
            "updateMask": "customDns",
        });
        conclude(PROVIDER, "update_nameservers", domain, self.configure(domain, "configureDnsSettings", body).await, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let body = json!({
            "contactSettings": { "privacy": Self::privacy_value(enable) },
            "updateMask": "privacy",
        });
        conclude(PROVIDER, "set_privacy_protection", domain, self.configure(domain, "configureContactSettings", body).await, |_| {
            format!("Contact privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let method = if enable { "AUTOMATIC_RENEWAL" } else { "MANUAL_RENEWAL" };
        let body = json!({
            "managementSettings": { "renewalMethod": method },
            "updateMask": "renewalMethod",
        });
        conclude(PROVIDER, "set_auto_renew", domain, self.configure(domain, "configureManagementSettings", body).await, |_| {
            format!("Renewal method set to {}", method)
        })
    }

    async fn get_supported_tlds(&self, _filter: Option<&[String]>) -> TldListResult {
        let result = Self::unsupported("Cloud Domains has no TLD listing; use check_availability, which reports UNSUPPORTED TLDs, instead");
        conclude(PROVIDER, "get_supported_tlds", "", result, |_| String::new())
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        conclude(PROVIDER, "get_registered_domains", "", self.list_domains().await, |d| {
            format!("{} domains", d.len())
        })
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        let result = self
            .call(Method::GET, &format!("{}/registrations?pageSize=1", self.parent()), None)
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}
