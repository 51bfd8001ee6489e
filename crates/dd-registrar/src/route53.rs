/// Amazon Route 53 Domains client.
///
/// Route 53 Domains speaks AWS JSON 1.1: every call is a `POST /` with an
/// `X-Amz-Target: Route53Domains_v20140515.<Operation>` header, signed with
/// Signature Version 4 for the `route53domains` service. The service only
/// exists in `us-east-1`. Records belong to Route 53 hosted zones, a separate
/// API, so the DNS operations are reported as unsupported.

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use serde_json::{json, Value};

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::signing::{self, AwsCredentials, SigningInput};
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const ROUTE53_DOMAINS_API: Endpoint = Endpoint::single("https://route53domains.us-east-1.amazonaws.com");
const PROVIDER: RegistrarProvider = RegistrarProvider::Route53;
const TARGET_PREFIX: &str = "Route53Domains_v20140515";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const DNS_UNSUPPORTED: &str = "Route 53 Domains does not host records; use the Route 53 hosted zone API instead";

pub struct Route53DomainsClient {
    http: HttpContext,
    credentials: AwsCredentials,
}

impl Route53DomainsClient {
    pub fn new(access_key_id: &str, secret_access_key: &str, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(ROUTE53_DOMAINS_API.live, options),
            credentials: AwsCredentials {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
                region: "us-east-1".to_string(),
                service: "route53domains".to_string(),
            },
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn host(&self) -> String {
        let base = self.http.base_url();
        base.split_once("://").map(|(_, rest)| rest).unwrap_or(base).trim_end_matches('/').to_string()
    }

    async fn call(&self, operation: &str, payload: Value) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, operation, "route53domains request");
        let body = payload.to_string();
        let target = format!("{}.{}", TARGET_PREFIX, operation);
        let headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("host".to_string(), self.host()),
            ("x-amz-target".to_string(), target.clone()),
        ];
        let input = SigningInput {
            method: "POST",
            path: "/",
            query: &[],
            headers: &headers,
            payload: body.as_bytes(),
        };
        let signed = signing::sign_v4(&self.credentials, &input, Utc::now())?;

        let req = self
            .http
            .client
            .post(self.http.url("/"))
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", signed.amz_date)
            .header("Authorization", signed.authorization)
            .body(body);
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        let code = resp["__type"]
            .as_str()
            .map(|t| t.rsplit('#').next().unwrap_or(t).to_string());
        match transport::first_str(&resp, &["message", "Message"]) {
            Some(message) => Err(RegistrarError::vendor(code, message)),
            None if code.is_some() => Err(RegistrarError::vendor(code, "")),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn contact(c: &ContactInformation) -> Value {
        let mut contact = json!({
            "FirstName": c.first_name,
            "LastName": c.last_name,
            "ContactType": if c.organization.is_some() { "COMPANY" } else { "PERSON" },
            "AddressLine1": c.address1,
            "City": c.city,
            "State": c.state,
            "CountryCode": c.country,
            "ZipCode": c.postal_code,
            "PhoneNumber": c.phone,
            "Email": c.email,
        });
        if let Some(org) = &c.organization {
            contact["OrganizationName"] = json!(org);
        }
        if let Some(address2) = &c.address2 {
            contact["AddressLine2"] = json!(address2);
        }
        contact
    }

    /// Contact blocks plus the matching privacy flags.
    fn contact_fields(contacts: &ResolvedContacts, privacy: bool) -> Value {
        json!({
            "RegistrantContact": Self::contact(&contacts.registrant),
            "AdminContact": Self::contact(&contacts.admin),
            "TechContact": Self::contact(&contacts.tech),
            "BillingContact": Self::contact(&contacts.billing),
            "PrivacyProtectRegistrantContact": privacy,
            "PrivacyProtectAdminContact": privacy,
            "PrivacyProtectTechContact": privacy,
            "PrivacyProtectBillingContact": privacy,
        })
    }

    fn merge(target: &mut Value, extra: Value) {
        if let (Some(t), Value::Object(fields)) = (target.as_object_mut(), extra) {
            t.extend(fields);
        }
    }

    fn nameserver_list(nameservers: &[String]) -> Value {
        json!(nameservers.iter().map(|ns| json!({ "Name": ns })).collect::<Vec<_>>())
    }

    fn status_of(detail: &Value) -> DomainStatus {
        let statuses: Vec<String> = transport::str_array(&detail["StatusList"]);
        if statuses.iter().any(|s| s.to_lowercase().contains("hold")) {
            DomainStatus::Suspended
        } else if statuses.iter().any(|s| s.to_lowercase().contains("pendingtransfer")) {
            DomainStatus::PendingTransfer
        } else if let Some(exp) = Self::epoch(&detail["ExpirationDate"]) {
            if exp < Utc::now() { DomainStatus::Expired } else { DomainStatus::Active }
        } else {
            DomainStatus::Active
        }
    }

    /// Dates arrive as epoch seconds (floating point).
    fn epoch(value: &Value) -> Option<chrono::DateTime<Utc>> {
        match value {
            Value::Number(n) => n.as_f64().and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
            Value::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self.call("CheckDomainAvailability", json!({ "DomainName": domain })).await?;
        let state = resp["Availability"].as_str().unwrap_or("UNKNOWN");
        let mut result = Availability::new(domain, matches!(state, "AVAILABLE" | "AVAILABLE_PREORDER"));
        result.is_tld_supported = state != "UNAVAILABLE_RESTRICTED" && state != "DONT_KNOW";
        result.is_premium = state == "UNAVAILABLE_PREMIUM";
        Ok(result)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "DomainName": request.domain_name,
            "DurationInYears": request.years,
            "AutoRenew": request.auto_renew,
        });
        Self::merge(&mut body, Self::contact_fields(&contacts, request.privacy_protection));
        let resp = self.call("RegisterDomain", body).await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: resp["OperationId"].as_str().map(String::from),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn detail(&self, domain: &str) -> Result<Value, RegistrarError> {
        require_domain(domain)?;
        self.call("GetDomainDetail", json!({ "DomainName": domain })).await
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        // RenewDomain refuses unless the caller names the current expiry year.
        let current = match request.current_expiration {
            Some(exp) => exp,
            None => Self::epoch(&self.detail(&request.domain_name).await?["ExpirationDate"]).ok_or_else(|| {
                RegistrarError::MalformedResponse("GetDomainDetail returned no ExpirationDate".into())
            })?,
        };
        let resp = self
            .call(
                "RenewDomain",
                json!({
                    "DomainName": request.domain_name,
                    "DurationInYears": request.years,
                    "CurrentExpiryYear": current.year(),
                }),
            )
            .await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: resp["OperationId"].as_str().map(String::from),
            expiration_date: Some(years_from(current, request.years)),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "DomainName": request.domain_name,
            "DurationInYears": request.years.max(1),
            "AuthCode": request.auth_code,
            "AutoRenew": request.auto_renew,
        });
        if !request.nameservers.is_empty() {
            body["Nameservers"] = Self::nameserver_list(&request.nameservers);
        }
        Self::merge(&mut body, Self::contact_fields(&contacts, request.privacy_protection));
        let resp = self.call("TransferDomain", body).await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: resp["OperationId"].as_str().map(String::from),
            status: "submitted".to_string(),
        })
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        let d = self.detail(domain).await?;
        let mut info = DomainInfo::new(d["DomainName"].as_str().unwrap_or(domain), Self::status_of(&d));
        info.registration_date = Self::epoch(&d["CreationDate"]);
        info.expiration_date = Self::epoch(&d["ExpirationDate"]);
        info.updated_date = Self::epoch(&d["UpdatedDate"]);
        info.auto_renew = d["AutoRenew"].as_bool().unwrap_or(false);
        info.privacy_protection = d["RegistrantPrivacy"].as_bool().unwrap_or(false);
        info.registrar_lock = transport::str_array(&d["StatusList"])
            .iter()
            .any(|s| s.eq_ignore_ascii_case("clientTransferProhibited"));
        info.nameservers = d["Nameservers"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|n| n["Name"].as_str().map(String::from)).collect())
            .unwrap_or_default();
        Ok(info)
    }

    async fn simple(&self, domain: &str, operation: &str, mut body: Value) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        body["DomainName"] = json!(domain);
        self.call(operation, body).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let mut tlds = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut body = json!({ "MaxItems": 1000 });
            if let Some(m) = &marker {
                body["Marker"] = json!(m);
            }
            let resp = self.call("ListPrices", body).await?;
            if let Some(prices) = resp["Prices"].as_array() {
                for p in prices {
                    let Some(name) = p["Name"].as_str() else { continue };
                    let currency = p["RegistrationPrice"]["Currency"].as_str().unwrap_or("USD");
                    let mut tld = TldInfo::new(name, currency);
                    tld.registration_price = p["RegistrationPrice"]["Price"].as_f64();
                    tld.renewal_price = p["RenewalPrice"]["Price"].as_f64();
                    tld.transfer_price = p["TransferPrice"]["Price"].as_f64();
                    tld.supports_privacy = true;
                    tld.supports_dnssec = true;
                    tlds.push(tld);
                }
            }
            match resp["NextPageMarker"].as_str().filter(|m| !m.is_empty()) {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }
        Ok(filter_tlds(tlds, filter))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut body = json!({ "MaxItems": 100 });
            if let Some(m) = &marker {
                body["Marker"] = json!(m);
            }
            let resp = self.call("ListDomains", body).await?;
            if let Some(domains) = resp["Domains"].as_array() {
                for d in domains {
                    let expiry = Self::epoch(&d["Expiry"]);
                    all.push(RegisteredDomainInfo {
                        domain_name: d["DomainName"].as_str().unwrap_or("").to_string(),
                        status: match expiry {
                            Some(exp) if exp < Utc::now() => DomainStatus::Expired,
                            _ => DomainStatus::Active,
                        },
                        registration_date: None,
                        expiration_date: expiry,
                        auto_renew: d["AutoRenew"].as_bool().unwrap_or(false),
                        privacy_protection: false,
                        registrar_lock: d["TransferLock"].as_bool().unwrap_or(false),
                    });
                }
            }
            match resp["NextPageMarker"].as_str().filter(|m| !m.is_empty()) {
                Some(m) => marker = Some(m.to_string()),
                None => break,
            }
        }
        Ok(all)
    }

    fn dns_unsupported<T>() -> Result<T, RegistrarError> {
        Err(RegistrarError::Unsupported(DNS_UNSUPPORTED.to_string()))
    }
}

#[async_trait]
impl RegistrarClient for Route53DomainsClient {
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
            format!("Registration of {} submitted", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(PROVIDER, "renew_domain", &request.domain_name, self.renew(request).await, |r| {
            format!("Renewal of {} submitted", r.domain_name)
        })
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        conclude(PROVIDER, "transfer_domain", &request.domain_name, self.transfer(request).await, |t| {
            format!("Transfer of {} submitted", t.domain_name)
        })
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        conclude(PROVIDER, "get_dns_zone", domain, Self::dns_unsupported(), |_| String::new())
    }

    async fn update_dns_zone(&self, domain: &str, _zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, Self::dns_unsupported(), |_| String::new())
    }

    async fn add_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, Self::dns_unsupported(), |_| String::new())
    }

    async fn update_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, Self::dns_unsupported(), |_| String::new())
    }

    async fn delete_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, Self::dns_unsupported(), |_| String::new())
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        let body = json!({ "Nameservers": Self::nameserver_list(nameservers) });
        conclude(PROVIDER, "update_nameservers", domain, self.simple(domain, "UpdateDomainNameservers", body).await, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let body = json!({
            "AdminPrivacy": enable,
            "RegistrantPrivacy": enable,
            "TechPrivacy": enable,
            "BillingPrivacy": enable,
        });
        conclude(PROVIDER, "set_privacy_protection", domain, self.simple(domain, "UpdateDomainContactPrivacy", body).await, |_| {
            format!("Contact privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let operation = if enable { "EnableDomainAutoRenew" } else { "DisableDomainAutoRenew" };
        conclude(PROVIDER, "set_auto_renew", domain, self.simple(domain, operation, json!({})).await, |_| {
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
            .call("ListDomains", json!({ "MaxItems": 1 }))
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}
