/// Gandi v5 API client.
///
/// Authenticates with a personal access token (`Authorization: Bearer`).
/// Domain operations live under `/v5/domain`, records under
/// `/v5/livedns/domains/{fqdn}/records` where they are grouped into rrsets
/// (one name+type with several values). A `PUT` on the records collection
/// replaces the whole zone.
///
/// Reference: https://api.gandi.net/docs/

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};

use crate::dns_sync;
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const GANDI_API: Endpoint = Endpoint {
    live: "https://api.gandi.net/v5",
    sandbox: "https://api.sandbox.gandi.net/v5",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::Gandi;

pub struct GandiClient {
    http: HttpContext,
    token: String,
    sharing_id: Option<String>,
}

impl GandiClient {
    pub fn new(token: &str, sharing_id: Option<&str>, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(GANDI_API.select(sandbox), options),
            token: token.to_string(),
            sharing_id: sharing_id.map(String::from),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "gandi request");
        let mut req = self
            .http
            .client
            .request(method, self.http.url(path))
            .bearer_auth(&self.token);
        if let Some(sharing_id) = &self.sharing_id {
            req = req.query(&[("sharing_id", sharing_id)]);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let (status, resp) = transport::send_json(req).await?;
        if status.is_success() {
            return Ok(resp);
        }
        let details: Vec<String> = resp["errors"]
            .as_array()
            .map(|errs| {
                errs.iter()
                    .map(|e| {
                        let name = e["name"].as_str().unwrap_or("");
                        let desc = e["description"].as_str().unwrap_or("");
                        if name.is_empty() { desc.to_string() } else { format!("{}: {}", name, desc) }
                    })
                    .collect()
            })
            .unwrap_or_default();
        match transport::first_str(&resp, &["message", "cause"]) {
            Some(message) => Err(RegistrarError::vendor_with_details(
                resp["code"].as_i64().map(|c| c.to_string()),
                message,
                details,
            )),
            None => Err(RegistrarError::Transport(format!("HTTP {}", status))),
        }
    }

    fn contact(c: &ContactInformation) -> Value {
        let mut contact = json!({
            "type": if c.organization.is_some() { "company" } else { "individual" },
            "given": c.first_name,
            "family": c.last_name,
            "email": c.email,
            "phone": c.phone,
            "streetaddr": match &c.address2 {
                Some(line2) => format!("{}\n{}", c.address1, line2),
                None => c.address1.clone(),
            },
            "city": c.city,
            "state": c.state,
            "zip": c.postal_code,
            "country": c.country,
        });
        if let Some(org) = &c.organization {
            contact["orgname"] = json!(org);
        }
        contact
    }

    fn contact_fields(body: &mut Value, contacts: &ResolvedContacts, privacy: bool) {
        for (key, contact) in [
            ("owner", &contacts.registrant),
            ("admin", &contacts.admin),
            ("tech", &contacts.tech),
            ("bill", &contacts.billing),
        ] {
            let mut value = Self::contact(contact);
            value["data_obfuscated"] = json!(privacy);
            value["mail_obfuscated"] = json!(privacy);
            body[key] = value;
        }
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .call(Method::GET, &format!("/domain/check?name={}", domain), None)
            .await?;
        let product = resp["products"]
            .as_array()
            .and_then(|p| p.first())
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("no product entry for {}", domain)))?;
        let status = product["status"].as_str().unwrap_or("unknown");
        let mut availability = Availability::new(domain, status == "available");
        availability.is_tld_supported = status != "error_invalid";
        availability.is_premium = product["prices"]
            .as_array()
            .map(|prices| prices.iter().any(|p| p["premium"].as_bool().unwrap_or(false)))
            .unwrap_or(false);
        if let Some(price) = product["prices"].as_array().and_then(|p| p.first()) {
            availability.price = price["price_after_taxes"].as_f64().or_else(|| price["price_before_taxes"].as_f64());
        }
        availability.currency = resp["currency"].as_str().map(String::from);
        Ok(availability)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "fqdn": request.domain_name,
            "duration": request.years,
        });
        Self::contact_fields(&mut body, &contacts, request.privacy_protection);
        if !request.nameservers.is_empty() {
            body["nameservers"] = json!(request.nameservers);
        }
        self.call(Method::POST, "/domain/domains", Some(body)).await?;
        // Auto-renew is a separate switch after creation.
        self.set_autorenew(&request.domain_name, request.auto_renew).await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: None,
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let path = format!("/domain/domains/{}/renew", request.domain_name);
        self.call(Method::POST, &path, Some(json!({ "duration": request.years })))
            .await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: None,
            expiration_date: request.current_expiration.map(|exp| years_from(exp, request.years)),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let mut body = json!({
            "fqdn": request.domain_name,
            "authinfo": request.auth_code,
            "duration": request.years.max(1),
        });
        Self::contact_fields(&mut body, &contacts, request.privacy_protection);
        if !request.nameservers.is_empty() {
            body["nameservers"] = json!(request.nameservers);
        }
        self.call(Method::POST, "/domain/transferin", Some(body)).await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: None,
            status: "pending".to_string(),
        })
    }

    /// rrsets → one record per value. Gandi has no record ids.
    fn expand_rrsets(rrsets: &Value) -> Vec<DnsRecordModel> {
        let mut records = Vec::new();
        let Some(sets) = rrsets.as_array() else { return records };
        for set in sets {
            let name = set["rrset_name"].as_str().unwrap_or("@");
            let kind = set["rrset_type"].as_str().unwrap_or("");
            let ttl = set["rrset_ttl"].as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(10800);
            for value in transport::str_array(&set["rrset_values"]) {
                let mut record = DnsRecordModel::new(name, kind, &value, ttl);
                if kind.eq_ignore_ascii_case("MX") {
                    if let Some((pref, host)) = value.split_once(' ') {
                        record.priority = pref.parse().ok();
                        record.value = host.to_string();
                    }
                }
                records.push(record);
            }
        }
        records
    }

    /// Records → rrsets, grouped by name and type in first-seen order.
    fn collapse_records(records: &[DnsRecordModel]) -> Value {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut sets: BTreeMap<(String, String), (u32, Vec<String>)> = BTreeMap::new();
        for r in records {
            let key = (r.name.to_lowercase(), r.record_type.to_uppercase());
            let value = match r.priority {
                Some(p) if r.record_type.eq_ignore_ascii_case("MX") => format!("{} {}", p, r.value),
                _ => r.value.clone(),
            };
            let entry = sets.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                (r.ttl, Vec::new())
            });
            entry.1.push(value);
        }
        Value::Array(
            order
                .iter()
                .filter_map(|key| {
                    sets.get(key).map(|(ttl, values)| {
                        json!({
                            "rrset_name": key.0,
                            "rrset_type": key.1,
                            "rrset_ttl": ttl,
                            "rrset_values": values,
                        })
                    })
                })
                .collect(),
        )
    }

    async fn zone(&self, domain: &str) -> Result<Vec<DnsRecordModel>, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .call(Method::GET, &format!("/livedns/domains/{}/records", domain), None)
            .await?;
        Ok(Self::expand_rrsets(&resp))
    }

    async fn set_zone(&self, domain: &str, records: &[DnsRecordModel]) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let body = json!({ "items": Self::collapse_records(records) });
        self.call(Method::PUT, &format!("/livedns/domains/{}/records", domain), Some(body))
            .await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: records.len(), record_id: None })
    }

    async fn add_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        let mut records = self.zone(domain).await?;
        records.push(record.clone());
        self.set_zone(domain, &records).await.map(|c| DnsChange { applied: 1, ..c })
    }

    async fn edit_record(&self, domain: &str, record: &DnsRecordModel, remove: bool) -> Result<DnsChange, RegistrarError> {
        let mut records = self.zone(domain).await?;
        dns_sync::splice(&mut records, domain, record, remove)?;
        self.set_zone(domain, &records).await.map(|c| DnsChange { applied: 1, ..c })
    }

    fn parse_domain(domain: &str, d: &Value) -> DomainInfo {
        let statuses = transport::str_array(&d["status"]);
        let expiration = d["dates"]["registry_ends_at"].as_str().and_then(parse_timestamp);
        let status = match statuses.iter().find(|s| !s.starts_with("client")) {
            Some(s) => DomainStatus::from_vendor(s),
            None => match expiration {
                Some(exp) if exp < Utc::now() => DomainStatus::Expired,
                _ => DomainStatus::Active,
            },
        };
        let mut info = DomainInfo::new(d["fqdn"].as_str().unwrap_or(domain), status);
        info.registration_date = d["dates"]["registry_created_at"].as_str().and_then(parse_timestamp);
        info.expiration_date = expiration;
        info.updated_date = d["dates"]["updated_at"].as_str().and_then(parse_timestamp);
        info.auto_renew = d["autorenew"]["enabled"]
            .as_bool()
            .or_else(|| d["autorenew"].as_bool())
            .unwrap_or(false);
        info.registrar_lock = statuses.iter().any(|s| s == "clientTransferProhibited");
        info.privacy_protection = d["contacts"]["owner"]["data_obfuscated"].as_bool().unwrap_or(false);
        info.nameservers = transport::str_array(&d["nameservers"]);
        info
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let d = self.call(Method::GET, &format!("/domain/domains/{}", domain), None).await?;
        Ok(Self::parse_domain(domain, &d))
    }

    async fn set_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(
            Method::PUT,
            &format!("/domain/domains/{}/nameservers", domain),
            Some(json!({ "nameservers": nameservers })),
        )
        .await?;
        Ok(DomainChange::new(domain))
    }

    async fn set_privacy(&self, domain: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let obfuscation = json!({ "data_obfuscated": enable, "mail_obfuscated": enable });
        let body = json!({ "owner": obfuscation, "admin": obfuscation, "tech": obfuscation, "bill": obfuscation });
        self.call(Method::PATCH, &format!("/domain/domains/{}/contacts", domain), Some(body))
            .await?;
        Ok(DomainChange::new(domain))
    }

    async fn set_autorenew(&self, domain: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        self.call(
            Method::PATCH,
            &format!("/domain/domains/{}/autorenew", domain),
            Some(json!({ "enabled": enable })),
        )
        .await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let resp = self.call(Method::GET, "/domain/tlds", None).await?;
        let tlds = resp
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let name = t["name"].as_str()?;
                        let mut tld = TldInfo::new(name, "EUR");
                        tld.supports_privacy = true;
                        if let Some(category) = t["category"].as_str() {
                            tld.is_country_code = category == "ccTLD";
                        }
                        Some(tld)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(filter_tlds(tlds, filter))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let resp = self
                .call(Method::GET, &format!("/domain/domains?per_page=100&page={}", page), None)
                .await?;
            let rows = resp.as_array().cloned().unwrap_or_default();
            let count = rows.len();
            for row in &rows {
                all.push(RegisteredDomainInfo::from(Self::parse_domain("", row)));
            }
            if count < 100 {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl RegistrarClient for GandiClient {
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
            format!("Registration of {} accepted", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(PROVIDER, "renew_domain", &request.domain_name, self.renew(request).await, |r| {
            format!("Renewal of {} accepted", r.domain_name)
        })
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        conclude(PROVIDER, "transfer_domain", &request.domain_name, self.transfer(request).await, |t| {
            format!("Transfer of {} {}", t.domain_name, t.status)
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
        conclude(PROVIDER, "add_dns_record", domain, self.add_record(domain, record).await, |_| {
            format!("Added {}", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, self.edit_record(domain, record, false).await, |_| {
            format!("Updated {}", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, self.edit_record(domain, record, true).await, |_| {
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

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_privacy_protection", domain, self.set_privacy(domain, enable).await, |_| {
            format!("Contact obfuscation {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_auto_renew", domain, self.set_autorenew(domain, enable).await, |_| {
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
            .call(Method::GET, "/organization/user-info", None)
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}
