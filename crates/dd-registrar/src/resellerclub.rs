/// ResellerClub (LogicBoxes HTTP API) client.
///
/// Every call is a GET or POST whose parameters travel in the query string,
/// with `auth-userid` and `api-key` on each request. Replies are JSON; errors
/// come back as `{"status": "ERROR", "message": ...}`. Orders are addressed
/// by numeric order id, so most domain operations first resolve it.
///
/// Reference: https://manage.resellerclub.com/kb/answer/744

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Method;
use serde_json::Value;

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const RESELLERCLUB_API: Endpoint = Endpoint {
    live: "https://httpapi.com/api",
    sandbox: "https://test.httpapi.com/api",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::ResellerClub;

type Params = Vec<(String, String)>;

pub struct ResellerClubClient {
    http: HttpContext,
    auth_user_id: String,
    api_key: String,
    customer_id: String,
}

impl ResellerClubClient {
    pub fn new(
        auth_user_id: &str,
        api_key: &str,
        customer_id: &str,
        sandbox: bool,
        options: &TransportOptions,
    ) -> Self {
        Self {
            http: HttpContext::new(RESELLERCLUB_API.select(sandbox), options),
            auth_user_id: auth_user_id.to_string(),
            api_key: api_key.to_string(),
            customer_id: customer_id.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    async fn call(&self, method: Method, path: &str, params: Params) -> Result<Value, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, %method, path, "resellerclub request");
        let mut query: Params = vec![
            ("auth-userid".into(), self.auth_user_id.clone()),
            ("api-key".into(), self.api_key.clone()),
        ];
        query.extend(params);
        let req = self.http.client.request(method, self.http.url(path)).query(&query);
        let (status, body) = transport::send_json(req).await?;

        let status_field = body["status"].as_str().unwrap_or("");
        if status_field.eq_ignore_ascii_case("error") || !status.is_success() {
            let message = transport::first_str(&body, &["message", "error"]).unwrap_or("");
            if message.is_empty() && status.is_success() {
                return Err(RegistrarError::vendor(None, ""));
            }
            if message.is_empty() {
                return Err(RegistrarError::Transport(format!("HTTP {}", status)));
            }
            return Err(RegistrarError::vendor(None, message));
        }
        Ok(body)
    }

    fn p(key: &str, value: impl ToString) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    fn epoch(value: &Value) -> Option<DateTime<Utc>> {
        transport::loose_u64(value).and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
    }

    fn nameserver_params(nameservers: &[String]) -> Params {
        nameservers.iter().map(|ns| Self::p("ns", ns)).collect()
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let (sld, tld) = split_domain(domain)
            .ok_or_else(|| RegistrarError::InvalidRequest(format!("invalid domain name '{}'", domain)))?;
        let body = self
            .call(Method::GET, "/domains/available.json", vec![Self::p("domain-name", sld), Self::p("tlds", tld)])
            .await?;
        let entry = body
            .get(domain)
            .or_else(|| body.get(domain.to_lowercase()))
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("no availability entry for {}", domain)))?;
        let status = entry["status"].as_str().unwrap_or("unknown");
        let mut availability = Availability::new(domain, status.eq_ignore_ascii_case("available"));
        availability.is_tld_supported = !status.eq_ignore_ascii_case("unknown");
        availability.is_premium = entry["classkey"].as_str().map(|k| k.contains("premium")).unwrap_or(false);
        Ok(availability)
    }

    async fn add_contact(&self, c: &ContactInformation) -> Result<String, RegistrarError> {
        let (cc, number) = c.phone_parts();
        let mut params = vec![
            Self::p("name", c.full_name()),
            Self::p("company", c.organization.clone().unwrap_or_else(|| "N/A".to_string())),
            Self::p("email", &c.email),
            Self::p("address-line-1", &c.address1),
            Self::p("city", &c.city),
            Self::p("state", &c.state),
            Self::p("country", &c.country),
            Self::p("zipcode", &c.postal_code),
            Self::p("phone-cc", cc),
            Self::p("phone", number),
            Self::p("customer-id", &self.customer_id),
            Self::p("type", "Contact"),
        ];
        if let Some(address2) = &c.address2 {
            params.push(Self::p("address-line-2", address2));
        }
        let body = self.call(Method::POST, "/contacts/add.json", params).await?;
        match &body {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            other => Err(RegistrarError::MalformedResponse(format!("contacts/add returned {}", other))),
        }
    }

    /// One contact id per role; roles holding the same person share one contact.
    async fn contact_ids(&self, contacts: &ResolvedContacts) -> Result<Params, RegistrarError> {
        let mut created: Vec<(&ContactInformation, String)> = Vec::new();
        let mut params = Params::new();
        for (role, contact) in contacts.roles() {
            let id = match created.iter().find(|(c, _)| *c == contact) {
                Some((_, id)) => id.clone(),
                None => {
                    let id = self.add_contact(contact).await?;
                    created.push((contact, id.clone()));
                    id
                }
            };
            let key = match role {
                ContactRole::Registrant => "reg-contact-id",
                ContactRole::Admin => "admin-contact-id",
                ContactRole::Tech => "tech-contact-id",
                ContactRole::Billing => "billing-contact-id",
            };
            params.push(Self::p(key, id));
        }
        Ok(params)
    }

    fn action_failed(body: &Value) -> Option<RegistrarError> {
        let status = body["actionstatus"].as_str()?;
        if status.eq_ignore_ascii_case("failed") {
            let message = body["actionstatusdesc"].as_str().unwrap_or("ResellerClub action failed");
            return Some(RegistrarError::vendor(None, message));
        }
        None
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut params = vec![
            Self::p("domain-name", &request.domain_name),
            Self::p("years", request.years),
            Self::p("customer-id", &self.customer_id),
            Self::p("invoice-option", "NoInvoice"),
            Self::p("purchase-privacy", request.privacy_protection),
            Self::p("protect-privacy", request.privacy_protection),
            Self::p("auto-renew", request.auto_renew),
        ];
        params.extend(Self::nameserver_params(&request.nameservers));
        params.extend(self.contact_ids(&contacts).await?);
        let body = self.call(Method::POST, "/domains/register.json", params).await?;
        if let Some(err) = Self::action_failed(&body) {
            return Err(err);
        }
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: transport::loose_u64(&body["entityid"]).map(|id| id.to_string()),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn order_id(&self, domain: &str) -> Result<String, RegistrarError> {
        let body = self
            .call(Method::GET, "/domains/orderid.json", vec![Self::p("domain-name", domain)])
            .await?;
        transport::loose_u64(&body)
            .map(|id| id.to_string())
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("no order id for {}", domain)))
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let order_id = self.order_id(&request.domain_name).await?;
        // exp-date must match the registry's current expiry or the renewal is
        // refused, which is what stops a repeated renewal going through.
        let current = match request.current_expiration {
            Some(exp) => exp,
            None => {
                let details = self
                    .call(
                        Method::GET,
                        "/domains/details.json",
                        vec![Self::p("order-id", &order_id), Self::p("options", "OrderDetails")],
                    )
                    .await?;
                Self::epoch(&details["endtime"]).ok_or_else(|| {
                    RegistrarError::MalformedResponse(format!("no endtime for {}", request.domain_name))
                })?
            }
        };
        let params = vec![
            Self::p("order-id", &order_id),
            Self::p("years", request.years),
            Self::p("exp-date", current.timestamp()),
            Self::p("invoice-option", "NoInvoice"),
        ];
        let body = self.call(Method::POST, "/domains/renew.json", params).await?;
        if let Some(err) = Self::action_failed(&body) {
            return Err(err);
        }
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: Some(order_id),
            expiration_date: Some(years_from(current, request.years)),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let mut params = vec![
            Self::p("domain-name", &request.domain_name),
            Self::p("auth-code", &request.auth_code),
            Self::p("customer-id", &self.customer_id),
            Self::p("invoice-option", "NoInvoice"),
            Self::p("purchase-privacy", request.privacy_protection),
            Self::p("protect-privacy", request.privacy_protection),
            Self::p("auto-renew", request.auto_renew),
        ];
        params.extend(Self::nameserver_params(&request.nameservers));
        params.extend(self.contact_ids(&contacts).await?);
        let body = self.call(Method::POST, "/domains/transfer.json", params).await?;
        if let Some(err) = Self::action_failed(&body) {
            return Err(err);
        }
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: transport::loose_u64(&body["entityid"]).map(|id| id.to_string()),
            status: body["actionstatus"].as_str().unwrap_or("submitted").to_lowercase(),
        })
    }

    fn parse_details(domain: &str, d: &Value) -> DomainInfo {
        let status = d["currentstatus"].as_str().map(DomainStatus::from_vendor).unwrap_or(DomainStatus::Unknown);
        let mut info = DomainInfo::new(d["domainname"].as_str().unwrap_or(domain), status);
        info.registration_date = Self::epoch(&d["creationtime"]);
        info.expiration_date = Self::epoch(&d["endtime"]);
        info.auto_renew = transport::loose_bool(&d["recurring"]).unwrap_or(false);
        info.privacy_protection = transport::loose_bool(&d["isprivacyprotected"]).unwrap_or(false);
        info.registrar_lock = transport::str_array(&d["orderstatus"])
            .iter()
            .any(|s| s.eq_ignore_ascii_case("transferlock"));
        info.nameservers = (1..=13)
            .filter_map(|i| d[format!("ns{}", i).as_str()].as_str().map(String::from))
            .collect();
        info
    }

    async fn details_by_name(&self, domain: &str) -> Result<Value, RegistrarError> {
        require_domain(domain)?;
        self.call(
            Method::GET,
            "/domains/details-by-name.json",
            vec![Self::p("domain-name", domain), Self::p("options", "All")],
        )
        .await
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        let d = self.details_by_name(domain).await?;
        Ok(Self::parse_details(domain, &d))
    }

    async fn order_action(&self, domain: &str, path: &str, mut params: Params) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let order_id = self.order_id(domain).await?;
        params.insert(0, Self::p("order-id", order_id));
        let body = self.call(Method::POST, path, params).await?;
        if let Some(err) = Self::action_failed(&body) {
            return Err(err);
        }
        Ok(DomainChange::new(domain))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let body = self
                .call(
                    Method::GET,
                    "/domains/search.json",
                    vec![Self::p("no-of-records", 100), Self::p("page-no", page)],
                )
                .await?;
            let on_page = transport::loose_u64(&body["recsonpage"]).unwrap_or(0);
            let in_db = transport::loose_u64(&body["recsindb"]).unwrap_or(0);
            for i in 1..=on_page {
                let row = &body[i.to_string().as_str()];
                let Some(name) = row["entity.description"].as_str() else { continue };
                let status = row["entity.currentstatus"]
                    .as_str()
                    .map(DomainStatus::from_vendor)
                    .unwrap_or(DomainStatus::Unknown);
                all.push(RegisteredDomainInfo {
                    domain_name: name.to_string(),
                    status,
                    registration_date: Self::epoch(&row["orders.creationtime"]),
                    expiration_date: Self::epoch(&row["orders.endtime"]),
                    auto_renew: transport::loose_bool(&row["orders.autorenew"]).unwrap_or(false),
                    privacy_protection: false,
                    registrar_lock: false,
                });
            }
            if on_page == 0 || (all.len() as u64) >= in_db {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    fn unsupported<T>(message: &str) -> Result<T, RegistrarError> {
        Err(RegistrarError::Unsupported(message.to_string()))
    }
}

const DNS_UNSUPPORTED: &str = "ResellerClub DNS is managed through the separate DNS API; use a DNS provider instead";

#[async_trait]
impl RegistrarClient for ResellerClubClient {
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
            format!("Transfer of {} {}", t.domain_name, t.status)
        })
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        conclude(PROVIDER, "get_dns_zone", domain, Self::unsupported(DNS_UNSUPPORTED), |_| String::new())
    }

    async fn update_dns_zone(&self, domain: &str, _zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, Self::unsupported(DNS_UNSUPPORTED), |_| String::new())
    }

    async fn add_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, Self::unsupported(DNS_UNSUPPORTED), |_| String::new())
    }

    async fn update_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, Self::unsupported(DNS_UNSUPPORTED), |_| String::new())
    }

    async fn delete_dns_record(&self, domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, Self::unsupported(DNS_UNSUPPORTED), |_| String::new())
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, self.info(domain).await, |i| {
            format!("{} is {}", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        let result = self
            .order_action(domain, "/domains/modify-ns.json", Self::nameserver_params(nameservers))
            .await;
        conclude(PROVIDER, "update_nameservers", domain, result, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let params = vec![Self::p("protect-privacy", enable), Self::p("reason", "Customer request")];
        let result = self.order_action(domain, "/domains/modify-privacy-protection.json", params).await;
        conclude(PROVIDER, "set_privacy_protection", domain, result, |_| {
            format!("Privacy protection {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, _enable: bool) -> DomainUpdateResult {
        let result = Self::unsupported(
            "ResellerClub auto-renewal is a customer billing setting; schedule renew_domain instead",
        );
        conclude(PROVIDER, "set_auto_renew", domain, result, |_| String::new())
    }

    async fn get_supported_tlds(&self, _filter: Option<&[String]>) -> TldListResult {
        let result = Self::unsupported(
            "ResellerClub publishes TLD pricing per reseller plan; use check_availability per domain instead",
        );
        conclude(PROVIDER, "get_supported_tlds", "", result, |_| String::new())
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        conclude(PROVIDER, "get_registered_domains", "", self.list_domains().await, |d| {
            format!("{} domains", d.len())
        })
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        let result = self
            .call(
                Method::GET,
                "/domains/customer-default-ns.json",
                vec![Self::p("customer-id", &self.customer_id)],
            )
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}
