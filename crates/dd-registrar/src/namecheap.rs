/// Namecheap API client.
///
/// Namecheap uses a query-string command API answering with an XML
/// `ApiResponse` document. Replies are parsed into a tree (see [`crate::xml`])
/// and normalised into the neutral types.
///
/// Reference: https://www.namecheap.com/support/api/methods/

use async_trait::async_trait;

use crate::dns_sync;
use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::xml::{self, XmlElement};
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const NAMECHEAP_API: Endpoint = Endpoint {
    live: "https://api.namecheap.com/xml.response",
    sandbox: "https://api.sandbox.namecheap.com/xml.response",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::Namecheap;

type Params = Vec<(String, String)>;

pub struct NamecheapClient {
    http: HttpContext,
    api_user: String,
    api_key: String,
    client_ip: String,
}

impl NamecheapClient {
    pub fn new(api_user: &str, api_key: &str, client_ip: &str, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(NAMECHEAP_API.select(sandbox), options),
            api_user: api_user.to_string(),
            api_key: api_key.to_string(),
            client_ip: client_ip.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn base_params(&self, command: &str) -> Params {
        vec![
            ("ApiUser".into(), self.api_user.clone()),
            ("ApiKey".into(), self.api_key.clone()),
            ("UserName".into(), self.api_user.clone()),
            ("ClientIp".into(), self.client_ip.clone()),
            ("Command".into(), command.to_string()),
        ]
    }

    fn sld_tld(domain: &str) -> Result<(String, String), RegistrarError> {
        split_domain(domain)
            .map(|(sld, tld)| (sld.to_string(), tld.to_string()))
            .ok_or_else(|| RegistrarError::InvalidRequest(format!("invalid domain name '{}'", domain)))
    }

    /// Run one command and return the `CommandResponse` element.
    async fn command(&self, command: &str, extra: Params) -> Result<XmlElement, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, command, "namecheap request");
        let mut params = self.base_params(command);
        params.extend(extra);
        let reply = transport::send_text(self.http.client.get(self.http.url("")).query(&params)).await?;
        let doc = xml::parse(&reply.body)?;

        if doc.attr("Status").map(|s| s.eq_ignore_ascii_case("ERROR")).unwrap_or(false) {
            let errors = doc.find_all("Error");
            let first = errors.first();
            return Err(RegistrarError::vendor_with_details(
                first.and_then(|e| e.attr("Number")).map(String::from),
                first.map(|e| e.text.trim().to_string()).unwrap_or_else(|| "Namecheap API error".into()),
                errors.iter().map(|e| e.text.trim().to_string()).collect(),
            ));
        }
        doc.find("CommandResponse")
            .cloned()
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("{}: no CommandResponse", command)))
    }

    fn contact_params(contacts: &ResolvedContacts) -> Params {
        let mut params = Params::new();
        for (role, c) in contacts.roles() {
            let prefix = match role {
                ContactRole::Registrant => "Registrant",
                ContactRole::Tech => "Tech",
                ContactRole::Admin => "Admin",
                ContactRole::Billing => "AuxBilling",
            };
            let mut push = |field: &str, value: &str| {
                params.push((format!("{}{}", prefix, field), value.to_string()));
            };
            push("FirstName", &c.first_name);
            push("LastName", &c.last_name);
            push("Address1", &c.address1);
            push("City", &c.city);
            push("StateProvince", &c.state);
            push("PostalCode", &c.postal_code);
            push("Country", &c.country);
            push("Phone", &c.phone);
            push("EmailAddress", &c.email);
            if let Some(address2) = &c.address2 {
                push("Address2", address2);
            }
            if let Some(org) = &c.organization {
                push("OrganizationName", org);
            }
        }
        params
    }

    fn yes_no(flag: bool) -> String {
        if flag { "yes".into() } else { "no".into() }
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .command("namecheap.domains.check", vec![("DomainList".into(), domain.to_string())])
            .await?;
        let result = resp
            .find_all("DomainCheckResult")
            .into_iter()
            .find(|r| r.attr("Domain").map(|d| d.eq_ignore_ascii_case(domain)).unwrap_or(true))
            .ok_or_else(|| RegistrarError::MalformedResponse("no DomainCheckResult element".into()))?;

        let mut availability = Availability::new(domain, result.attr_bool("Available").unwrap_or(false));
        availability.is_premium = result.attr_bool("IsPremiumName").unwrap_or(false);
        if availability.is_premium {
            availability.price = result.attr("PremiumRegistrationPrice").and_then(|p| p.parse().ok());
            availability.currency = Some("USD".to_string());
        }
        Ok(availability)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let mut params: Params = vec![
            ("DomainName".into(), request.domain_name.clone()),
            ("Years".into(), request.years.to_string()),
            ("AddFreeWhoisguard".into(), Self::yes_no(request.privacy_protection)),
            ("WGEnabled".into(), Self::yes_no(request.privacy_protection)),
        ];
        if !request.nameservers.is_empty() {
            params.push(("Nameservers".into(), request.nameservers.join(",")));
        }
        params.extend(Self::contact_params(&contacts));

        let resp = self.command("namecheap.domains.create", params).await?;
        let result = resp
            .find("DomainCreateResult")
            .ok_or_else(|| RegistrarError::MalformedResponse("no DomainCreateResult element".into()))?;
        if result.attr_bool("Registered") != Some(true) {
            return Err(RegistrarError::vendor(None, format!("{} was not registered", request.domain_name)));
        }
        let now = chrono::Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: result.attr("OrderID").map(String::from),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let resp = self
            .command(
                "namecheap.domains.renew",
                vec![
                    ("DomainName".into(), request.domain_name.clone()),
                    ("Years".into(), request.years.to_string()),
                ],
            )
            .await?;
        let result = resp
            .find("DomainRenewResult")
            .ok_or_else(|| RegistrarError::MalformedResponse("no DomainRenewResult element".into()))?;
        if result.attr_bool("Renew") != Some(true) {
            return Err(RegistrarError::vendor(None, format!("{} was not renewed", request.domain_name)));
        }
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: result.attr("OrderID").map(String::from),
            expiration_date: result.text_at("ExpiredDate").and_then(parse_timestamp),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let resp = self
            .command(
                "namecheap.domains.transfer.create",
                vec![
                    ("DomainName".into(), request.domain_name.clone()),
                    ("Years".into(), request.years.max(1).to_string()),
                    ("EPPCode".into(), request.auth_code.clone()),
                    ("AddFreeWhoisguard".into(), Self::yes_no(request.privacy_protection)),
                    ("WGEnable".into(), Self::yes_no(request.privacy_protection)),
                ],
            )
            .await?;
        let result = resp
            .find("DomainTransferCreateResult")
            .ok_or_else(|| RegistrarError::MalformedResponse("no DomainTransferCreateResult element".into()))?;
        if result.attr_bool("Transfer") != Some(true) {
            return Err(RegistrarError::vendor(
                result.attr("StatusCode").map(String::from),
                result.attr("StatusDescription").unwrap_or("Transfer was not accepted"),
            ));
        }
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: result.attr("TransferID").map(String::from),
            status: result.attr("StatusDescription").unwrap_or("pending").to_string(),
        })
    }

    async fn hosts(&self, domain: &str) -> Result<Vec<DnsRecordModel>, RegistrarError> {
        require_domain(domain)?;
        let (sld, tld) = Self::sld_tld(domain)?;
        let resp = self
            .command("namecheap.domains.dns.getHosts", vec![("SLD".into(), sld), ("TLD".into(), tld)])
            .await?;
        Ok(resp
            .find_all("host")
            .into_iter()
            .map(|h| {
                let kind = h.attr("Type").unwrap_or("");
                let mut record = DnsRecordModel::new(
                    h.attr("Name").unwrap_or("@"),
                    kind,
                    h.attr("Address").unwrap_or(""),
                    h.attr("TTL").and_then(|t| t.parse().ok()).unwrap_or(1800),
                );
                record.id = h.attr("HostId").and_then(|id| id.parse().ok());
                if kind.eq_ignore_ascii_case("MX") {
                    record.priority = h.attr("MXPref").and_then(|p| p.parse().ok());
                }
                record
            })
            .collect())
    }

    /// `setHosts` replaces the whole host list in one call.
    async fn set_hosts(&self, domain: &str, records: &[DnsRecordModel]) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let (sld, tld) = Self::sld_tld(domain)?;
        let mut params: Params = vec![("SLD".into(), sld), ("TLD".into(), tld)];
        for (i, record) in records.iter().enumerate() {
            let n = i + 1;
            params.push((format!("HostName{}", n), record.name.clone()));
            params.push((format!("RecordType{}", n), record.record_type.clone()));
            params.push((format!("Address{}", n), record.value.clone()));
            params.push((format!("TTL{}", n), record.ttl.to_string()));
            if let Some(priority) = record.priority {
                params.push((format!("MXPref{}", n), priority.to_string()));
            }
        }
        if records.iter().any(|r| r.record_type.eq_ignore_ascii_case("MX")) {
            params.push(("EmailType".into(), "MX".into()));
        }
        let resp = self.command("namecheap.domains.dns.setHosts", params).await?;
        if resp.find("DomainDNSSetHostsResult").and_then(|r| r.attr_bool("IsSuccess")) != Some(true) {
            return Err(RegistrarError::vendor(None, format!("Namecheap did not accept the host list for {}", domain)));
        }
        Ok(DnsChange { domain_name: domain.to_string(), applied: records.len(), record_id: None })
    }

    async fn add_host(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        let mut records = self.hosts(domain).await?;
        records.push(record.clone());
        self.set_hosts(domain, &records).await.map(|c| DnsChange { applied: 1, ..c })
    }

    async fn replace_host(&self, domain: &str, record: &DnsRecordModel, remove: bool) -> Result<DnsChange, RegistrarError> {
        let mut records = self.hosts(domain).await?;
        let record_id = dns_sync::splice(&mut records, domain, record, remove)?;
        self.set_hosts(domain, &records)
            .await
            .map(|c| DnsChange { applied: 1, record_id, ..c })
    }

    fn parse_info(domain: &str, result: &XmlElement) -> DomainInfo {
        let status = match result.attr("Status") {
            Some(s) if s.eq_ignore_ascii_case("ok") => DomainStatus::Active,
            Some(s) => DomainStatus::from_vendor(s),
            None => DomainStatus::Unknown,
        };
        let mut info = DomainInfo::new(result.attr("DomainName").unwrap_or(domain), status);
        info.registration_date = result.text_at("DomainDetails/CreatedDate").and_then(parse_timestamp);
        info.expiration_date = result.text_at("DomainDetails/ExpiredDate").and_then(parse_timestamp);
        info.privacy_protection = result.find("Whoisguard").and_then(|w| w.attr_bool("Enabled")).unwrap_or(false);
        info.nameservers = result
            .find("DnsDetails")
            .map(|d| d.find_all("Nameserver").iter().map(|n| n.text.trim().to_string()).collect())
            .unwrap_or_default();
        info
    }

    async fn get_info(&self, domain: &str) -> Result<XmlElement, RegistrarError> {
        require_domain(domain)?;
        let resp = self
            .command("namecheap.domains.getInfo", vec![("DomainName".into(), domain.to_string())])
            .await?;
        resp.find("DomainGetInfoResult")
            .cloned()
            .ok_or_else(|| RegistrarError::MalformedResponse("no DomainGetInfoResult element".into()))
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        let result = self.get_info(domain).await?;
        let mut info = Self::parse_info(domain, &result);
        // getInfo omits lock and auto-renew; the list row carries them.
        if let Some(row) = self.list_domains().await?.into_iter().find(|d| d.domain_name.eq_ignore_ascii_case(domain)) {
            info.registrar_lock = row.registrar_lock;
            info.auto_renew = row.auto_renew;
            if row.status == DomainStatus::Expired {
                info.status = DomainStatus::Expired;
            }
        }
        Ok(info)
    }

    async fn set_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        if nameservers.is_empty() {
            return Err(RegistrarError::InvalidRequest("at least one nameserver is required".into()));
        }
        let (sld, tld) = Self::sld_tld(domain)?;
        let resp = self
            .command(
                "namecheap.domains.dns.setCustom",
                vec![("SLD".into(), sld), ("TLD".into(), tld), ("Nameservers".into(), nameservers.join(","))],
            )
            .await?;
        if resp.find("DomainDNSSetCustomResult").and_then(|r| r.attr_bool("Updated")) == Some(false) {
            return Err(RegistrarError::vendor(None, "Namecheap did not update the nameservers"));
        }
        Ok(DomainChange::new(domain))
    }

    async fn privacy(&self, domain: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        let info = self.get_info(domain).await?;
        let whoisguard_id = info
            .text_at("Whoisguard/ID")
            .filter(|id| *id != "0")
            .ok_or_else(|| {
                RegistrarError::vendor(
                    Some("NO_WHOISGUARD".into()),
                    format!("{} has no WhoisGuard subscription", domain),
                )
            })?
            .to_string();
        let mut params: Params = vec![("WhoisguardID".into(), whoisguard_id)];
        let command = if enable {
            let email = info.text_at("Whoisguard/EmailDetails").unwrap_or("").to_string();
            if !email.is_empty() {
                params.push(("ForwardedToEmail".into(), email));
            }
            "namecheap.whoisguard.enable"
        } else {
            "namecheap.whoisguard.disable"
        };
        self.command(command, params).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let resp = self.command("namecheap.domains.getTldList", Vec::new()).await?;
        let tlds = resp
            .find_all("Tld")
            .into_iter()
            .filter(|t| t.attr_bool("IsApiRegisterable").unwrap_or(true))
            .filter_map(|t| {
                let mut tld = TldInfo::new(t.attr("Name")?, "USD");
                tld.min_registration_years = t.attr("MinRegisterYears").and_then(|v| v.parse().ok()).unwrap_or(1);
                tld.max_registration_years = t.attr("MaxRegisterYears").and_then(|v| v.parse().ok()).unwrap_or(10);
                tld.supports_privacy = t.attr_bool("IsSupportsWhoisguard").unwrap_or(true);
                tld.supports_dnssec = t.attr_bool("SupportsDnssec").unwrap_or(false);
                if let Some(kind) = t.attr("Type") {
                    tld.is_country_code = kind.eq_ignore_ascii_case("CCTLD");
                }
                Some(tld)
            })
            .collect();
        Ok(filter_tlds(tlds, filter))
    }

    fn parse_domain_row(d: &XmlElement) -> RegisteredDomainInfo {
        let is_expired = d.attr_bool("IsExpired").unwrap_or(false);
        let is_locked = d.attr_bool("IsLocked").unwrap_or(false);
        RegisteredDomainInfo {
            domain_name: d.attr("Name").unwrap_or("").to_string(),
            status: if is_expired { DomainStatus::Expired } else { DomainStatus::Active },
            registration_date: d.attr("Created").and_then(parse_timestamp),
            expiration_date: d.attr("Expires").and_then(parse_timestamp),
            auto_renew: d.attr_bool("AutoRenew").unwrap_or(false),
            privacy_protection: d
                .attr("WhoisGuard")
                .map(|v| v.eq_ignore_ascii_case("enabled") || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            registrar_lock: is_locked,
        }
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let resp = self
                .command(
                    "namecheap.domains.getList",
                    vec![("PageSize".into(), "100".into()), ("Page".into(), page.to_string())],
                )
                .await?;
            let rows: Vec<RegisteredDomainInfo> = resp.find_all("Domain").into_iter().map(Self::parse_domain_row).collect();
            let total: usize = resp.text_at("Paging/TotalItems").and_then(|t| t.parse().ok()).unwrap_or(0);
            let fetched = rows.len();
            all.extend(rows);
            if fetched == 0 || all.len() >= total {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl RegistrarClient for NamecheapClient {
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
        let result = self.hosts(domain).await.map(|records| DnsZone {
            domain_name: domain.to_string(),
            records,
            nameservers: None,
        });
        conclude(PROVIDER, "get_dns_zone", domain, result, |z| format!("{} DNS records", z.records.len()))
    }

    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, self.set_hosts(domain, &zone.records).await, |c| {
            format!("Replaced zone with {} records", c.applied)
        })
    }

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "add_dns_record", domain, self.add_host(domain, record).await, |_| {
            format!("Added {}", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, self.replace_host(domain, record, false).await, |_| {
            format!("Updated {}", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, self.replace_host(domain, record, true).await, |_| {
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
        conclude(PROVIDER, "set_privacy_protection", domain, self.privacy(domain, enable).await, |_| {
            format!("WhoisGuard {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, _enable: bool) -> DomainUpdateResult {
        conclude(
            PROVIDER,
            "set_auto_renew",
            domain,
            Err(RegistrarError::Unsupported(
                "Namecheap exposes no auto-renew setting over the API; schedule renew_domain before expiry instead".into(),
            )),
            |_| String::new(),
        )
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
        // Cheapest call: list domains page 1 with 1 result
        let result = self
            .command("namecheap.domains.getList", vec![("PageSize".into(), "1".into())])
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer) -> NamecheapClient {
        NamecheapClient::new("ncuser", "nckey", "203.0.113.5", true, &options()).with_base_url(&server.base())
    }

    fn ok(command: &str, inner: &str) -> MockReply {
        MockReply::xml(
            200,
            &format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK" xmlns="http://api.namecheap.com/xml.response">
  <Errors /><RequestedCommand>{}</RequestedCommand>
  <CommandResponse Type="{}">{}</CommandResponse>
</ApiResponse>"#,
                command, command, inner
            ),
        )
    }

    #[test]
    fn sandbox_flag_selects_sandbox_host() {
        let c = NamecheapClient::new("u", "k", "127.0.0.1", true, &options());
        assert!(c.http.base_url().contains("sandbox"));
        let c = NamecheapClient::new("u", "k", "127.0.0.1", false, &options());
        assert!(!c.http.base_url().contains("sandbox"));
    }

    #[tokio::test]
    async fn availability_parses_domain_check_result() {
        let server = MockServer::start(|req| {
            assert_eq!(req.query_param("Command").as_deref(), Some("namecheap.domains.check"));
            assert_eq!(req.query_param("ApiUser").as_deref(), Some("ncuser"));
            assert_eq!(req.query_param("ClientIp").as_deref(), Some("203.0.113.5"));
            match req.query_param("DomainList").as_deref() {
                Some("free.com") => ok("namecheap.domains.check", r#"<DomainCheckResult Domain="free.com" Available="true" IsPremiumName="false" />"#),
                _ => ok("namecheap.domains.check", r#"<DomainCheckResult Domain="taken.com" Available="false" />"#),
            }
        })
        .await;
        let c = client(&server);
        assert!(c.check_availability("free.com").await.data().unwrap().is_available);
        assert!(!c.check_availability("taken.com").await.data().unwrap().is_available);
    }

    #[tokio::test]
    async fn error_response_carries_error_number() {
        let server = MockServer::start(|_| {
            MockReply::xml(
                200,
                r#"<ApiResponse Status="ERROR"><Errors><Error Number="2019166">Domain not found</Error></Errors><CommandResponse /></ApiResponse>"#,
            )
        })
        .await;
        let env = client(&server).get_domain_info("missing.com").await;
        assert!(!env.is_success());
        assert_eq!(env.error_code(), Some("2019166"));
        assert_eq!(env.message(), "Domain not found");
    }

    #[tokio::test]
    async fn registration_marshals_all_four_roles() {
        let server = MockServer::start(|_| {
            ok(
                "namecheap.domains.create",
                r#"<DomainCreateResult Domain="fresh.com" Registered="true" ChargedAmount="8.88" DomainID="9007" OrderID="196074" TransactionID="380716" />"#,
            )
        })
        .await;
        let env = client(&server).register_domain(&registration("fresh.com", 2)).await;
        assert!(env.is_success(), "{:?}", env);
        assert_eq!(env.data().unwrap().order_id.as_deref(), Some("196074"));

        let req = &server.requests()[0];
        for prefix in ["Registrant", "Tech", "Admin", "AuxBilling"] {
            assert_eq!(req.query_param(&format!("{}FirstName", prefix)).as_deref(), Some("Jane"));
            assert_eq!(req.query_param(&format!("{}Address2", prefix)).as_deref(), Some("Suite 5"));
            assert_eq!(req.query_param(&format!("{}EmailAddress", prefix)).as_deref(), Some("jane@example.net"));
        }
        assert_eq!(req.query_param("Years").as_deref(), Some("2"));
        assert_eq!(req.query_param("Nameservers").as_deref(), Some("ns1.example.net,ns2.example.net"));
        assert_eq!(req.query_param("WGEnabled").as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn info_reads_details_and_list_flags() {
        let server = MockServer::start(|req| match req.query_param("Command").as_deref() {
            Some("namecheap.domains.getInfo") => ok(
                "namecheap.domains.getInfo",
                r#"<DomainGetInfoResult Status="Ok" ID="5" DomainName="example.com" OwnerName="ncuser" IsOwner="true">
                     <DomainDetails><CreatedDate>06/02/2011</CreatedDate><ExpiredDate>06/02/2027</ExpiredDate></DomainDetails>
                     <Whoisguard Enabled="True"><ID>53536</ID></Whoisguard>
                     <DnsDetails ProviderType="CUSTOM" IsUsingOurDNS="false">
                       <Nameserver>ns1.example.net</Nameserver><Nameserver>ns2.example.net</Nameserver>
                     </DnsDetails>
                   </DomainGetInfoResult>"#,
            ),
            _ => ok(
                "namecheap.domains.getList",
                r#"<DomainGetListResult>
                     <Domain ID="5" Name="example.com" Created="06/02/2011" Expires="06/02/2027" IsExpired="false" IsLocked="true" AutoRenew="true" WhoisGuard="ENABLED" />
                   </DomainGetListResult>
                   <Paging><TotalItems>1</TotalItems><CurrentPage>1</CurrentPage><PageSize>100</PageSize></Paging>"#,
            ),
        })
        .await;
        let env = client(&server).get_domain_info("example.com").await;
        let info = env.data().unwrap();
        assert_eq!(info.status, DomainStatus::Active);
        assert_eq!(info.nameservers, vec!["ns1.example.net", "ns2.example.net"]);
        assert!(info.privacy_protection);
        assert!(info.registrar_lock);
        assert!(info.auto_renew);
        assert_eq!(info.expiration_date, parse_timestamp("2027-06-02"));
    }

    #[tokio::test]
    async fn record_delete_rewrites_host_list() {
        let server = MockServer::start(|req| match req.query_param("Command").as_deref() {
            Some("namecheap.domains.dns.getHosts") => ok(
                "namecheap.domains.dns.getHosts",
                r#"<DomainDNSGetHostsResult Domain="example.com" IsUsingOurDNS="true">
                     <host HostId="1" Name="@" Type="A" Address="192.0.2.1" MXPref="10" TTL="1800" />
                     <host HostId="2" Name="www" Type="CNAME" Address="example.com." MXPref="10" TTL="1800" />
                   </DomainDNSGetHostsResult>"#,
            ),
            _ => ok(
                "namecheap.domains.dns.setHosts",
                r#"<DomainDNSSetHostsResult Domain="example.com" IsSuccess="true" />"#,
            ),
        })
        .await;
        let mut target = DnsRecordModel::new("www", "CNAME", "example.com.", 1800);
        target.id = Some(2);
        let env = client(&server).delete_dns_record("example.com", &target).await;
        assert!(env.is_success(), "{:?}", env);

        let set = &server.requests()[1];
        assert_eq!(set.query_param("HostName1").as_deref(), Some("@"));
        assert!(set.query_param("HostName2").is_none());
        assert!(set.query_param("MXPref1").is_none());
    }
}
