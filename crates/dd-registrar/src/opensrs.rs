/// OpenSRS reseller API client.
///
/// Every call POSTs one XML command document carrying its own `<auth>`
/// block. Replies are a `<response>` holding a `<result code=".." success="..">`
/// element with a `<message>` and an `<attributes>` subtree. Codes 200 and
/// 210 are successes; 210/211 are the availability answers for lookups.
///
/// Reference: https://domains.opensrs.guide/docs

use async_trait::async_trait;
use chrono::{Datelike, Utc};

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

const OPENSRS_API: Endpoint = Endpoint {
    live: "https://rr-n1-tor.opensrs.net:55443",
    sandbox: "https://horizon.opensrs.net:55443",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::OpenSrs;

const CODE_OK: &str = "200";
const CODE_AVAILABLE: &str = "210";
const CODE_TAKEN: &str = "211";

pub struct OpenSrsClient {
    http: HttpContext,
    username: String,
    api_key: String,
}

impl OpenSrsClient {
    pub fn new(username: &str, api_key: &str, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(OPENSRS_API.select(sandbox), options),
            username: username.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn document(&self, action: &str, object: &str, attributes: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<request><auth>{}{}</auth>\
             <command action=\"{}\" object=\"{}\"><attributes>{}</attributes></command></request>",
            xml::tag("user", &self.username),
            xml::tag("key", &self.api_key),
            xml::escape(action),
            xml::escape(object),
            attributes
        )
    }

    /// Run one command and return the `result` element. Lookups answer with
    /// 210/211, which are not errors.
    async fn command(&self, action: &str, object: &str, attributes: String) -> Result<XmlElement, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, action, object, "opensrs request");
        let req = self
            .http
            .client
            .post(self.http.url("/"))
            .header("Content-Type", "text/xml")
            .body(self.document(action, object, &attributes));
        let reply = transport::send_text(req).await?;
        let doc = xml::parse(&reply.body)?;
        let result = doc
            .find("result")
            .cloned()
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("{} {}: no result element", action, object)))?;

        let code = result.attr("code").unwrap_or("").to_string();
        let success = result.attr_bool("success").unwrap_or(false);
        if success || code == CODE_OK || code == CODE_AVAILABLE || code == CODE_TAKEN {
            return Ok(result);
        }
        let details: Vec<String> = result
            .find_all("error")
            .iter()
            .map(|e| e.text.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Err(RegistrarError::vendor_with_details(
            Some(code),
            result.text_at("message").unwrap_or("OpenSRS rejected the command"),
            details,
        ))
    }

    fn attributes(result: &XmlElement) -> XmlElement {
        result.child("attributes").cloned().unwrap_or_default()
    }

    fn flag(value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn contact(role: &str, c: &ContactInformation) -> String {
        let mut out = format!("<{}>", role);
        out.push_str(&xml::tag("first_name", &c.first_name));
        out.push_str(&xml::tag("last_name", &c.last_name));
        out.push_str(&xml::tag("org_name", c.organization.as_deref().unwrap_or(&c.full_name())));
        out.push_str(&xml::tag("address1", &c.address1));
        out.push_str(&xml::tag("address2", c.address2.as_deref().unwrap_or("")));
        out.push_str(&xml::tag("city", &c.city));
        out.push_str(&xml::tag("state", &c.state));
        out.push_str(&xml::tag("postal_code", &c.postal_code));
        out.push_str(&xml::tag("country", &c.country));
        out.push_str(&xml::tag("phone", &c.phone));
        out.push_str(&xml::tag("email", &c.email));
        out.push_str(&format!("</{}>", role));
        out
    }

    fn contact_set(contacts: &ResolvedContacts) -> String {
        format!(
            "<contact_set>{}{}{}{}</contact_set>",
            Self::contact("owner", &contacts.registrant),
            Self::contact("admin", &contacts.admin),
            Self::contact("tech", &contacts.tech),
            Self::contact("billing", &contacts.billing)
        )
    }

    fn nameserver_list(nameservers: &[String]) -> String {
        let items: String = nameservers.iter().map(|ns| xml::tag("nameserver", ns)).collect();
        format!("<nameserver_list>{}</nameserver_list>", items)
    }

    /// `reg_type` is `new` for registrations and `transfer` for transfers in.
    #[allow(clippy::too_many_arguments)]
    fn sw_register(
        domain: &str,
        reg_type: &str,
        years: u32,
        auto_renew: bool,
        privacy: bool,
        nameservers: &[String],
        contacts: &ResolvedContacts,
        auth_code: Option<&str>,
    ) -> String {
        let mut attrs = String::new();
        attrs.push_str(&xml::tag("domain", domain));
        attrs.push_str(&xml::tag("reg_type", reg_type));
        attrs.push_str(&xml::tag("period", &years.max(1).to_string()));
        attrs.push_str(&xml::tag("auto_renew", Self::flag(auto_renew)));
        attrs.push_str(&xml::tag("f_whois_privacy", Self::flag(privacy)));
        attrs.push_str(&xml::tag("handle", "process"));
        // OpenSRS keeps a per-domain management login; generated, never reused.
        attrs.push_str(&xml::tag("reg_username", &domain.replace('.', "").chars().take(20).collect::<String>()));
        attrs.push_str(&xml::tag("reg_password", &uuid::Uuid::new_v4().simple().to_string()));
        if let Some(code) = auth_code {
            attrs.push_str(&xml::tag("auth_info", code));
        }
        if !nameservers.is_empty() {
            attrs.push_str(&Self::nameserver_list(nameservers));
            attrs.push_str(&xml::tag("custom_nameservers", "1"));
        }
        attrs.push_str(&Self::contact_set(contacts));
        attrs
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let result = self.command("LOOKUP", "DOMAIN", xml::tag("domain", domain)).await?;
        let code = result.attr("code").unwrap_or("");
        let mut availability = match code {
            CODE_AVAILABLE => Availability::new(domain, true),
            CODE_TAKEN => Availability::new(domain, false),
            other => {
                return Err(RegistrarError::MalformedResponse(format!(
                    "unexpected LOOKUP code {} for {}",
                    other, domain
                )))
            }
        };
        let attrs = Self::attributes(&result);
        availability.is_premium = attrs.text_at("price_status").map(|s| s.eq_ignore_ascii_case("premium")).unwrap_or(false);
        availability.price = attrs.text_at("price").and_then(|p| p.parse().ok());
        if availability.price.is_some() {
            availability.currency = Some(attrs.text_at("currency").unwrap_or("USD").to_string());
        }
        Ok(availability)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let attrs = Self::sw_register(
            &request.domain_name,
            "new",
            request.years,
            request.auto_renew,
            request.privacy_protection,
            &request.nameservers,
            &contacts,
            None,
        );
        let result = self.command("SW_REGISTER", "DOMAIN", attrs).await?;
        let attrs = Self::attributes(&result);
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: attrs.text_at("id").map(String::from),
            registration_date: Some(now),
            expiration_date: Some(years_from(now, request.years)),
        })
    }

    async fn get_info(&self, domain: &str) -> Result<XmlElement, RegistrarError> {
        require_domain(domain)?;
        let attrs = format!("{}{}", xml::tag("domain", domain), xml::tag("type", "all_info"));
        let result = self.command("GET", "DOMAIN", attrs).await?;
        Ok(Self::attributes(&result))
    }

    fn parse_info(domain: &str, attrs: &XmlElement) -> DomainInfo {
        let expiration = attrs.text_at("expiredate").and_then(parse_timestamp);
        let status = match attrs.text_at("status") {
            Some(raw) => DomainStatus::from_vendor(raw),
            None => match expiration {
                Some(exp) if exp < Utc::now() => DomainStatus::Expired,
                _ => DomainStatus::Active,
            },
        };
        let mut info = DomainInfo::new(domain, status);
        info.registration_date = attrs.text_at("registry_createdate").and_then(parse_timestamp);
        info.expiration_date = expiration;
        info.updated_date = attrs.text_at("registry_updatedate").and_then(parse_timestamp);
        info.auto_renew = attrs.bool_at("auto_renew").unwrap_or(false);
        info.privacy_protection = attrs
            .text_at("whois_privacy_state")
            .map(|s| s.eq_ignore_ascii_case("enabled"))
            .unwrap_or(false);
        info.registrar_lock = attrs
            .text_at("lock_state")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("locked"))
            .unwrap_or(false);
        info.nameservers = attrs
            .find("nameserver_list")
            .map(|list| list.find_all("name").iter().map(|n| n.text.trim().to_string()).collect())
            .unwrap_or_default();
        info
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        let attrs = self.get_info(domain).await?;
        Ok(Self::parse_info(domain, &attrs))
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let current = match request.current_expiration {
            Some(exp) => exp,
            None => self.info(&request.domain_name).await?.expiration_date.ok_or_else(|| {
                RegistrarError::MalformedResponse(format!("no expiredate for {}", request.domain_name))
            })?,
        };
        let attrs = format!(
            "{}{}{}{}",
            xml::tag("domain", &request.domain_name),
            xml::tag("period", &request.years.to_string()),
            xml::tag("currentexpirationyear", &current.year().to_string()),
            xml::tag("handle", "process")
        );
        let result = self.command("RENEW", "DOMAIN", attrs).await?;
        let attrs = Self::attributes(&result);
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: attrs.text_at("order_id").map(String::from),
            expiration_date: attrs
                .text_at("registration_expiration_date")
                .or_else(|| attrs.text_at("expiredate"))
                .and_then(parse_timestamp)
                .or_else(|| Some(years_from(current, request.years))),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let contacts = request.contacts.resolve();
        let attrs = Self::sw_register(
            &request.domain_name,
            "transfer",
            request.years,
            request.auto_renew,
            request.privacy_protection,
            &request.nameservers,
            &contacts,
            Some(&request.auth_code),
        );
        let result = self.command("SW_REGISTER", "DOMAIN", attrs).await?;
        let attrs = Self::attributes(&result);
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: attrs.text_at("id").map(String::from),
            status: attrs.text_at("transfer_status").unwrap_or("pending_owner").to_string(),
        })
    }

    async fn zone(&self, domain: &str) -> Result<Vec<DnsRecordModel>, RegistrarError> {
        require_domain(domain)?;
        let result = self.command("GET_DNS_ZONE", "DOMAIN", xml::tag("domain", domain)).await?;
        let attrs = Self::attributes(&result);
        Ok(attrs
            .find_all("record")
            .into_iter()
            .map(|r| {
                let name = r.attr("subdomain").filter(|s| !s.is_empty()).unwrap_or("@");
                let mut record = DnsRecordModel::new(
                    name,
                    r.attr("type").unwrap_or(""),
                    r.attr("value").unwrap_or(""),
                    r.attr("ttl").and_then(|t| t.parse().ok()).unwrap_or(3600),
                );
                record.priority = r.attr("priority").and_then(|p| p.parse().ok());
                record
            })
            .collect())
    }

    /// `SET_DNS_ZONE` replaces every record in one call.
    async fn set_zone(&self, domain: &str, records: &[DnsRecordModel]) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        let mut body = String::from("<records>");
        for r in records {
            let subdomain = if r.name == "@" { "" } else { r.name.as_str() };
            body.push_str(&format!(
                "<record type=\"{}\" subdomain=\"{}\" value=\"{}\" ttl=\"{}\"",
                xml::escape(&r.record_type),
                xml::escape(subdomain),
                xml::escape(&r.value),
                r.ttl
            ));
            if let Some(priority) = r.priority {
                body.push_str(&format!(" priority=\"{}\"", priority));
            }
            body.push_str("/>");
        }
        body.push_str("</records>");
        let attrs = format!("{}{}", xml::tag("domain", domain), body);
        self.command("SET_DNS_ZONE", "DOMAIN", attrs).await?;
        Ok(DnsChange { domain_name: domain.to_string(), applied: records.len(), record_id: None })
    }

    async fn add_record(&self, domain: &str, record: &DnsRecordModel) -> Result<DnsChange, RegistrarError> {
        let mut records = self.zone(domain).await?;
        records.push(record.clone());
        self.set_zone(domain, &records).await.map(|c| DnsChange { applied: 1, ..c })
    }

    async fn edit_record(&self, domain: &str, record: &DnsRecordModel, remove: bool) -> Result<DnsChange, RegistrarError> {
        let mut records = self.zone(domain).await?;
        let record_id = dns_sync::splice(&mut records, domain, record, remove)?;
        self.set_zone(domain, &records)
            .await
            .map(|c| DnsChange { applied: 1, record_id, ..c })
    }

    async fn set_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let assign: String = nameservers.iter().map(|ns| xml::tag("name", ns)).collect();
        let attrs = format!(
            "{}{}<assign_ns>{}</assign_ns>",
            xml::tag("domain", domain),
            xml::tag("op_type", "assign"),
            assign
        );
        self.command("ADVANCED_UPDATE_NAMESERVERS", "DOMAIN", attrs).await?;
        Ok(DomainChange::new(domain))
    }

    async fn modify(&self, domain: &str, data: &str, fields: String) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let attrs = format!("{}{}{}", xml::tag("domain", domain), xml::tag("data", data), fields);
        self.command("MODIFY", "DOMAIN", attrs).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let result = self.command("GET_PRICE_LIST", "DOMAIN", String::new()).await?;
        let attrs = Self::attributes(&result);
        let tlds = attrs
            .find_all("tld")
            .into_iter()
            .filter_map(|t| {
                let name = t.attr("name")?;
                let mut tld = TldInfo::new(name, t.attr("currency").unwrap_or("USD"));
                tld.registration_price = t.attr("register").and_then(|p| p.parse().ok());
                tld.renewal_price = t.attr("renew").and_then(|p| p.parse().ok());
                tld.transfer_price = t.attr("transfer").and_then(|p| p.parse().ok());
                tld.supports_privacy = t.attr_bool("whois_privacy").unwrap_or(false);
                tld.supports_dnssec = t.attr_bool("dnssec").unwrap_or(false);
                Some(tld)
            })
            .collect();
        Ok(filter_tlds(tlds, filter))
    }

    /// Walks `GET_DOMAINS_BY_EXPIREDATE` from today over the next ten years.
    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let today = Utc::now();
        let until = years_from(today, 10);
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let attrs = format!(
                "{}{}{}{}",
                xml::tag("exp_from", &today.format("%Y-%m-%d").to_string()),
                xml::tag("exp_to", &until.format("%Y-%m-%d").to_string()),
                xml::tag("page", &page.to_string()),
                xml::tag("limit", "100")
            );
            let result = self.command("GET_DOMAINS_BY_EXPIREDATE", "DOMAIN", attrs).await?;
            let attrs = Self::attributes(&result);
            for d in attrs.find_all("domain") {
                let Some(name) = d.attr("name") else { continue };
                let expiration = d.attr("expiredate").and_then(parse_timestamp);
                all.push(RegisteredDomainInfo {
                    domain_name: name.to_string(),
                    status: match expiration {
                        Some(exp) if exp < Utc::now() => DomainStatus::Expired,
                        _ => DomainStatus::Active,
                    },
                    registration_date: None,
                    expiration_date: expiration,
                    auto_renew: d.attr_bool("f_auto_renew").unwrap_or(false),
                    privacy_protection: false,
                    registrar_lock: d.attr_bool("f_lock").unwrap_or(false),
                });
            }
            if !attrs.bool_at("remainder").unwrap_or(false) {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl RegistrarClient for OpenSrsClient {
    fn provider(&self) -> RegistrarProvider {
        PROVIDER
    }

    async fn check_availability(&self, domain: &str) -> DomainAvailabilityResult {
        conclude(PROVIDER, "check_availability", domain, self.availability(domain).await, |a| {
            if a.is_available { format!("{} is available", domain) } else { format!("{} is taken", domain) }
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
        let state = xml::tag("state", if enable { "enable" } else { "disable" });
        conclude(PROVIDER, "set_privacy_protection", domain, self.modify(domain, "whois_privacy_state", state).await, |_| {
            format!("WHOIS privacy {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        let fields = format!("{}{}", xml::tag("auto_renew", Self::flag(enable)), xml::tag("let_expire", "0"));
        conclude(PROVIDER, "set_auto_renew", domain, self.modify(domain, "expire_action", fields).await, |_| {
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
            .command("GET_BALANCE", "BALANCE", String::new())
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer, RecordedRequest};
    use chrono::TimeZone;

    fn client(server: &MockServer) -> OpenSrsClient {
        OpenSrsClient::new("reseller", "k3y", false, &options()).with_base_url(&server.base())
    }

    fn reply(code: &str, success: bool, message: &str, attributes: &str) -> MockReply {
        MockReply::xml(
            200,
            &format!(
                "<response><result code=\"{}\" success=\"{}\"><message>{}</message>\
                 <attributes>{}</attributes></result></response>",
                code,
                if success { 1 } else { 0 },
                message,
                attributes
            ),
        )
    }

    fn command_of(req: &RecordedRequest) -> (String, String) {
        let doc = xml::parse(&req.body).unwrap();
        let cmd = doc.find("command").unwrap();
        (cmd.attr("action").unwrap().to_string(), cmd.attr("object").unwrap().to_string())
    }

    #[test]
    fn sandbox_flag_selects_horizon() {
        let c = OpenSrsClient::new("u", "k", true, &options());
        assert!(c.http.base_url().contains("horizon.opensrs.net"));
    }

    #[tokio::test]
    async fn lookup_codes_map_to_availability() {
        let server = MockServer::start(|req| {
            if req.body.contains("<domain>free.com</domain>") {
                reply("210", true, "Domain available", "<status>available</status>")
            } else {
                reply("211", true, "Domain taken", "<status>taken</status>")
            }
        })
        .await;
        let c = client(&server);
        assert!(c.check_availability("free.com").await.data().unwrap().is_available);
        assert!(!c.check_availability("taken.com").await.data().unwrap().is_available);

        let doc = xml::parse(&server.requests()[0].body).unwrap();
        assert_eq!(doc.text_at("auth/user"), Some("reseller"));
        assert_eq!(doc.text_at("auth/key"), Some("k3y"));
        assert_eq!(command_of(&server.requests()[0]), ("LOOKUP".into(), "DOMAIN".into()));
    }

    #[tokio::test]
    async fn failure_code_and_message_are_kept() {
        let server = MockServer::start(|_| reply("465", false, "Domain already renewed", "")).await;
        let env = client(&server)
            .renew_domain(&DomainRenewalRequest {
                domain_name: "example.com".into(),
                years: 1,
                current_expiration: Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()),
            })
            .await;
        assert!(!env.is_success());
        assert_eq!(env.error_code(), Some("465"));
        assert_eq!(env.message(), "Domain already renewed");
        assert!(server.requests()[0].body.contains("<currentexpirationyear>2027</currentexpirationyear>"));
    }

    #[tokio::test]
    async fn registration_sends_every_contact_role() {
        let server = MockServer::start(|_| reply("200", true, "Registration successful", "<id>3735281</id>")).await;
        let env = client(&server).register_domain(&registration("fresh.com", 2)).await;
        assert_eq!(env.data().unwrap().order_id.as_deref(), Some("3735281"));

        let doc = xml::parse(&server.requests()[0].body).unwrap();
        let set = doc.find("contact_set").unwrap();
        for role in ["owner", "admin", "tech", "billing"] {
            let c = set.child(role).unwrap();
            assert_eq!(c.text_at("email"), Some("jane@example.net"));
            assert_eq!(c.text_at("address2"), Some("Suite 5"));
            assert_eq!(c.text_at("org_name"), Some("Acme Hosting"));
        }
        assert_eq!(doc.text_at("reg_type"), Some("new"));
        assert_eq!(doc.text_at("period"), Some("2"));
        assert_eq!(doc.find("nameserver_list").unwrap().children.len(), 2);
    }

    #[tokio::test]
    async fn info_is_parsed_fully() {
        let server = MockServer::start(|_| {
            reply(
                "200",
                true,
                "Query successful",
                "<expiredate>2030-02-03 10:00:00</expiredate>\
                 <registry_createdate>2020-02-03 10:00:00</registry_createdate>\
                 <auto_renew>1</auto_renew><lock_state>1</lock_state>\
                 <whois_privacy_state>enabled</whois_privacy_state>\
                 <nameserver_list><item><name>ns1.systemdns.com</name></item><item><name>ns2.systemdns.com</name></item></nameserver_list>",
            )
        })
        .await;
        let info = client(&server).get_domain_info("example.com").await.into_data().unwrap();
        assert_eq!(info.status, DomainStatus::Active);
        assert_eq!(info.expiration_date, Some(Utc.with_ymd_and_hms(2030, 2, 3, 10, 0, 0).unwrap()));
        assert!(info.auto_renew && info.registrar_lock && info.privacy_protection);
        assert_eq!(info.nameservers, vec!["ns1.systemdns.com", "ns2.systemdns.com"]);
    }

    #[tokio::test]
    async fn record_update_rewrites_zone() {
        let server = MockServer::start(|req| match command_of(req).0.as_str() {
            "GET_DNS_ZONE" => reply(
                "200",
                true,
                "ok",
                "<records><record type=\"A\" subdomain=\"\" value=\"192.0.2.1\" ttl=\"3600\"/>\
                 <record type=\"MX\" subdomain=\"\" value=\"mx.example.net\" ttl=\"3600\" priority=\"10\"/></records>",
            ),
            _ => reply("200", true, "ok", ""),
        })
        .await;
        let record = DnsRecordModel::new("@", "A", "192.0.2.50", 600);
        let env = client(&server).update_dns_record("example.com", &record).await;
        assert!(env.is_success());

        let set = &server.requests()[1];
        assert_eq!(command_of(set).0, "SET_DNS_ZONE");
        let doc = xml::parse(&set.body).unwrap();
        let records = doc.find_all("record");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attr("value"), Some("192.0.2.50"));
        assert_eq!(records[1].attr("priority"), Some("10"));
    }
}
