/// DomainNameApi client (SOAP 1.1).
///
/// Each operation is a SOAP envelope with an `<Authentication>` header and a
/// single `<request>` element in the body; the reply carries
/// `OperationResult` (`SUCCESS`/`ERROR`), `ErrorCode` and `OperationMessage`
/// next to the payload. Faults arrive as `soap:Fault` with HTTP 500.
///
/// Reference: https://www.domainnameapi.com/domain-reseller-api

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, Endpoint, HttpContext, TransportOptions};
use crate::types::*;
use crate::xml::{self, XmlElement};
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

const DOMAINNAMEAPI: Endpoint = Endpoint {
    live: "https://whmcs.domainnameapi.com/DomainApi.svc",
    sandbox: "https://ote-api.domainnameapi.com/DomainApi.svc",
};
const PROVIDER: RegistrarProvider = RegistrarProvider::DomainNameApi;
const NAMESPACE: &str = "http://www.domainnameapi.com/services/";
const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";

pub struct DomainNameApiClient {
    http: HttpContext,
    username: String,
    password: String,
}

impl DomainNameApiClient {
    pub fn new(username: &str, password: &str, sandbox: bool, options: &TransportOptions) -> Self {
        Self {
            http: HttpContext::new(DOMAINNAMEAPI.select(sandbox), options),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn envelope(&self, operation: &str, request: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <soap:Envelope xmlns:soap=\"{env}\">\
             <soap:Header><Authentication xmlns=\"{ns}\">{user}{pass}</Authentication></soap:Header>\
             <soap:Body><{op} xmlns=\"{ns}\"><request>{body}</request></{op}></soap:Body>\
             </soap:Envelope>",
            env = SOAP_ENV,
            ns = NAMESPACE,
            user = xml::tag("Username", &self.username),
            pass = xml::tag("Password", &self.password),
            op = operation,
            body = request
        )
    }

    /// Call `operation` and return its `<operation>Result` element.
    async fn call(&self, operation: &str, request: String) -> Result<XmlElement, RegistrarError> {
        tracing::debug!(provider = %PROVIDER, operation, "domainnameapi request");
        let req = self
            .http
            .client
            .post(self.http.url(""))
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}{}\"", NAMESPACE, operation))
            .body(self.envelope(operation, &request));
        let reply = transport::send_text(req).await?;
        let doc = xml::parse(&reply.body)?;

        if let Some(fault) = doc.find("Fault") {
            return Err(RegistrarError::vendor(
                fault.text_at("faultcode").map(String::from),
                fault.text_at("faultstring").unwrap_or("SOAP fault"),
            ));
        }
        let result = doc
            .find(&format!("{}Result", operation))
            .cloned()
            .ok_or_else(|| RegistrarError::MalformedResponse(format!("{}: no {}Result", operation, operation)))?;

        match result.text_at("OperationResult") {
            Some(r) if r.eq_ignore_ascii_case("SUCCESS") => Ok(result),
            _ => Err(RegistrarError::vendor(
                result.text_at("ErrorCode").map(String::from),
                result.text_at("OperationMessage").unwrap_or("DomainNameApi rejected the request"),
            )),
        }
    }

    fn contact(element: &str, c: &ContactInformation) -> String {
        let (cc, number) = c.phone_parts();
        let mut out = format!("<{}>", element);
        for (name, value) in [
            ("FirstName", c.first_name.as_str()),
            ("LastName", c.last_name.as_str()),
            ("Company", c.organization.as_deref().unwrap_or("")),
            ("EMail", c.email.as_str()),
            ("AddressLine1", c.address1.as_str()),
            ("AddressLine2", c.address2.as_deref().unwrap_or("")),
            ("City", c.city.as_str()),
            ("State", c.state.as_str()),
            ("ZipCode", c.postal_code.as_str()),
            ("Country", c.country.as_str()),
            ("PhoneCountryCode", cc.as_str()),
            ("Phone", number.as_str()),
            ("Type", "Contact"),
        ] {
            out.push_str(&xml::tag(name, value));
        }
        out.push_str(&format!("</{}>", element));
        out
    }

    fn contacts(contacts: &ResolvedContacts) -> String {
        format!(
            "{}{}{}{}",
            Self::contact("RegistrantContact", &contacts.registrant),
            Self::contact("AdministrativeContact", &contacts.admin),
            Self::contact("TechnicalContact", &contacts.tech),
            Self::contact("BillingContact", &contacts.billing)
        )
    }

    fn nameserver_list(nameservers: &[String]) -> String {
        let items: String = nameservers.iter().map(|ns| xml::tag("string", ns)).collect();
        format!("<NameServerList>{}</NameServerList>", items)
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let (sld, tld) = split_domain(domain)
            .ok_or_else(|| RegistrarError::InvalidRequest(format!("invalid domain name '{}'", domain)))?;
        let request = format!(
            "<DomainNameList>{}</DomainNameList><TldList>{}</TldList>{}{}",
            xml::tag("string", sld),
            xml::tag("string", tld),
            xml::tag("Period", "1"),
            xml::tag("Commad", "create")
        );
        let result = self.call("CheckAvailability", request).await?;
        let info = result
            .find("DomainAvailabilityInfo")
            .ok_or_else(|| RegistrarError::MalformedResponse("CheckAvailability: no DomainAvailabilityInfo".into()))?;

        let available = info.bool_at("Available").unwrap_or_else(|| {
            info.text_at("Status").map(|s| s.eq_ignore_ascii_case("available")).unwrap_or(false)
        });
        let mut availability = Availability::new(domain, available);
        availability.is_premium = info.bool_at("IsFee").unwrap_or(false);
        availability.price = info.text_at("Price").and_then(|p| p.parse().ok());
        availability.currency = info.text_at("Currency").map(String::from);
        if info.text_at("Status").map(|s| s.eq_ignore_ascii_case("unsupported")).unwrap_or(false) {
            availability.is_tld_supported = false;
        }
        Ok(availability)
    }

    fn receipt_id(result: &XmlElement) -> Option<String> {
        result
            .text_at("OrderId")
            .or_else(|| result.text_at("DomainInfo/Id"))
            .map(String::from)
    }

    async fn register(&self, request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let contacts = request.contacts.resolve();
        let body = format!(
            "{}{}{}{}{}",
            xml::tag("DomainName", &request.domain_name),
            xml::tag("Period", &request.years.to_string()),
            Self::nameserver_list(&request.nameservers),
            xml::tag("PrivacyProtectionStatus", &request.privacy_protection.to_string()),
            Self::contacts(&contacts)
        );
        let result = self.call("RegisterWithContactInfo", body).await?;
        let now = Utc::now();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: Self::receipt_id(&result),
            registration_date: result.text_at("StartDate").and_then(parse_timestamp).or(Some(now)),
            expiration_date: result
                .text_at("ExpirationDate")
                .and_then(parse_timestamp)
                .or_else(|| Some(years_from(now, request.years))),
        })
    }

    async fn renew(&self, request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let body = format!(
            "{}{}",
            xml::tag("DomainName", &request.domain_name),
            xml::tag("Period", &request.years.to_string())
        );
        let result = self.call("Renew", body).await?;
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: Self::receipt_id(&result),
            expiration_date: result.text_at("ExpirationDate").and_then(parse_timestamp),
        })
    }

    async fn transfer(&self, request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        let body = format!(
            "{}{}{}",
            xml::tag("DomainName", &request.domain_name),
            xml::tag("AuthCode", &request.auth_code),
            xml::tag("Period", &request.years.max(1).to_string())
        );
        let result = self.call("Transfer", body).await?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: Self::receipt_id(&result),
            status: result.text_at("Status").unwrap_or("pending").to_lowercase(),
        })
    }

    fn parse_domain(domain: &str, d: &XmlElement) -> DomainInfo {
        let status = d.text_at("Status").map(DomainStatus::from_vendor).unwrap_or(DomainStatus::Unknown);
        let mut info = DomainInfo::new(d.text_at("DomainName").unwrap_or(domain), status);
        info.registration_date = d.text_at("StartDate").and_then(parse_timestamp);
        info.expiration_date = d.text_at("ExpirationDate").and_then(parse_timestamp);
        info.updated_date = d.text_at("UpdatedDate").and_then(parse_timestamp);
        info.registrar_lock = d.bool_at("LockStatus").unwrap_or(false);
        info.privacy_protection = d.bool_at("PrivacyProtectionStatus").unwrap_or(false);
        info.auto_renew = d.bool_at("AutoRenew").unwrap_or(false);
        info.nameservers = d
            .find("NameServerList")
            .map(|list| list.children.iter().map(|n| n.text.trim().to_string()).collect())
            .unwrap_or_default();
        info
    }

    async fn info(&self, domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let result = self.call("GetDetails", xml::tag("DomainName", domain)).await?;
        let d = result
            .find("DomainInfo")
            .ok_or_else(|| RegistrarError::MalformedResponse("GetDetails: no DomainInfo".into()))?;
        Ok(Self::parse_domain(domain, d))
    }

    async fn set_nameservers(&self, domain: &str, nameservers: &[String]) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let body = format!("{}{}", xml::tag("DomainName", domain), Self::nameserver_list(nameservers));
        self.call("ModifyNameServer", body).await?;
        Ok(DomainChange::new(domain))
    }

    async fn privacy(&self, domain: &str, enable: bool) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        let body = format!(
            "{}{}{}",
            xml::tag("DomainName", domain),
            xml::tag("ProtectPrivacy", &enable.to_string()),
            xml::tag("Reason", "Owner request")
        );
        self.call("ModifyPrivacyProtectionStatus", body).await?;
        Ok(DomainChange::new(domain))
    }

    async fn tlds(&self, filter: Option<&[String]>) -> Result<Vec<TldInfo>, RegistrarError> {
        let result = self.call("GetTldList", xml::tag("PageSize", "1000")).await?;
        let tlds = result
            .find_all("TldInfo")
            .into_iter()
            .filter_map(|t| {
                let name = t.text_at("Tld").or_else(|| t.text_at("Name"))?;
                let mut tld = TldInfo::new(name, t.text_at("Currency").unwrap_or("USD"));
                tld.registration_price = t.text_at("RegisterPrice").and_then(|p| p.parse().ok());
                tld.renewal_price = t.text_at("RenewPrice").and_then(|p| p.parse().ok());
                tld.transfer_price = t.text_at("TransferPrice").and_then(|p| p.parse().ok());
                tld.min_registration_years = t.text_at("MinPeriod").and_then(|p| p.parse().ok()).unwrap_or(1);
                tld.max_registration_years = t.text_at("MaxPeriod").and_then(|p| p.parse().ok()).unwrap_or(10);
                tld.supports_privacy = true;
                Some(tld)
            })
            .collect();
        Ok(filter_tlds(tlds, filter))
    }

    async fn list_domains(&self) -> Result<Vec<RegisteredDomainInfo>, RegistrarError> {
        let result = self.call("GetList", String::new()).await?;
        Ok(result
            .find_all("DomainInfo")
            .into_iter()
            .map(|d| RegisteredDomainInfo::from(Self::parse_domain("", d)))
            .collect())
    }

    fn unsupported<T>(message: &str) -> Result<T, RegistrarError> {
        Err(RegistrarError::Unsupported(message.to_string()))
    }
}

const DNS_UNSUPPORTED: &str =
    "DomainNameApi does not host DNS records; point the nameservers at a DNS provider and manage records there";

#[async_trait]
impl RegistrarClient for DomainNameApiClient {
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
        conclude(PROVIDER, "update_nameservers", domain, self.set_nameservers(domain, nameservers).await, |_| {
            format!("Nameservers set to {}", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_privacy_protection", domain, self.privacy(domain, enable).await, |_| {
            format!("Privacy protection {}", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, _enable: bool) -> DomainUpdateResult {
        let result = Self::unsupported(
            "DomainNameApi has no auto-renew switch; schedule renew_domain before expiry instead",
        );
        conclude(PROVIDER, "set_auto_renew", domain, result, |_| String::new())
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
            .call("GetResellerDetails", String::new())
            .await
            .map(|_| DomainChange::new(""));
        conclude(PROVIDER, "verify_credentials", "", result, |_| "Credentials verified".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer) -> DomainNameApiClient {
        DomainNameApiClient::new("reseller", "pa&ss", false, &options()).with_base_url(&server.base())
    }

    fn soap(operation: &str, inner: &str) -> MockReply {
        MockReply::xml(
            200,
            &format!(
                "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\"><s:Body>\
                 <{op}Response xmlns=\"http://www.domainnameapi.com/services/\"><{op}Result>\
                 <OperationResult>SUCCESS</OperationResult>{inner}</{op}Result></{op}Response>\
                 </s:Body></s:Envelope>",
                op = operation,
                inner = inner
            ),
        )
    }

    #[tokio::test]
    async fn envelope_carries_authentication_and_action() {
        let server = MockServer::start(|_| {
            soap(
                "CheckAvailability",
                "<DomainAvailabilityInfoList><DomainAvailabilityInfo><DomainName>fresh</DomainName>\
                 <Tld>com</Tld><Status>available</Status><Price>9.49</Price><Currency>USD</Currency>\
                 </DomainAvailabilityInfo></DomainAvailabilityInfoList>",
            )
        })
        .await;
        let env = client(&server).check_availability("fresh.com").await;
        let availability = env.data().unwrap();
        assert!(availability.is_available);
        assert_eq!(availability.price, Some(9.49));

        let req = &server.requests()[0];
        assert_eq!(req.header("soapaction"), Some("\"http://www.domainnameapi.com/services/CheckAvailability\""));
        let doc = xml::parse(&req.body).unwrap();
        assert_eq!(doc.text_at("Header/Authentication/Username"), Some("reseller"));
        assert_eq!(doc.text_at("Header/Authentication/Password"), Some("pa&ss"));
        assert_eq!(doc.text_at("Body/CheckAvailability/request/DomainNameList/string"), Some("fresh"));
    }

    #[tokio::test]
    async fn soap_fault_becomes_vendor_error() {
        let server = MockServer::start(|_| {
            MockReply::xml(
                500,
                "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\"><s:Body><s:Fault>\
                 <faultcode>s:Client</faultcode><faultstring>Invalid credentials</faultstring>\
                 </s:Fault></s:Body></s:Envelope>",
            )
        })
        .await;
        let env = client(&server).verify_credentials().await;
        assert_eq!(env.error_code(), Some("s:Client"));
        assert_eq!(env.message(), "Invalid credentials");
    }

    #[tokio::test]
    async fn operation_error_keeps_code() {
        let server = MockServer::start(|_| {
            MockReply::xml(
                200,
                "<Envelope><Body><RenewResponse><RenewResult><OperationResult>ERROR</OperationResult>\
                 <ErrorCode>2302</ErrorCode><OperationMessage>Insufficient balance</OperationMessage>\
                 </RenewResult></RenewResponse></Body></Envelope>",
            )
        })
        .await;
        let env = client(&server)
            .renew_domain(&DomainRenewalRequest { domain_name: "example.com".into(), years: 1, current_expiration: None })
            .await;
        assert_eq!(env.error_code(), Some("2302"));
        assert_eq!(env.message(), "Insufficient balance");
    }

    #[tokio::test]
    async fn registration_marshals_all_contact_roles() {
        let server = MockServer::start(|_| {
            soap(
                "RegisterWithContactInfo",
                "<DomainInfo><Id>55012</Id><StartDate>2026-01-01T00:00:00</StartDate>\
                 <ExpirationDate>2027-01-01T00:00:00</ExpirationDate></DomainInfo>",
            )
        })
        .await;
        let env = client(&server).register_domain(&registration("fresh.com", 1)).await;
        let receipt = env.data().unwrap();
        assert_eq!(receipt.order_id.as_deref(), Some("55012"));
        assert!(receipt.expiration_date.is_some());

        let doc = xml::parse(&server.requests()[0].body).unwrap();
        for role in ["RegistrantContact", "AdministrativeContact", "TechnicalContact", "BillingContact"] {
            let c = doc.find(role).unwrap();
            assert_eq!(c.text_at("EMail"), Some("jane@example.net"));
            assert_eq!(c.text_at("PhoneCountryCode"), Some("1"));
            assert_eq!(c.text_at("Phone"), Some("5555551234"));
            assert_eq!(c.text_at("AddressLine2"), Some("Suite 5"));
        }
        assert_eq!(doc.find("NameServerList").unwrap().children.len(), 2);
    }

    #[tokio::test]
    async fn details_are_normalised() {
        let server = MockServer::start(|_| {
            soap(
                "GetDetails",
                "<DomainInfo><DomainName>example.com</DomainName><Status>Active</Status>\
                 <StartDate>2020-05-05T00:00:00</StartDate><ExpirationDate>2031-05-05T00:00:00</ExpirationDate>\
                 <LockStatus>true</LockStatus><PrivacyProtectionStatus>false</PrivacyProtectionStatus>\
                 <NameServerList><string>ns1.dnaservices.net</string><string>ns2.dnaservices.net</string></NameServerList>\
                 </DomainInfo>",
            )
        })
        .await;
        let info = client(&server).get_domain_info("example.com").await.into_data().unwrap();
        assert_eq!(info.status, DomainStatus::Active);
        assert!(info.registrar_lock);
        assert!(!info.privacy_protection);
        assert_eq!(info.nameservers, vec!["ns1.dnaservices.net", "ns2.dnaservices.net"]);
    }

    #[tokio::test]
    async fn dns_and_auto_renew_are_unsupported() {
        let server = MockServer::start(|_| MockReply::empty(200)).await;
        let c = client(&server);
        let zone = c.get_dns_zone("example.com").await;
        assert_eq!(zone.error_code(), Some(crate::error::codes::UNSUPPORTED_OPERATION));
        let renew = c.set_auto_renew("example.com", true).await;
        assert!(renew.message().contains("renew_domain"));
        assert_eq!(server.request_count(), 0);
    }
}
