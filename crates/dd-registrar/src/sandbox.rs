/// Sandbox registrar for development and demos.
///
/// Availability for `com`, `net`, `cc`, `tv` and `name` is answered from the
/// Verisign RDAP service: 404 means the name is free, 200 means it is taken,
/// and anything else (including a network failure) falls back to a simulated
/// "available". Every other operation performs no I/O and returns synthetic
/// data. Identifiers are derived from a SHA-256 of the operation and domain,
/// so the same call always yields the same id.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::envelope::*;
use crate::error::RegistrarError;
use crate::transport::{self, HttpContext, TransportOptions};
use crate::types::*;
use crate::{
    conclude, filter_tlds, require_domain, validate_registration, validate_renewal, validate_transfer,
    RegistrarClient,
};

pub const DEFAULT_RDAP_BASE: &str = "https://rdap.verisign.com";
const PROVIDER: RegistrarProvider = RegistrarProvider::Sandbox;
const RDAP_TLDS: &[&str] = &["com", "net", "cc", "tv", "name"];

const SAMPLE_DOMAINS: &[(&str, bool)] = &[
    ("sandbox-example.com", true),
    ("sandbox-example.net", false),
    ("demo-hosting.io", true),
];

pub struct SandboxClient {
    http: HttpContext,
}

impl SandboxClient {
    pub fn new(rdap_base: Option<&str>, options: &TransportOptions) -> Self {
        Self { http: HttpContext::new(rdap_base.unwrap_or(DEFAULT_RDAP_BASE), options) }
    }

    /// Hex SHA-256 of `operation:domain`, shortened.
    pub fn synthetic_id(operation: &str, domain: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", operation, domain.to_lowercase()).as_bytes());
        hex::encode(&digest[..8])
    }

    fn synthetic_number(operation: &str, domain: &str) -> u64 {
        let digest = Sha256::digest(format!("{}:{}", operation, domain.to_lowercase()).as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest[..4]);
        u64::from(u32::from_be_bytes(bytes))
    }

    /// Midnight today, so fabricated dates are stable within a day.
    fn today() -> DateTime<Utc> {
        let now = Utc::now().date_naive();
        now.and_hms_opt(0, 0, 0)
            .map(|n| Utc.from_utc_datetime(&n))
            .unwrap_or_else(Utc::now)
    }

    async fn availability(&self, domain: &str) -> Result<Availability, RegistrarError> {
        require_domain(domain)?;
        let tld = tld_of(domain).unwrap_or_default();
        if !RDAP_TLDS.contains(&tld.as_str()) {
            let mut availability = Availability::new(domain, true);
            availability.is_tld_supported = false;
            return Ok(availability);
        }

        let url = self.http.url(&format!("/{}/v1/domain/{}", tld, domain.to_lowercase()));
        tracing::debug!(provider = %PROVIDER, domain, url = %url, "rdap lookup");
        let available = match transport::send(self.http.client.get(&url)).await {
            Ok(reply) if reply.status == StatusCode::NOT_FOUND => true,
            Ok(reply) if reply.status == StatusCode::OK => false,
            Ok(reply) => {
                tracing::debug!(provider = %PROVIDER, domain, status = %reply.status, "rdap inconclusive, simulating");
                true
            }
            Err(err) => {
                tracing::debug!(provider = %PROVIDER, domain, error = %err, "rdap unreachable, simulating");
                true
            }
        };
        let mut availability = Availability::new(domain, available);
        if available {
            availability.price = Some(if tld == "com" { 10.99 } else { 12.99 });
            availability.currency = Some("USD".to_string());
        }
        Ok(availability)
    }

    fn register(request: &DomainRegistrationRequest) -> Result<RegistrationReceipt, RegistrarError> {
        validate_registration(request)?;
        let today = Self::today();
        Ok(RegistrationReceipt {
            domain_name: request.domain_name.clone(),
            order_id: Some(Self::synthetic_id("register", &request.domain_name)),
            registration_date: Some(today),
            expiration_date: Some(years_from(today, request.years)),
        })
    }

    fn renew(request: &DomainRenewalRequest) -> Result<RenewalReceipt, RegistrarError> {
        validate_renewal(request)?;
        let base = request.current_expiration.unwrap_or_else(|| years_from(Self::today(), 1));
        Ok(RenewalReceipt {
            domain_name: request.domain_name.clone(),
            order_id: Some(Self::synthetic_id("renew", &request.domain_name)),
            expiration_date: Some(years_from(base, request.years)),
        })
    }

    fn transfer(request: &DomainTransferRequest) -> Result<TransferReceipt, RegistrarError> {
        validate_transfer(request)?;
        Ok(TransferReceipt {
            domain_name: request.domain_name.clone(),
            transfer_id: Some(Self::synthetic_id("transfer", &request.domain_name)),
            status: "pending".to_string(),
        })
    }

    fn zone(domain: &str) -> Result<DnsZone, RegistrarError> {
        require_domain(domain)?;
        let mut records = vec![
            DnsRecordModel::new("@", "A", "192.0.2.10", 3600),
            DnsRecordModel::new("www", "CNAME", domain, 3600),
            DnsRecordModel::new("@", "MX", &format!("mail.{}", domain), 3600).with_priority(10),
            DnsRecordModel::new("@", "TXT", "v=spf1 mx -all", 3600),
        ];
        for record in &mut records {
            record.id = Some(Self::synthetic_number(&record.describe(), domain));
        }
        Ok(DnsZone {
            domain_name: domain.to_string(),
            records,
            nameservers: Some(vec!["ns1.sandbox.invalid".to_string(), "ns2.sandbox.invalid".to_string()]),
        })
    }

    fn dns_change(domain: &str, applied: usize, record_id: Option<u64>) -> Result<DnsChange, RegistrarError> {
        require_domain(domain)?;
        Ok(DnsChange { domain_name: domain.to_string(), applied, record_id })
    }

    fn info(domain: &str) -> Result<DomainInfo, RegistrarError> {
        require_domain(domain)?;
        let today = Self::today();
        let mut info = DomainInfo::new(domain, DomainStatus::Active);
        info.registration_date = Some(today - Duration::days(365));
        info.expiration_date = Some(years_from(today, 1));
        info.updated_date = Some(today - Duration::days(30));
        info.auto_renew = true;
        info.registrar_lock = true;
        info.nameservers = vec!["ns1.sandbox.invalid".to_string(), "ns2.sandbox.invalid".to_string()];
        Ok(info)
    }

    fn change(domain: &str) -> Result<DomainChange, RegistrarError> {
        require_domain(domain)?;
        Ok(DomainChange::new(domain))
    }

    fn tlds() -> Vec<TldInfo> {
        [
            ("com", 10.99, 12.99, 10.99),
            ("net", 12.99, 14.99, 12.99),
            ("org", 11.99, 13.99, 11.99),
            ("io", 39.99, 49.99, 39.99),
            ("dev", 14.99, 16.99, 14.99),
            ("cc", 9.99, 11.99, 9.99),
            ("tv", 29.99, 34.99, 29.99),
            ("name", 8.99, 9.99, 8.99),
        ]
        .iter()
        .map(|(ext, reg, renew, transfer)| {
            let mut tld = TldInfo::new(ext, "USD");
            tld.registration_price = Some(*reg);
            tld.renewal_price = Some(*renew);
            tld.transfer_price = Some(*transfer);
            tld.supports_privacy = true;
            tld.supports_dnssec = *ext != "tv";
            tld
        })
        .collect()
    }

    fn domains() -> Vec<RegisteredDomainInfo> {
        let today = Self::today();
        SAMPLE_DOMAINS
            .iter()
            .enumerate()
            .map(|(i, (name, auto_renew))| RegisteredDomainInfo {
                domain_name: name.to_string(),
                status: DomainStatus::Active,
                registration_date: Some(today - Duration::days(365 * (i as i64 + 1))),
                expiration_date: Some(today + Duration::days(30 * (i as i64 + 1))),
                auto_renew: *auto_renew,
                privacy_protection: true,
                registrar_lock: true,
            })
            .collect()
    }
}

#[async_trait]
impl RegistrarClient for SandboxClient {
    fn provider(&self) -> RegistrarProvider {
        PROVIDER
    }

    async fn check_availability(&self, domain: &str) -> DomainAvailabilityResult {
        conclude(PROVIDER, "check_availability", domain, self.availability(domain).await, |a| {
            if !a.is_tld_supported {
                format!("{} is available (simulated)", domain)
            } else if a.is_available {
                format!("{} is available", domain)
            } else {
                format!("{} is registered", domain)
            }
        })
    }

    async fn register_domain(&self, request: &DomainRegistrationRequest) -> DomainRegistrationResult {
        conclude(PROVIDER, "register_domain", &request.domain_name, Self::register(request), |r| {
            format!("Registered {} (sandbox)", r.domain_name)
        })
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        conclude(PROVIDER, "renew_domain", &request.domain_name, Self::renew(request), |r| {
            format!("Renewed {} (sandbox)", r.domain_name)
        })
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        conclude(PROVIDER, "transfer_domain", &request.domain_name, Self::transfer(request), |t| {
            format!("Transfer of {} submitted (sandbox)", t.domain_name)
        })
    }

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult {
        conclude(PROVIDER, "get_dns_zone", domain, Self::zone(domain), |z| {
            format!("{} DNS records (sandbox)", z.records.len())
        })
    }

    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_zone", domain, Self::dns_change(domain, zone.records.len(), None), |c| {
            format!("Replaced zone with {} records (sandbox)", c.applied)
        })
    }

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        let id = Self::synthetic_number(&record.describe(), domain);
        conclude(PROVIDER, "add_dns_record", domain, Self::dns_change(domain, 1, Some(id)), |_| {
            format!("Added {} (sandbox)", record.describe())
        })
    }

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "update_dns_record", domain, Self::dns_change(domain, 1, record.id), |_| {
            format!("Updated {} (sandbox)", record.describe())
        })
    }

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult {
        conclude(PROVIDER, "delete_dns_record", domain, Self::dns_change(domain, 1, record.id), |_| {
            format!("Deleted {} (sandbox)", record.describe())
        })
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        conclude(PROVIDER, "get_domain_info", domain, Self::info(domain), |i| {
            format!("{} is {} (sandbox)", i.domain_name, i.status)
        })
    }

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult {
        conclude(PROVIDER, "update_nameservers", domain, Self::change(domain), |_| {
            format!("Nameservers set to {} (sandbox)", nameservers.join(", "))
        })
    }

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_privacy_protection", domain, Self::change(domain), |_| {
            format!("Privacy protection {} (sandbox)", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult {
        conclude(PROVIDER, "set_auto_renew", domain, Self::change(domain), |_| {
            format!("Auto-renew {} (sandbox)", if enable { "enabled" } else { "disabled" })
        })
    }

    async fn get_supported_tlds(&self, filter: Option<&[String]>) -> TldListResult {
        conclude(PROVIDER, "get_supported_tlds", "", Ok(filter_tlds(Self::tlds(), filter)), |t| {
            format!("{} TLDs (sandbox)", t.len())
        })
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        conclude(PROVIDER, "get_registered_domains", "", Ok(Self::domains()), |d| {
            format!("{} domains (sandbox)", d.len())
        })
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        conclude(PROVIDER, "verify_credentials", "", Ok(DomainChange::new("")), |_| {
            "Sandbox needs no credentials".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::test_support::{options, registration, MockReply, MockServer};

    fn client(server: &MockServer) -> SandboxClient {
        SandboxClient::new(Some(&server.base()), &options())
    }

    #[tokio::test]
    async fn rdap_status_decides_availability() {
        let server = MockServer::start(|req| {
            if req.path.ends_with("/taken.com") {
                MockReply::json(200, serde_json::json!({ "objectClassName": "domain", "ldhName": "TAKEN.COM" }))
            } else if req.path.ends_with("/flaky.net") {
                MockReply::empty(503)
            } else {
                MockReply::empty(404)
            }
        })
        .await;
        let c = client(&server);
        assert!(!c.check_availability("taken.com").await.data().unwrap().is_available);
        assert!(c.check_availability("free.com").await.data().unwrap().is_available);

        let flaky = c.check_availability("flaky.net").await;
        assert!(flaky.is_success());
        assert!(flaky.data().unwrap().is_available);

        let paths: Vec<String> = server.requests().iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths[0], "/com/v1/domain/taken.com");
        assert_eq!(paths[2], "/net/v1/domain/flaky.net");
    }

    #[tokio::test]
    async fn other_tlds_are_simulated_without_io() {
        let server = MockServer::start(|_| MockReply::empty(200)).await;
        let env = client(&server).check_availability("something.org").await;
        let availability = env.data().unwrap();
        assert!(availability.is_available);
        assert!(!availability.is_tld_supported);
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_rdap_simulates_available() {
        let c = SandboxClient::new(Some("http://127.0.0.1:9"), &options());
        let env = c.check_availability("offline.com").await;
        assert!(env.is_success());
        assert!(env.data().unwrap().is_available);
    }

    #[tokio::test]
    async fn identifiers_are_deterministic() {
        let server = MockServer::start(|_| MockReply::empty(404)).await;
        let c = client(&server);
        let first = c.register_domain(&registration("fresh.com", 2)).await.into_data().unwrap();
        let second = c.register_domain(&registration("fresh.com", 2)).await.into_data().unwrap();
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.order_id, Some(SandboxClient::synthetic_id("register", "fresh.com")));
        assert_ne!(first.order_id, Some(SandboxClient::synthetic_id("renew", "fresh.com")));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_anything_else() {
        let server = MockServer::start(|_| MockReply::empty(404)).await;
        let c = client(&server);
        let env = c
            .renew_domain(&DomainRenewalRequest { domain_name: "example.com".into(), years: 0, current_expiration: None })
            .await;
        assert_eq!(env.error_code(), Some(codes::INVALID_REQUEST));
        let env = c.check_availability("").await;
        assert_eq!(env.error_code(), Some(codes::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn fixed_tld_set_honours_filter() {
        let server = MockServer::start(|_| MockReply::empty(404)).await;
        let filter = vec![".COM".to_string(), "tv".to_string()];
        let env = client(&server).get_supported_tlds(Some(&filter)).await;
        let names: Vec<String> = env.data().unwrap().iter().map(|t| t.extension.clone()).collect();
        assert_eq!(names, vec!["com", "tv"]);
    }
}
