/// Registrar API clients.
///
/// Each sub-module implements an HTTP client for a specific domain registrar.
/// All clients translate between the provider-neutral request/response types
/// in [`types`] and one vendor API, and report every outcome through an
/// [`envelope::Envelope`] so callers never have to handle vendor errors as
/// Rust errors.

pub mod envelope;
pub mod error;
pub mod factory;
pub mod signing;
pub mod transport;
pub mod types;
pub mod xml;

pub mod cloudflare;
pub mod domainnameapi;
pub mod gandi;
pub mod godaddy;
pub mod google;
pub mod namecheap;
pub mod namecom;
pub mod opensrs;
pub mod porkbun;
pub mod resellerclub;
pub mod route53;
pub mod sandbox;
pub mod signed;

mod dns_sync;

#[cfg(test)]
pub(crate) mod test_support;

use envelope::*;
use error::RegistrarError;
use types::*;

pub use envelope::Envelope;
pub use error::RegistrarError as Error;
pub use types::RegistrarProvider;

/// Trait that every registrar client must implement.
///
/// No method returns `Err` or panics on an expected failure; vendor
/// rejections, transport failures and unsupported operations all come back
/// as `success = false` envelopes.
#[async_trait::async_trait]
pub trait RegistrarClient: Send + Sync {
    fn provider(&self) -> RegistrarProvider;

    async fn check_availability(&self, domain: &str) -> DomainAvailabilityResult;

    async fn register_domain(&self, request: &DomainRegistrationRequest) -> DomainRegistrationResult;

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult;

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult;

    async fn get_dns_zone(&self, domain: &str) -> DnsZoneResult;

    /// Replace the zone's records with `zone.records`.
    async fn update_dns_zone(&self, domain: &str, zone: &DnsZone) -> DnsUpdateResult;

    async fn add_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult;

    async fn update_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult;

    async fn delete_dns_record(&self, domain: &str, record: &DnsRecordModel) -> DnsUpdateResult;

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult;

    async fn update_nameservers(&self, domain: &str, nameservers: &[String]) -> DomainUpdateResult;

    async fn set_privacy_protection(&self, domain: &str, enable: bool) -> DomainUpdateResult;

    async fn set_auto_renew(&self, domain: &str, enable: bool) -> DomainUpdateResult;

    /// All TLDs the provider sells, or only those in `filter` when given.
    async fn get_supported_tlds(&self, filter: Option<&[String]>) -> TldListResult;

    async fn get_registered_domains(&self) -> RegisteredDomainsResult;

    /// Verify that credentials are valid.
    async fn verify_credentials(&self) -> DomainUpdateResult;
}

/// Keep only the TLDs named in `requested`, comparing case-insensitively and
/// ignoring a leading dot. With no filter the list is returned unchanged.
pub fn filter_tlds(all: Vec<TldInfo>, requested: Option<&[String]>) -> Vec<TldInfo> {
    let Some(requested) = requested else {
        return all;
    };
    let wanted: Vec<String> = requested.iter().map(|t| normalise_tld(t)).collect();
    all.into_iter()
        .filter(|tld| wanted.contains(&normalise_tld(&tld.extension)))
        .collect()
}

fn normalise_tld(tld: &str) -> String {
    tld.trim().trim_start_matches('.').to_lowercase()
}

/// Log the outcome of one contract call and wrap it in an envelope.
pub(crate) fn conclude<T>(
    provider: RegistrarProvider,
    operation: &str,
    domain: &str,
    result: Result<T, RegistrarError>,
    message: impl FnOnce(&T) -> String,
) -> Envelope<T> {
    match result {
        Ok(data) => {
            tracing::debug!(%provider, operation, domain, "registrar call succeeded");
            let msg = message(&data);
            Envelope::ok(msg, data)
        }
        Err(err) => {
            tracing::warn!(
                %provider,
                operation,
                domain,
                code = %err.code(),
                error = %err,
                "registrar call failed"
            );
            Envelope::failure(err)
        }
    }
}

// ─── Request validation ────────────────────────────────────────────────────

pub(crate) fn require_domain(domain: &str) -> Result<(), RegistrarError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(RegistrarError::InvalidRequest("domain name is required".into()));
    }
    if split_domain(domain).is_none() {
        return Err(RegistrarError::InvalidRequest(format!(
            "'{}' is not a fully qualified domain name",
            domain
        )));
    }
    if !is_registrable(domain) {
        return Err(RegistrarError::InvalidRequest(format!(
            "'{}' is a host name; pass the registrable domain",
            domain
        )));
    }
    Ok(())
}

pub(crate) fn require_years(years: u32) -> Result<(), RegistrarError> {
    if years == 0 || years > 10 {
        return Err(RegistrarError::InvalidRequest(format!(
            "term must be between 1 and 10 years, got {}",
            years
        )));
    }
    Ok(())
}

pub(crate) fn validate_registration(request: &DomainRegistrationRequest) -> Result<(), RegistrarError> {
    require_domain(&request.domain_name)?;
    require_years(request.years)?;
    if request.contacts.registrant.email.trim().is_empty() {
        return Err(RegistrarError::InvalidRequest("registrant email is required".into()));
    }
    Ok(())
}

pub(crate) fn validate_renewal(request: &DomainRenewalRequest) -> Result<(), RegistrarError> {
    require_domain(&request.domain_name)?;
    require_years(request.years)
}

pub(crate) fn validate_transfer(request: &DomainTransferRequest) -> Result<(), RegistrarError> {
    require_domain(&request.domain_name)?;
    if request.auth_code.trim().is_empty() {
        return Err(RegistrarError::InvalidRequest("transfer auth code is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tld(ext: &str) -> TldInfo {
        TldInfo::new(ext, "USD")
    }

    #[test]
    fn filter_intersects_case_insensitively_without_dots() {
        let all = vec![tld("com"), tld("net"), tld("org"), tld("io")];
        let requested = vec![".COM".to_string(), "Io".to_string(), "xyz".to_string()];
        let filtered = filter_tlds(all.clone(), Some(&requested));
        let names: Vec<&str> = filtered.iter().map(|t| t.extension.as_str()).collect();
        assert_eq!(names, vec!["com", "io"]);

        let again = filter_tlds(filtered.clone(), Some(&requested));
        assert_eq!(again, filtered);
    }

    #[test]
    fn no_filter_returns_everything() {
        let all = vec![tld("com"), tld("net")];
        assert_eq!(filter_tlds(all.clone(), None), all);
    }

    #[test]
    fn empty_filter_returns_nothing() {
        let all = vec![tld("com")];
        assert!(filter_tlds(all, Some(&[])).is_empty());
    }

    #[test]
    fn domain_validation() {
        assert!(require_domain("example.com").is_ok());
        assert!(matches!(require_domain(""), Err(RegistrarError::InvalidRequest(_))));
        assert!(matches!(require_domain("localhost"), Err(RegistrarError::InvalidRequest(_))));
        assert!(matches!(require_domain("www.example.com"), Err(RegistrarError::InvalidRequest(_))));
        assert!(require_domain("example.co.uk").is_ok());
        assert!(require_years(0).is_err());
        assert!(require_years(11).is_err());
        assert!(require_years(2).is_ok());
    }
}
