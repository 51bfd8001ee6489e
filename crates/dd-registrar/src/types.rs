/// Shared value model for registrar operations.
///
/// Every registrar client receives these provider-neutral requests and
/// normalises its API responses back into them, so the lifecycle workflows
/// never see a vendor shape.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Supported registrar providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RegistrarProvider {
    Cloudflare,
    Porkbun,
    Namecheap,
    #[serde(rename = "godaddy")]
    GoDaddy,
    Google,
    #[serde(rename = "namecom")]
    NameCom,
    Route53,
    #[serde(rename = "opensrs")]
    OpenSrs,
    #[serde(rename = "domainnameapi")]
    DomainNameApi,
    #[serde(rename = "resellerclub")]
    ResellerClub,
    Gandi,
    #[serde(rename = "signed")]
    SignedRest,
    Sandbox,
}

impl std::fmt::Display for RegistrarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloudflare => write!(f, "cloudflare"),
            Self::Porkbun => write!(f, "porkbun"),
            Self::Namecheap => write!(f, "namecheap"),
            Self::GoDaddy => write!(f, "godaddy"),
            Self::Google => write!(f, "google"),
            Self::NameCom => write!(f, "namecom"),
            Self::Route53 => write!(f, "route53"),
            Self::OpenSrs => write!(f, "opensrs"),
            Self::DomainNameApi => write!(f, "domainnameapi"),
            Self::ResellerClub => write!(f, "resellerclub"),
            Self::Gandi => write!(f, "gandi"),
            Self::SignedRest => write!(f, "signed"),
            Self::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// Canonical domain lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Active,
    Expired,
    Pending,
    PendingTransfer,
    Redemption,
    Locked,
    Suspended,
    Unknown,
}

impl DomainStatus {
    /// Map a free-form vendor status string onto the canonical vocabulary.
    pub fn from_vendor(raw: &str) -> Self {
        let status = raw.trim().to_lowercase();
        match status.as_str() {
            "active" | "ok" | "registered" | "verified" => Self::Active,
            s if s.contains("expired") => Self::Expired,
            s if s.contains("transfer") => Self::PendingTransfer,
            s if s.contains("pending") => Self::Pending,
            s if s.contains("redemption") => Self::Redemption,
            s if s.contains("suspend") || s.contains("hold") => Self::Suspended,
            s if s.contains("lock") => Self::Locked,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Pending => "pending",
            Self::PendingTransfer => "pending_transfer",
            Self::Redemption => "redemption",
            Self::Locked => "locked",
            Self::Suspended => "suspended",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Contacts ──────────────────────────────────────────────────────────────

/// A registrant/admin/tech/billing party.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactInformation {
    pub first_name: String,
    pub last_name: String,
    pub organization: Option<String>,
    pub email: String,
    /// E.164-ish, e.g. `+1.5555551234`.
    pub phone: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

impl ContactInformation {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Split `+CC.NUMBER` into country calling code and subscriber number.
    pub fn phone_parts(&self) -> (String, String) {
        let raw = self.phone.trim().trim_start_matches('+');
        match raw.split_once('.') {
            Some((cc, number)) => (cc.to_string(), number.to_string()),
            None => (String::new(), raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactRole {
    Registrant,
    Admin,
    Tech,
    Billing,
}

/// Contacts as supplied on a request. Only the registrant is mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactSet {
    pub registrant: ContactInformation,
    pub admin: Option<ContactInformation>,
    pub tech: Option<ContactInformation>,
    pub billing: Option<ContactInformation>,
}

impl ContactSet {
    pub fn new(registrant: ContactInformation) -> Self {
        Self { registrant, ..Default::default() }
    }

    /// Fill the missing roles from the registrant. Clients call this once,
    /// before marshalling, and pass the resolved set to every sub-call.
    pub fn resolve(&self) -> ResolvedContacts {
        let pick = |c: &Option<ContactInformation>| {
            c.clone().unwrap_or_else(|| self.registrant.clone())
        };
        ResolvedContacts {
            registrant: self.registrant.clone(),
            admin: pick(&self.admin),
            tech: pick(&self.tech),
            billing: pick(&self.billing),
        }
    }
}

/// A contact set where every role is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContacts {
    pub registrant: ContactInformation,
    pub admin: ContactInformation,
    pub tech: ContactInformation,
    pub billing: ContactInformation,
}

impl ResolvedContacts {
    pub fn get(&self, role: ContactRole) -> &ContactInformation {
        match role {
            ContactRole::Registrant => &self.registrant,
            ContactRole::Admin => &self.admin,
            ContactRole::Tech => &self.tech,
            ContactRole::Billing => &self.billing,
        }
    }

    pub fn roles(&self) -> [(ContactRole, &ContactInformation); 4] {
        [
            (ContactRole::Registrant, &self.registrant),
            (ContactRole::Admin, &self.admin),
            (ContactRole::Tech, &self.tech),
            (ContactRole::Billing, &self.billing),
        ]
    }
}

// ─── Requests ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainRegistrationRequest {
    pub domain_name: String,
    pub years: u32,
    pub auto_renew: bool,
    pub privacy_protection: bool,
    #[serde(default)]
    pub nameservers: Vec<String>,
    pub contacts: ContactSet,
}

impl DomainRegistrationRequest {
    pub fn new(domain_name: &str, years: u32, registrant: ContactInformation) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            years,
            auto_renew: false,
            privacy_protection: false,
            nameservers: Vec::new(),
            contacts: ContactSet::new(registrant),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainRenewalRequest {
    pub domain_name: String,
    pub years: u32,
    /// Expiration the caller believes is current. Vendors that guard against
    /// double renewal (Route 53, ResellerClub) require it.
    pub current_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainTransferRequest {
    pub domain_name: String,
    pub auth_code: String,
    pub years: u32,
    pub auto_renew: bool,
    pub privacy_protection: bool,
    #[serde(default)]
    pub nameservers: Vec<String>,
    pub contacts: ContactSet,
}

// ─── DNS ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordModel {
    /// Absent for records that do not exist yet.
    pub id: Option<u64>,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
    /// MX/SRV preference.
    pub priority: Option<u16>,
}

impl DnsRecordModel {
    pub fn new(name: &str, record_type: &str, value: &str, ttl: u32) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            record_type: record_type.to_uppercase(),
            value: value.to_string(),
            ttl,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Same name/type/value/ttl/priority, ignoring the id.
    pub fn same_content(&self, other: &DnsRecordModel) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.record_type.eq_ignore_ascii_case(&other.record_type)
            && self.value == other.value
            && self.ttl == other.ttl
            && self.priority == other.priority
    }

    pub fn same_slot(&self, other: &DnsRecordModel) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.record_type.eq_ignore_ascii_case(&other.record_type)
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.record_type, self.name, self.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsZone {
    pub domain_name: String,
    pub records: Vec<DnsRecordModel>,
    pub nameservers: Option<Vec<String>>,
}

// ─── TLDs and domain info ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TldInfo {
    pub extension: String,
    pub currency: String,
    pub registration_price: Option<f64>,
    pub renewal_price: Option<f64>,
    pub transfer_price: Option<f64>,
    pub min_registration_years: u32,
    pub max_registration_years: u32,
    pub supports_privacy: bool,
    pub supports_dnssec: bool,
    pub is_country_code: bool,
}

impl TldInfo {
    pub fn new(extension: &str, currency: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_lowercase();
        Self {
            is_country_code: extension.len() == 2,
            extension,
            currency: currency.to_string(),
            registration_price: None,
            renewal_price: None,
            transfer_price: None,
            min_registration_years: 1,
            max_registration_years: 10,
            supports_privacy: false,
            supports_dnssec: false,
        }
    }
}

/// Normalised domain details returned by `get_domain_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub domain_name: String,
    pub status: DomainStatus,
    pub registration_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub privacy_protection: bool,
    pub registrar_lock: bool,
    pub nameservers: Vec<String>,
}

impl DomainInfo {
    pub fn new(domain_name: &str, status: DomainStatus) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            status,
            registration_date: None,
            expiration_date: None,
            updated_date: None,
            auto_renew: false,
            privacy_protection: false,
            registrar_lock: false,
            nameservers: Vec::new(),
        }
    }
}

/// One row of `get_registered_domains`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDomainInfo {
    pub domain_name: String,
    pub status: DomainStatus,
    pub registration_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub privacy_protection: bool,
    pub registrar_lock: bool,
}

impl From<DomainInfo> for RegisteredDomainInfo {
    fn from(info: DomainInfo) -> Self {
        Self {
            domain_name: info.domain_name,
            status: info.status,
            registration_date: info.registration_date,
            expiration_date: info.expiration_date,
            auto_renew: info.auto_renew,
            privacy_protection: info.privacy_protection,
            registrar_lock: info.registrar_lock,
        }
    }
}

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Second-level registry suffixes sold as a unit, e.g. `example.co.uk`.
const TWO_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "me.uk", "ltd.uk", "plc.uk", "net.uk", "com.au", "net.au", "org.au", "co.nz", "net.nz",
    "org.nz", "co.za", "org.za", "com.br", "net.br", "com.mx", "com.ar", "com.tr", "net.tr", "org.tr", "co.jp",
    "ne.jp", "or.jp", "co.in", "net.in", "org.in", "com.cn", "net.cn", "org.cn", "com.hk", "com.sg", "com.my",
    "co.il", "co.kr", "com.pl", "com.es", "com.pt", "co.at", "com.ua",
];

/// Split a name into the registrable label and its suffix, ignoring any
/// host labels in front: `example.co.uk` gives (`example`, `co.uk`) and
/// `www.example.com` gives (`example`, `com`).
pub fn split_domain(domain: &str) -> Option<(&str, &str)> {
    let domain = domain.trim_end_matches('.');
    let (rest, last) = domain.rsplit_once('.')?;
    if rest.is_empty() || last.is_empty() {
        return None;
    }
    let (sld, tld) = match rest.rsplit_once('.') {
        Some((head, second)) if is_two_label_suffix(second, last) => {
            let sld = head.rsplit('.').next().unwrap_or(head);
            (sld, &domain[domain.len() - second.len() - last.len() - 1..])
        }
        Some((_, second)) => (second, last),
        None => (rest, last),
    };
    if sld.is_empty() {
        return None;
    }
    Some((sld, tld))
}

fn is_two_label_suffix(second: &str, last: &str) -> bool {
    TWO_LABEL_SUFFIXES.iter().any(|suffix| {
        suffix
            .split_once('.')
            .map_or(false, |(a, b)| a.eq_ignore_ascii_case(second) && b.eq_ignore_ascii_case(last))
    })
}

/// `sld.tld` when `domain` has no labels beyond the registrable name.
pub fn is_registrable(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    split_domain(domain).map_or(false, |(sld, tld)| domain.len() == sld.len() + tld.len() + 1)
}

/// Lower-cased TLD without a leading dot.
pub fn tld_of(domain: &str) -> Option<String> {
    split_domain(domain).map(|(_, tld)| tld.to_lowercase())
}

/// Parse the date formats registrars actually send: RFC 3339, ISO without
/// zone, `YYYY-MM-DD`, Namecheap's `MM/DD/YYYY`, and Unix epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return Utc.timestamp_opt(secs as i64, 0).single();
    }
    None
}

/// `now + years`, clamped to the same day of month.
pub fn years_from(start: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    start
        .checked_add_months(chrono::Months::new(years.saturating_mul(12)))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::contact;

    #[test]
    fn missing_roles_default_to_registrant() {
        let set = ContactSet::new(contact("Jane"));
        let resolved = set.resolve();
        for (_, c) in resolved.roles() {
            assert_eq!(c, &set.registrant);
        }
    }

    #[test]
    fn explicit_roles_are_kept() {
        let mut set = ContactSet::new(contact("Jane"));
        set.tech = Some(contact("Tom"));
        let resolved = set.resolve();
        assert_eq!(resolved.tech.first_name, "Tom");
        assert_eq!(resolved.admin.first_name, "Jane");
        assert_eq!(resolved.billing.first_name, "Jane");
    }

    #[test]
    fn vendor_status_normalisation() {
        assert_eq!(DomainStatus::from_vendor("ACTIVE"), DomainStatus::Active);
        assert_eq!(DomainStatus::from_vendor("Ok"), DomainStatus::Active);
        assert_eq!(DomainStatus::from_vendor("pendingTransfer"), DomainStatus::PendingTransfer);
        assert_eq!(DomainStatus::from_vendor("clientHold"), DomainStatus::Suspended);
        assert_eq!(DomainStatus::from_vendor("RedemptionPeriod"), DomainStatus::Redemption);
        assert_eq!(DomainStatus::from_vendor("weird"), DomainStatus::Unknown);
    }

    #[test]
    fn timestamps_in_vendor_formats() {
        let expected = Utc.with_ymd_and_hms(2027, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2027-03-04T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2027-03-04"), Some(expected));
        assert_eq!(parse_timestamp("03/04/2027"), Some(expected));
        assert_eq!(parse_timestamp("2027-03-04 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp(&expected.timestamp().to_string()), Some(expected));
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn domain_splitting() {
        assert_eq!(split_domain("example.co.uk"), Some(("example", "co.uk")));
        assert_eq!(split_domain("example"), None);
        assert_eq!(split_domain(".com"), None);
        assert_eq!(tld_of("Example.COM").as_deref(), Some("com"));
    }

    #[test]
    fn host_labels_are_not_part_of_the_tld() {
        assert_eq!(split_domain("www.example.com"), Some(("example", "com")));
        assert_eq!(tld_of("www.example.com").as_deref(), Some("com"));
        assert_eq!(split_domain("shop.example.co.uk"), Some(("example", "co.uk")));
        assert_eq!(split_domain("co.uk"), Some(("co", "uk")));
        assert!(is_registrable("example.co.uk"));
        assert!(is_registrable("example.com."));
        assert!(!is_registrable("www.example.com"));
    }

    #[test]
    fn phone_is_split_on_dot() {
        let c = contact("Jane");
        assert_eq!(c.phone_parts(), ("1".to_string(), "5555551234".to_string()));
    }
}
