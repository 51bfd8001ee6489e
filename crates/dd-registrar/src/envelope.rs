/// Result envelopes returned across the registrar contract.
///
/// Fields are private so the only way to build an envelope is through the
/// constructors below, which keep `success` and `errors` consistent: a failed
/// envelope always lists at least one error and a successful one lists none.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RegistrarError;
use crate::types::{DnsZone, DomainInfo, RegisteredDomainInfo, TldInfo};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
            errors: Vec::new(),
            data: Some(data),
        }
    }

    pub fn failure(error: RegistrarError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error_code: Some(error.code()),
            errors: error.details(),
            data: None,
        }
    }

    /// A multi-item operation where some items were applied. With no errors
    /// this is a plain success.
    pub fn partial(message: impl Into<String>, data: T, errors: Vec<String>) -> Self {
        if errors.is_empty() {
            return Self::ok(message, data);
        }
        let error = RegistrarError::Partial(errors);
        Self {
            success: false,
            message: message.into(),
            error_code: Some(error.code()),
            errors: error.details(),
            data: Some(data),
        }
    }

    pub fn from_result(result: Result<T, RegistrarError>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(err) => Self::failure(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Failed on the wire rather than by vendor decision; safe to repeat for reads.
    pub fn is_transient(&self) -> bool {
        !self.success && self.error_code.as_deref() == Some(crate::error::codes::TRANSPORT_FAILURE)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            message: self.message,
            error_code: self.error_code,
            errors: self.errors,
            data: self.data.map(f),
        }
    }
}

// ─── Payloads ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub domain_name: String,
    pub is_available: bool,
    pub is_tld_supported: bool,
    pub is_premium: bool,
    pub price: Option<f64>,
    pub currency: Option<String>,
}

impl Availability {
    pub fn new(domain_name: &str, is_available: bool) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            is_available,
            is_tld_supported: true,
            is_premium: false,
            price: None,
            currency: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub domain_name: String,
    pub order_id: Option<String>,
    pub registration_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenewalReceipt {
    pub domain_name: String,
    pub order_id: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub domain_name: String,
    pub transfer_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsChange {
    pub domain_name: String,
    /// Number of records written or removed.
    pub applied: usize,
    /// Identifier assigned to a newly created record, when the vendor has one.
    pub record_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainChange {
    pub domain_name: String,
}

impl DomainChange {
    pub fn new(domain_name: &str) -> Self {
        Self { domain_name: domain_name.to_string() }
    }
}

pub type DomainAvailabilityResult = Envelope<Availability>;
pub type DomainRegistrationResult = Envelope<RegistrationReceipt>;
pub type DomainRenewalResult = Envelope<RenewalReceipt>;
pub type DomainTransferResult = Envelope<TransferReceipt>;
pub type DnsZoneResult = Envelope<DnsZone>;
pub type DnsUpdateResult = Envelope<DnsChange>;
pub type DomainInfoResult = Envelope<DomainInfo>;
pub type DomainUpdateResult = Envelope<DomainChange>;
pub type TldListResult = Envelope<Vec<TldInfo>>;
pub type RegisteredDomainsResult = Envelope<Vec<RegisteredDomainInfo>>;
