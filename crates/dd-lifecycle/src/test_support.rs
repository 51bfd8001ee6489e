//! Scripted registrar and in-memory harness for workflow tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dd_registrar::envelope::*;
use dd_registrar::error::RegistrarError;
use dd_registrar::types::*;
use dd_registrar::RegistrarClient;

use crate::collaborators::*;
use crate::error::WorkflowError;
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;
use crate::state::{DomainOrder, DomainRecord, OrderRequest, OrderState};
use crate::registration::RegistrationInput;
use crate::WorkflowContext;

/// How the fake answers a billed call.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Succeed,
    Timeout,
    Reject(&'static str, &'static str),
}

impl Script {
    fn outcome(self) -> Result<(), RegistrarError> {
        match self {
            Self::Succeed => Ok(()),
            Self::Timeout => Err(RegistrarError::Transport("request timed out".into())),
            Self::Reject(code, message) => Err(RegistrarError::vendor(Some(code.to_string()), message)),
        }
    }
}

pub struct FakeRegistrar {
    pub register_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub renew_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    other_calls: AtomicUsize,
    register_script: Mutex<Script>,
    renew_script: Mutex<Script>,
    info_failures: AtomicUsize,
    info_status: Mutex<DomainStatus>,
    /// Account listing; `None` answers `get_registered_domains` as unsupported.
    account: Mutex<Option<Vec<String>>>,
    /// Domains the registrar reports, with their expiration.
    registered: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
}

impl FakeRegistrar {
    pub fn new() -> Self {
        Self {
            register_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
            other_calls: AtomicUsize::new(0),
            register_script: Mutex::new(Script::Succeed),
            renew_script: Mutex::new(Script::Succeed),
            info_failures: AtomicUsize::new(0),
            info_status: Mutex::new(DomainStatus::Active),
            account: Mutex::new(None),
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn script_register(&self, script: Script) {
        *self.register_script.lock().unwrap() = script;
    }

    pub fn script_renew(&self, script: Script) {
        *self.renew_script.lock().unwrap() = script;
    }

    /// The next `n` `get_domain_info` calls fail with a transport error.
    pub fn fail_info_times(&self, n: usize) {
        self.info_failures.store(n, Ordering::SeqCst);
    }

    /// Status reported by `get_domain_info` for known domains.
    pub fn set_info_status(&self, status: DomainStatus) {
        *self.info_status.lock().unwrap() = status;
    }

    pub fn set_account_listing(&self, domains: &[&str]) {
        *self.account.lock().unwrap() = Some(domains.iter().map(|d| d.to_string()).collect());
    }

    pub fn set_registered(&self, domain: &str, expiration: Option<DateTime<Utc>>) {
        self.registered.lock().unwrap().insert(domain.to_string(), expiration);
    }

    pub fn total_calls(&self) -> usize {
        [&self.register_calls, &self.transfer_calls, &self.renew_calls, &self.info_calls, &self.other_calls]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    fn other<T>(&self) -> Envelope<T> {
        self.other_calls.fetch_add(1, Ordering::SeqCst);
        Envelope::failure(RegistrarError::Unsupported("not scripted".into()))
    }
}

#[async_trait]
impl RegistrarClient for FakeRegistrar {
    fn provider(&self) -> RegistrarProvider {
        RegistrarProvider::Sandbox
    }

    async fn check_availability(&self, _domain: &str) -> DomainAvailabilityResult {
        self.other()
    }

    async fn register_domain(&self, request: &DomainRegistrationRequest) -> DomainRegistrationResult {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let script = *self.register_script.lock().unwrap();
        let result = script.outcome().map(|_| {
            let expiration = years_from(Utc::now(), request.years);
            self.set_registered(&request.domain_name, Some(expiration));
            RegistrationReceipt {
                domain_name: request.domain_name.clone(),
                order_id: Some(format!("fake-order-{}", request.domain_name)),
                registration_date: Some(Utc::now()),
                expiration_date: Some(expiration),
            }
        });
        Envelope::from_result(result, "registered")
    }

    async fn renew_domain(&self, request: &DomainRenewalRequest) -> DomainRenewalResult {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        let script = *self.renew_script.lock().unwrap();
        let result = script.outcome().map(|_| {
            let base = request.current_expiration.unwrap_or_else(Utc::now);
            let expiration = years_from(base, request.years);
            self.set_registered(&request.domain_name, Some(expiration));
            RenewalReceipt {
                domain_name: request.domain_name.clone(),
                order_id: Some(format!("fake-renewal-{}", request.domain_name)),
                expiration_date: Some(expiration),
            }
        });
        Envelope::from_result(result, "renewed")
    }

    async fn transfer_domain(&self, request: &DomainTransferRequest) -> DomainTransferResult {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.set_registered(&request.domain_name, None);
        Envelope::ok(
            "transfer submitted",
            TransferReceipt {
                domain_name: request.domain_name.clone(),
                transfer_id: Some(format!("fake-transfer-{}", request.domain_name)),
                status: "pending".into(),
            },
        )
    }

    async fn get_dns_zone(&self, _domain: &str) -> DnsZoneResult {
        self.other()
    }

    async fn update_dns_zone(&self, _domain: &str, _zone: &DnsZone) -> DnsUpdateResult {
        self.other()
    }

    async fn add_dns_record(&self, _domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        self.other()
    }

    async fn update_dns_record(&self, _domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        self.other()
    }

    async fn delete_dns_record(&self, _domain: &str, _record: &DnsRecordModel) -> DnsUpdateResult {
        self.other()
    }

    async fn get_domain_info(&self, domain: &str) -> DomainInfoResult {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.info_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.info_failures.store(pending_failures - 1, Ordering::SeqCst);
            return Envelope::failure(RegistrarError::Transport("connection reset".into()));
        }
        let registered = self.registered.lock().unwrap().get(domain).cloned();
        match registered {
            Some(expiration) => {
                let status = *self.info_status.lock().unwrap();
                let mut info = DomainInfo::new(domain, status);
                info.expiration_date = expiration;
                Envelope::ok("found", info)
            }
            None => Envelope::failure(RegistrarError::vendor(Some("NOT_FOUND".into()), "domain not found")),
        }
    }

    async fn update_nameservers(&self, _domain: &str, _nameservers: &[String]) -> DomainUpdateResult {
        self.other()
    }

    async fn set_privacy_protection(&self, _domain: &str, _enable: bool) -> DomainUpdateResult {
        self.other()
    }

    async fn set_auto_renew(&self, _domain: &str, _enable: bool) -> DomainUpdateResult {
        self.other()
    }

    async fn get_supported_tlds(&self, _filter: Option<&[String]>) -> TldListResult {
        self.other()
    }

    async fn get_registered_domains(&self) -> RegisteredDomainsResult {
        let account = self.account.lock().unwrap().clone();
        match account {
            Some(names) => Envelope::ok(
                "listed",
                names
                    .iter()
                    .map(|n| RegisteredDomainInfo::from(DomainInfo::new(n, DomainStatus::Active)))
                    .collect(),
            ),
            None => self.other(),
        }
    }

    async fn verify_credentials(&self) -> DomainUpdateResult {
        self.other()
    }
}

/// Billing whose renewal invoices fail a set number of times first.
pub struct FlakyBilling {
    inner: Arc<MemoryBilling>,
    failures: AtomicUsize,
}

impl FlakyBilling {
    pub fn new(inner: Arc<MemoryBilling>, failures: usize) -> Self {
        Self { inner, failures: AtomicUsize::new(failures) }
    }
}

#[async_trait]
impl BillingGateway for FlakyBilling {
    async fn create_order(&self, customer_id: &str, request: &OrderRequest) -> Result<BillingOrder, WorkflowError> {
        self.inner.create_order(customer_id, request).await
    }

    async fn create_renewal_invoice(&self, domain: &DomainRecord, years: u32) -> Result<String, WorkflowError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WorkflowError::Billing("billing down".into()));
        }
        self.inner.create_renewal_invoice(domain, years).await
    }

    async fn is_order_active(&self, order_id: &str) -> Result<bool, WorkflowError> {
        self.inner.is_order_active(order_id).await
    }
}

pub struct Harness {
    pub registrar: Arc<FakeRegistrar>,
    pub billing: Arc<MemoryBilling>,
    pub provisioning: Arc<MemoryProvisioning>,
    pub orders: Arc<MemoryOrderStore>,
    pub domains: Arc<MemoryDomainStore>,
    locks: KeyedLocks,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_domains([])
    }

    pub fn with_domains(domains: impl IntoIterator<Item = DomainRecord>) -> Self {
        Self {
            registrar: Arc::new(FakeRegistrar::new()),
            billing: Arc::new(MemoryBilling::new()),
            provisioning: Arc::new(MemoryProvisioning::new()),
            orders: Arc::new(MemoryOrderStore::new()),
            domains: Arc::new(MemoryDomainStore::with_domains(domains)),
            locks: KeyedLocks::new(),
        }
    }

    pub fn context(&self) -> WorkflowContext {
        WorkflowContext {
            registrar: self.registrar.clone(),
            billing: self.billing.clone(),
            provisioning: self.provisioning.clone(),
            orders: self.orders.clone(),
            domains: self.domains.clone(),
            locks: self.locks.clone(),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: StdDuration::from_millis(1),
                max_delay: StdDuration::from_millis(4),
            },
            renewal_window: chrono::Duration::days(30),
        }
    }
}

pub fn contact(first: &str) -> ContactInformation {
    ContactInformation {
        first_name: first.to_string(),
        last_name: "Doe".to_string(),
        email: format!("{}@example.net", first.to_lowercase()),
        phone: "+1.5555551234".to_string(),
        address1: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        ..Default::default()
    }
}

pub fn register_input(domain: &str, years: u32) -> RegistrationInput {
    let mut request = DomainRegistrationRequest::new(domain, years, contact("Jane"));
    request.auto_renew = true;
    RegistrationInput {
        customer_id: "cust_1".to_string(),
        request: OrderRequest::Register(request),
    }
}

pub fn transfer_request(domain: &str, auth_code: &str) -> OrderRequest {
    OrderRequest::Transfer(DomainTransferRequest {
        domain_name: domain.to_string(),
        auth_code: auth_code.to_string(),
        years: 1,
        auto_renew: false,
        privacy_protection: true,
        nameservers: Vec::new(),
        contacts: ContactSet::new(contact("Jane")),
    })
}

/// An order sitting in `AwaitingPayment`.
pub fn pending_order(order_id: &str, domain: &str) -> DomainOrder {
    let RegistrationInput { customer_id, request } = register_input(domain, 1);
    DomainOrder {
        order_id: order_id.to_string(),
        invoice_id: Some(format!("inv_{}", order_id)),
        customer_id,
        request,
        state: OrderState::AwaitingPayment,
        registrar_reference: None,
        expiration_date: None,
        provisioned: false,
        failure: None,
        updated_at: Utc::now(),
    }
}

pub fn domain_record(domain: &str, expiration: DateTime<Utc>, auto_renew: bool) -> DomainRecord {
    DomainRecord {
        domain_id: domain.to_string(),
        domain_name: domain.to_string(),
        customer_id: "cust_1".to_string(),
        expiration_date: expiration,
        auto_renew,
        renewal_years: 1,
        renewal_marker: None,
    }
}
