use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use dd_lifecycle::{
    DomainRecord, DomainStore, FileDomainStore, MemoryBilling, OrderRequest, RegistrationInput, RegistrationWorkflow,
    RenewalWorkflow, WorkflowContext,
};
use dd_registrar::factory::{ProviderConfig, ProviderSettings, RegistrarRegistry};
use dd_registrar::types::{ContactInformation, DomainRegistrationRequest, RegisteredDomainInfo};
use dd_registrar::RegistrarClient;
use serde::Serialize;
use serde_json::json;

use crate::cli::{Cli, Command};
use crate::settings::AppConfig;

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let simulate = cli.simulate || config.simulate();
    let registrar = select_registrar(cli.provider.as_deref(), &config, simulate)?;
    tracing::info!(provider = %registrar.provider(), simulate, "registrar selected");

    match cli.command {
        Command::Check { domains } => {
            let mut results = Vec::new();
            for domain in &domains {
                results.push(registrar.check_availability(domain).await);
            }
            print(&results)?;
            let failed = results.iter().filter(|r| !r.is_success()).count();
            if failed > 0 {
                bail!("{} of {} checks failed", failed, results.len());
            }
        }
        Command::Info { domain } => finish(registrar.get_domain_info(&domain).await)?,
        Command::Zone { domain } => finish(registrar.get_dns_zone(&domain).await)?,
        Command::Tlds { filter } => {
            let filter = (!filter.is_empty()).then_some(filter);
            finish(registrar.get_supported_tlds(filter.as_deref()).await)?
        }
        Command::Domains => finish(registrar.get_registered_domains().await)?,
        Command::Verify => finish(registrar.verify_credentials().await)?,
        Command::SimulateOrder { domain, years, customer } => {
            if !simulate {
                bail!("simulate-order only runs in simulated mode; pass --simulate");
            }
            simulate_order(registrar, &config, &domain, years, &customer).await?
        }
        Command::Sweep { execute } => sweep(registrar, &config, execute).await?,
        Command::Release { domain } => release(registrar, &config, &domain).await?,
    }
    Ok(())
}

/// Pick the client named by `--provider`, then `default_provider`, then the
/// only configured one. With nothing configured, simulated mode falls back to
/// a bare sandbox.
fn select_registrar(
    requested: Option<&str>,
    config: &AppConfig,
    simulate: bool,
) -> anyhow::Result<Arc<dyn RegistrarClient>> {
    let options = config.transport();
    if config.providers.is_empty() {
        if !simulate {
            bail!("no providers configured; add a [[providers]] section or run with --simulate");
        }
        let sandbox = ProviderConfig {
            name: "sandbox".to_string(),
            sandbox: true,
            base_url: None,
            settings: ProviderSettings::Sandbox { rdap_base: None },
        };
        return Ok(dd_registrar::factory::build_registrar(&sandbox, &options, true)?);
    }

    let registry = RegistrarRegistry::from_configs(&config.providers, &options, simulate)?;
    let name = requested.or(config.default_provider.as_deref());
    let client = match name {
        Some(name) => registry.get(name),
        None => registry.sole(),
    };
    client.with_context(|| {
        let known: Vec<&str> = registry.names().collect();
        match name {
            Some(name) => format!("provider '{}' is not configured (known: {})", name, known.join(", ")),
            None => format!("several providers configured, choose one with --provider ({})", known.join(", ")),
        }
    })
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish<T: Serialize>(envelope: dd_registrar::Envelope<T>) -> anyhow::Result<()> {
    print(&envelope)?;
    if !envelope.is_success() {
        bail!(
            "{} ({})",
            envelope.message(),
            envelope.error_code().unwrap_or_default()
        );
    }
    Ok(())
}

async fn simulate_order(
    registrar: Arc<dyn RegistrarClient>,
    config: &AppConfig,
    domain: &str,
    years: u32,
    customer: &str,
) -> anyhow::Result<()> {
    let billing = Arc::new(MemoryBilling::new());
    let mut ctx = WorkflowContext::in_memory(registrar)
        .with_retry(config.retry)
        .with_renewal_window(config.renewal_window());
    ctx.billing = billing.clone();
    let workflow = RegistrationWorkflow::new(ctx);

    let registrant = ContactInformation {
        first_name: "Demo".to_string(),
        last_name: "Customer".to_string(),
        email: format!("{}@example.invalid", customer),
        phone: "+1.5555550100".to_string(),
        address1: "1 Example Way".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        ..Default::default()
    };
    let input = RegistrationInput {
        customer_id: customer.to_string(),
        request: OrderRequest::Register(DomainRegistrationRequest::new(domain, years, registrant)),
    };

    let created = workflow.execute(input).await?;
    let order_id = created.order_id.clone().context("billing returned no order id")?;
    billing.mark_paid(&order_id);
    let completed = workflow.on_payment_received(&order_id).await?;
    print(&json!({ "created": created, "completed": completed }))?;
    if !completed.is_success() {
        bail!("order {} ended {:?}", order_id, completed.status);
    }
    Ok(())
}

async fn sweep(registrar: Arc<dyn RegistrarClient>, config: &AppConfig, execute: bool) -> anyhow::Result<()> {
    let listing = registrar.get_registered_domains().await;
    let Some(domains) = listing.data() else {
        bail!("could not list domains: {}", listing.message());
    };

    let store = FileDomainStore::open(&config.state_file)
        .with_context(|| format!("cannot load sweep state from {}", config.state_file.display()))?;
    let mut records = Vec::new();
    for listed in domains {
        let stored = store.get(&listed.domain_name.to_lowercase()).await?;
        if let Some(record) = merge_listing(stored, listed) {
            records.push(record);
        }
    }

    let horizon = Utc::now() + config.renewal_window();
    let due: Vec<&DomainRecord> = records
        .iter()
        .filter(|r| r.auto_renew && r.expiration_date <= horizon)
        .collect();
    tracing::info!(
        listed = domains.len(),
        due = due.len(),
        state = %store.path().display(),
        "sweep candidates"
    );

    if !execute {
        let listing: Vec<_> = due
            .iter()
            .map(|r| {
                json!({
                    "domain": r.domain_name,
                    "expires": r.expiration_date,
                    "in_flight": r.renewal_marker.is_some(),
                })
            })
            .collect();
        return print(&listing);
    }

    let ids: Vec<String> = due.iter().map(|r| r.domain_id.clone()).collect();
    for record in records.iter().cloned() {
        store.put(record).await?;
    }
    let ctx = WorkflowContext::in_memory(registrar)
        .with_retry(config.retry)
        .with_renewal_window(config.renewal_window())
        .with_domains(Arc::new(store));
    let results = RenewalWorkflow::new(ctx).sweep(&ids).await;

    let mut failed = 0;
    let report: Vec<_> = results
        .into_iter()
        .map(|(id, result)| match result {
            Ok(result) => {
                if !result.is_success() {
                    failed += 1;
                }
                json!({ "domain": id, "result": result })
            }
            Err(err) => {
                failed += 1;
                json!({ "domain": id, "error": err.to_string() })
            }
        })
        .collect();
    print(&report)?;
    if failed > 0 {
        bail!("{} renewal(s) did not complete", failed);
    }
    Ok(())
}

async fn release(registrar: Arc<dyn RegistrarClient>, config: &AppConfig, domain: &str) -> anyhow::Result<()> {
    let store = FileDomainStore::open(&config.state_file)
        .with_context(|| format!("cannot load sweep state from {}", config.state_file.display()))?;
    let ctx = WorkflowContext::in_memory(registrar).with_domains(Arc::new(store));
    let record = RenewalWorkflow::new(ctx).release(&domain.to_lowercase()).await?;
    print(&record)
}

/// Fold the registrar's listing into the record kept from earlier sweeps.
/// While a renewal marker is present the stored expiration is kept, so the
/// workflow reconciles the in-flight renewal instead of starting another.
fn merge_listing(stored: Option<DomainRecord>, listed: &RegisteredDomainInfo) -> Option<DomainRecord> {
    let Some(mut record) = stored else {
        return Some(DomainRecord {
            domain_id: listed.domain_name.to_lowercase(),
            domain_name: listed.domain_name.clone(),
            customer_id: String::new(),
            expiration_date: listed.expiration_date?,
            auto_renew: listed.auto_renew,
            renewal_years: 1,
            renewal_marker: None,
        });
    };
    record.auto_renew = listed.auto_renew;
    if record.renewal_marker.is_none() {
        if let Some(reported) = listed.expiration_date {
            record.expiration_date = reported;
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use dd_lifecycle::RenewalMarker;
    use dd_registrar::types::DomainStatus;

    fn listed(name: &str, expires: Option<DateTime<Utc>>, auto_renew: bool) -> RegisteredDomainInfo {
        RegisteredDomainInfo {
            domain_name: name.to_string(),
            status: DomainStatus::Active,
            registration_date: None,
            expiration_date: expires,
            auto_renew,
            privacy_protection: false,
            registrar_lock: true,
        }
    }

    fn stored(expires: DateTime<Utc>, marker: Option<RenewalMarker>) -> DomainRecord {
        DomainRecord {
            domain_id: "example.com".to_string(),
            domain_name: "example.com".to_string(),
            customer_id: "cust-7".to_string(),
            expiration_date: expires,
            auto_renew: true,
            renewal_years: 3,
            renewal_marker: marker,
        }
    }

    #[test]
    fn new_domains_start_without_a_marker() {
        let expires = Utc::now() + Duration::days(5);
        let record = merge_listing(None, &listed("Example.COM", Some(expires), true)).unwrap();
        assert_eq!(record.domain_id, "example.com");
        assert_eq!(record.domain_name, "Example.COM");
        assert_eq!(record.expiration_date, expires);
        assert_eq!(record.renewal_years, 1);
        assert!(record.renewal_marker.is_none());

        assert!(merge_listing(None, &listed("example.com", None, true)).is_none());
    }

    #[test]
    fn in_flight_renewal_keeps_its_marker_and_expiration() {
        let expires = Utc::now() + Duration::days(5);
        let marker = RenewalMarker {
            expiration: expires,
            invoice_id: Some("inv-1".to_string()),
            started_at: Utc::now(),
        };
        let later = expires + Duration::days(365);
        let record = merge_listing(Some(stored(expires, Some(marker.clone()))), &listed("example.com", Some(later), false))
            .unwrap();
        assert_eq!(record.expiration_date, expires);
        assert_eq!(record.renewal_marker, Some(marker));
        assert!(!record.auto_renew);
        assert_eq!(record.customer_id, "cust-7");
        assert_eq!(record.renewal_years, 3);
    }

    #[test]
    fn settled_records_follow_the_registrar() {
        let expires = Utc::now() + Duration::days(5);
        let later = expires + Duration::days(365);
        let record = merge_listing(Some(stored(expires, None)), &listed("example.com", Some(later), true)).unwrap();
        assert_eq!(record.expiration_date, later);

        let kept = merge_listing(Some(stored(expires, None)), &listed("example.com", None, true)).unwrap();
        assert_eq!(kept.expiration_date, expires);
    }

    #[tokio::test]
    async fn markers_persist_between_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let expires = Utc::now() + Duration::days(5);
        let marker = RenewalMarker { expiration: expires, invoice_id: None, started_at: Utc::now() };
        FileDomainStore::open(&path)
            .unwrap()
            .put(stored(expires, Some(marker.clone())))
            .await
            .unwrap();

        let store = FileDomainStore::open(&path).unwrap();
        let previous = store.get("example.com").await.unwrap();
        let record = merge_listing(previous, &listed("example.com", Some(expires), true)).unwrap();
        assert_eq!(record.renewal_marker, Some(marker));
    }
}
