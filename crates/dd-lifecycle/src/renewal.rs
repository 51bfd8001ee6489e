use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dd_registrar::types::{years_from, DomainRenewalRequest};
use futures::future::join_all;

use crate::error::WorkflowError;
use crate::state::{DomainRecord, FailureDetail, NextAction, RenewalMarker, WorkflowResult, WorkflowStatus};
use crate::WorkflowContext;

/// Explicit and scheduled renewals.
///
/// Every renewal persists a [`RenewalMarker`] for the expiration it is
/// renewing before billing or calling the registrar. A marker without an
/// invoice means billing never completed and the registrar was not called,
/// so the next run resumes from billing. A marker with an invoice means the
/// registrar may have been called: while it matches the stored expiration,
/// later runs only reconcile.
#[derive(Clone)]
pub struct RenewalWorkflow {
    ctx: WorkflowContext,
}

impl RenewalWorkflow {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    fn lock_key(domain_id: &str) -> String {
        format!("domain:{}", domain_id)
    }

    async fn load(&self, domain_id: &str) -> Result<DomainRecord, WorkflowError> {
        self.ctx
            .domains
            .get(domain_id)
            .await?
            .ok_or_else(|| WorkflowError::DomainNotFound(domain_id.to_string()))
    }

    /// Renew `domain_id` now, for its configured number of years.
    pub async fn execute(&self, domain_id: &str) -> Result<WorkflowResult, WorkflowError> {
        let _guard = self.ctx.locks.lock(&Self::lock_key(domain_id)).await;
        let domain = self.load(domain_id).await?;
        tracing::info!(domain = %domain.domain_name, expiration = %domain.expiration_date, "explicit renewal");
        self.start(domain).await
    }

    /// Renew if auto-renew is on and the domain expires within the renewal
    /// window. Safe to call repeatedly.
    pub async fn process_auto_renewal(&self, domain_id: &str) -> Result<WorkflowResult, WorkflowError> {
        let _guard = self.ctx.locks.lock(&Self::lock_key(domain_id)).await;
        let domain = self.load(domain_id).await?;

        if !domain.auto_renew {
            return Ok(WorkflowResult::for_domain(&domain, WorkflowStatus::Skipped, "auto-renew is off"));
        }
        let horizon = Utc::now() + self.ctx.renewal_window;
        if domain.expiration_date > horizon {
            return Ok(WorkflowResult::for_domain(
                &domain,
                WorkflowStatus::Skipped,
                format!("not due until {}", domain.expiration_date.format("%Y-%m-%d")),
            ));
        }
        tracing::info!(domain = %domain.domain_name, expiration = %domain.expiration_date, "auto-renewing");
        self.start(domain).await
    }

    /// Drop the marker left by a renewal that needed manual review, so the
    /// next run may bill and renew the same expiration again.
    pub async fn release(&self, domain_id: &str) -> Result<DomainRecord, WorkflowError> {
        let _guard = self.ctx.locks.lock(&Self::lock_key(domain_id)).await;
        let mut domain = self.load(domain_id).await?;
        if let Some(marker) = domain.renewal_marker.take() {
            tracing::info!(domain = %domain.domain_name, expiration = %marker.expiration, "renewal marker released");
            self.ctx.domains.put(domain.clone()).await?;
        }
        Ok(domain)
    }

    /// Caller holds the domain lock.
    async fn start(&self, mut domain: DomainRecord) -> Result<WorkflowResult, WorkflowError> {
        match &domain.renewal_marker {
            Some(marker) if marker.expiration == domain.expiration_date && marker.invoice_id.is_some() => {
                return self.reconcile(domain).await;
            }
            Some(marker) if marker.expiration == domain.expiration_date => {
                tracing::info!(domain = %domain.domain_name, "resuming renewal that stopped before billing");
            }
            _ => {
                domain.renewal_marker = Some(RenewalMarker {
                    expiration: domain.expiration_date,
                    invoice_id: None,
                    started_at: Utc::now(),
                });
                self.ctx.domains.put(domain.clone()).await?;
            }
        }

        let invoice_id = self
            .ctx
            .billing
            .create_renewal_invoice(&domain, domain.renewal_years)
            .await?;
        if let Some(marker) = domain.renewal_marker.as_mut() {
            marker.invoice_id = Some(invoice_id);
        }
        self.ctx.domains.put(domain.clone()).await?;
        self.renew(domain).await
    }

    /// Run [`Self::process_auto_renewal`] for each id. Distinct domains run
    /// concurrently; duplicate ids are processed once.
    pub async fn sweep(&self, domain_ids: &[String]) -> Vec<(String, Result<WorkflowResult, WorkflowError>)> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = domain_ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        tracing::info!(domains = unique.len(), "renewal sweep");
        let runs = unique.iter().map(|id| async move {
            let result = self.process_auto_renewal(id).await;
            ((*id).clone(), result)
        });
        join_all(runs).await
    }

    /// Calls the registrar once. The marker stays on failure so the next run
    /// reconciles instead of renewing again.
    async fn renew(&self, mut domain: DomainRecord) -> Result<WorkflowResult, WorkflowError> {
        let request = DomainRenewalRequest {
            domain_name: domain.domain_name.clone(),
            years: domain.renewal_years,
            current_expiration: Some(domain.expiration_date),
        };
        let envelope = self.ctx.registrar.renew_domain(&request).await;

        if let Some(receipt) = envelope.data() {
            let renewed_to = receipt
                .expiration_date
                .unwrap_or_else(|| years_from(domain.expiration_date, domain.renewal_years));
            let result = self.adopt(&mut domain, renewed_to).await?;
            return Ok(result);
        }

        let failure = FailureDetail::from_envelope(&envelope);
        self.ctx.domains.put(domain.clone()).await?;
        let (status, next_action) = if envelope.is_transient() {
            (WorkflowStatus::Pending, NextAction::Reconcile)
        } else {
            (WorkflowStatus::Failed, NextAction::ManualReview)
        };
        tracing::warn!(
            domain = %domain.domain_name,
            code = %failure.code,
            error = %failure.message,
            "renewal failed"
        );
        Ok(WorkflowResult::for_domain(&domain, status, failure.message.clone())
            .with_failure(failure)
            .with_next_action(next_action))
    }

    async fn reconcile(&self, mut domain: DomainRecord) -> Result<WorkflowResult, WorkflowError> {
        let name = domain.domain_name.clone();
        let registrar = self.ctx.registrar.clone();
        let info = self
            .ctx
            .retry
            .read("get_domain_info", || {
                let registrar = registrar.clone();
                let name = name.clone();
                async move { registrar.get_domain_info(&name).await }
            })
            .await;

        let reported = info.data().and_then(|i| i.expiration_date);
        if let Some(reported) = reported.filter(|r| *r > domain.expiration_date) {
            tracing::info!(domain = %name, expiration = %reported, "renewal confirmed by reconciliation");
            return self.adopt(&mut domain, reported).await;
        }

        tracing::info!(domain = %name, "renewal already attempted for this expiration, not repeating");
        let mut result = WorkflowResult::for_domain(
            &domain,
            WorkflowStatus::Pending,
            "renewal already attempted; waiting for the registrar to report the new expiration",
        )
        .with_next_action(NextAction::Reconcile);
        if !info.is_success() {
            result = result.with_failure(FailureDetail::from_envelope(&info));
        }
        Ok(result)
    }

    async fn adopt(&self, domain: &mut DomainRecord, expiration: DateTime<Utc>) -> Result<WorkflowResult, WorkflowError> {
        domain.expiration_date = expiration;
        let invoice_id = domain.renewal_marker.take().and_then(|m| m.invoice_id);
        self.ctx.domains.put(domain.clone()).await?;
        let mut result = WorkflowResult::for_domain(
            domain,
            WorkflowStatus::Succeeded,
            format!("{} renewed until {}", domain.domain_name, expiration.format("%Y-%m-%d")),
        );
        result.invoice_id = invoice_id;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{domain_record, FlakyBilling, Harness, Script};
    use crate::collaborators::DomainStore;
    use std::sync::Arc;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    fn due_in(days: i64) -> DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    #[tokio::test]
    async fn renews_a_due_domain_and_advances_expiration() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        let result = RenewalWorkflow::new(h.context()).process_auto_renewal("example.com").await.unwrap();

        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert!(result.invoice_id.is_some());
        let stored = h.domains.get("example.com").await.unwrap().unwrap();
        assert!(stored.expiration_date > due_in(300));
        assert!(stored.renewal_marker.is_none());
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_when_not_due_or_auto_renew_is_off() {
        let h = Harness::with_domains([
            domain_record("later.com", due_in(200), true),
            domain_record("manual.com", due_in(5), false),
        ]);
        let workflow = RenewalWorkflow::new(h.context());
        let later = workflow.process_auto_renewal("later.com").await.unwrap();
        let manual = workflow.process_auto_renewal("manual.com").await.unwrap();
        assert_eq!(later.status, WorkflowStatus::Skipped);
        assert_eq!(manual.status, WorkflowStatus::Skipped);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 0);
        assert!(h.billing.invoices().is_empty());
    }

    #[tokio::test]
    async fn interrupted_renewal_is_reconciled_not_repeated() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        h.registrar.script_renew(Script::Timeout);
        let workflow = RenewalWorkflow::new(h.context());

        let first = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(first.status, WorkflowStatus::Pending);
        assert_eq!(first.next_action, NextAction::Reconcile);

        let second = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(second.status, WorkflowStatus::Pending);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.billing.invoices().len(), 1);
    }

    #[tokio::test]
    async fn reconciliation_adopts_a_later_expiration() {
        let expiration = due_in(10);
        let h = Harness::with_domains([domain_record("example.com", expiration, true)]);
        h.registrar.script_renew(Script::Timeout);
        let workflow = RenewalWorkflow::new(h.context());
        workflow.process_auto_renewal("example.com").await.unwrap();

        let renewed = years_from(expiration, 1);
        h.registrar.set_registered("example.com", Some(renewed));
        let result = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(result.expiration_date, Some(renewed));
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_twice_renews_once() {
        let h = Harness::with_domains([
            domain_record("a.com", due_in(3), true),
            domain_record("b.com", due_in(4), true),
            domain_record("c.com", due_in(90), true),
        ]);
        let workflow = RenewalWorkflow::new(h.context());
        let ids: Vec<String> = ["a.com", "b.com", "c.com", "a.com"].iter().map(|s| s.to_string()).collect();

        let first = workflow.sweep(&ids).await;
        assert_eq!(first.len(), 3);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 2);

        let second = workflow.sweep(&ids).await;
        assert!(second.iter().all(|(_, r)| r.as_ref().unwrap().status == WorkflowStatus::Skipped));
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn vendor_rejection_surfaces_detail() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        h.registrar.script_renew(Script::Reject("2105", "Object is not eligible for renewal"));
        let result = RenewalWorkflow::new(h.context()).process_auto_renewal("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.next_action, NextAction::ManualReview);
        assert_eq!(result.failure.unwrap().code, "2105");
    }

    #[tokio::test]
    async fn explicit_renewal_and_missing_domain() {
        let h = Harness::with_domains([domain_record("example.com", due_in(200), false)]);
        let workflow = RenewalWorkflow::new(h.context());
        let result = workflow.execute("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);

        let err = workflow.execute("missing.com").await.unwrap_err();
        assert!(matches!(err, WorkflowError::DomainNotFound(_)));
    }

    #[tokio::test]
    async fn billing_failure_is_resumed_on_the_next_run() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        let mut ctx = h.context();
        ctx.billing = Arc::new(FlakyBilling::new(h.billing.clone(), 1));
        let workflow = RenewalWorkflow::new(ctx);

        let err = workflow.process_auto_renewal("example.com").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Billing(_)));
        let stored = h.domains.get("example.com").await.unwrap().unwrap();
        assert!(stored.renewal_marker.unwrap().invoice_id.is_none());
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 0);

        let result = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.billing.invoices().len(), 1);
        assert_eq!(h.registrar.info_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_explicit_renewal_reconciles_after_timeout() {
        let h = Harness::with_domains([domain_record("example.com", due_in(200), false)]);
        h.registrar.script_renew(Script::Timeout);
        let workflow = RenewalWorkflow::new(h.context());

        let first = workflow.execute("example.com").await.unwrap();
        assert_eq!(first.status, WorkflowStatus::Pending);
        assert_eq!(first.next_action, NextAction::Reconcile);

        let second = workflow.execute("example.com").await.unwrap();
        assert_eq!(second.status, WorkflowStatus::Pending);
        assert_eq!(second.next_action, NextAction::Reconcile);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.billing.invoices().len(), 1);
        assert!(h.registrar.info_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn explicit_renewal_respects_an_auto_renewal_in_flight() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        h.registrar.script_renew(Script::Timeout);
        let workflow = RenewalWorkflow::new(h.context());
        workflow.process_auto_renewal("example.com").await.unwrap();

        h.registrar.script_renew(Script::Succeed);
        let result = workflow.execute("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Pending);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn released_marker_allows_a_new_attempt() {
        let h = Harness::with_domains([domain_record("example.com", due_in(10), true)]);
        h.registrar.script_renew(Script::Reject("2105", "Object is not eligible for renewal"));
        let workflow = RenewalWorkflow::new(h.context());
        workflow.process_auto_renewal("example.com").await.unwrap();

        let held = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(held.status, WorkflowStatus::Pending);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 1);

        let released = workflow.release("example.com").await.unwrap();
        assert!(released.renewal_marker.is_none());
        h.registrar.script_renew(Script::Succeed);
        let result = workflow.process_auto_renewal("example.com").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(h.registrar.renew_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.billing.invoices().len(), 2);
    }
}
