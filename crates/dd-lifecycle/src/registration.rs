use chrono::{DateTime, Utc};
use dd_registrar::types::{years_from, DomainStatus};

use crate::error::WorkflowError;
use crate::provisioning::ProvisioningWorkflow;
use crate::state::{
    DomainOrder, DomainRecord, FailureDetail, NextAction, OrderRequest, OrderState, WorkflowResult, WorkflowStatus,
};
use crate::WorkflowContext;

const MAX_YEARS: u32 = 10;

/// A customer's request to register or transfer in a domain.
#[derive(Debug, Clone)]
pub struct RegistrationInput {
    pub customer_id: String,
    pub request: OrderRequest,
}

impl RegistrationInput {
    fn validate(&self) -> Result<(), WorkflowError> {
        if self.customer_id.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("customer id is required".into()));
        }
        let domain = self.request.domain_name().trim();
        if domain.is_empty() || !domain.contains('.') {
            return Err(WorkflowError::InvalidInput(format!("'{}' is not a domain name", domain)));
        }
        let years = self.request.years();
        if years == 0 || years > MAX_YEARS {
            return Err(WorkflowError::InvalidInput(format!("years must be 1-{}, got {}", MAX_YEARS, years)));
        }
        if let OrderRequest::Transfer(transfer) = &self.request {
            if transfer.auth_code.trim().is_empty() {
                return Err(WorkflowError::InvalidInput("transfer requires an auth code".into()));
            }
        }
        Ok(())
    }
}

/// Drives an order from creation through registration to provisioning.
///
/// `register_domain`/`transfer_domain` is issued at most once per order: the
/// move to `Registering` is persisted first, and any later entry while the
/// order is in `Registering` only reconciles through `get_domain_info`.
#[derive(Clone)]
pub struct RegistrationWorkflow {
    ctx: WorkflowContext,
    provisioning: ProvisioningWorkflow,
}

impl RegistrationWorkflow {
    pub fn new(ctx: WorkflowContext) -> Self {
        let provisioning = ProvisioningWorkflow::new(ctx.clone());
        Self { ctx, provisioning }
    }

    /// Create the order and invoice. The registrar is not contacted.
    pub async fn execute(&self, input: RegistrationInput) -> Result<WorkflowResult, WorkflowError> {
        input.validate()?;
        let billing = self.ctx.billing.create_order(&input.customer_id, &input.request).await?;
        let order = DomainOrder {
            order_id: billing.order_id.clone(),
            invoice_id: Some(billing.invoice_id),
            customer_id: input.customer_id,
            request: input.request,
            state: OrderState::Initiated,
            registrar_reference: None,
            expiration_date: None,
            provisioned: false,
            failure: None,
            updated_at: Utc::now(),
        };
        self.ctx.orders.insert(order).await?;
        let order = self
            .ctx
            .orders
            .transition(&billing.order_id, OrderState::Initiated, OrderState::AwaitingPayment)
            .await?;
        tracing::info!(order_id = %order.order_id, domain = order.domain_name(), "order awaiting payment");
        Ok(WorkflowResult::for_order(
            &order,
            WorkflowStatus::Pending,
            NextAction::AwaitPayment,
            format!("invoice issued for {}", order.domain_name()),
        ))
    }

    /// Payment arrived: register the domain, then provision.
    pub async fn on_payment_received(&self, order_id: &str) -> Result<WorkflowResult, WorkflowError> {
        let _guard = self.ctx.locks.lock(order_id).await;
        let order = self
            .ctx
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))?;

        match order.state {
            OrderState::AwaitingPayment => {}
            OrderState::Registering => return self.reconcile(order).await,
            OrderState::Provisioning => return self.provisioning.provision_locked(order).await,
            OrderState::Completed => {
                return Ok(WorkflowResult::for_order(
                    &order,
                    WorkflowStatus::Succeeded,
                    NextAction::None,
                    "order already completed",
                ))
            }
            other => return Err(WorkflowError::conflict(order_id, OrderState::AwaitingPayment, other)),
        }

        let order = self
            .ctx
            .orders
            .transition(order_id, OrderState::AwaitingPayment, OrderState::Registering)
            .await?;
        tracing::info!(order_id, domain = order.domain_name(), "registering domain");

        let (envelope, reference, expiration) = match &order.request {
            OrderRequest::Register(request) => {
                let envelope = self.ctx.registrar.register_domain(request).await;
                let reference = envelope.data().and_then(|r| r.order_id.clone());
                let expiration = envelope.data().and_then(|r| r.expiration_date);
                (envelope.map(|_| ()), reference, expiration)
            }
            OrderRequest::Transfer(request) => {
                let envelope = self.ctx.registrar.transfer_domain(request).await;
                let reference = envelope.data().and_then(|t| t.transfer_id.clone());
                (envelope.map(|_| ()), reference, None)
            }
        };

        if envelope.is_success() {
            return self.registered(order, reference, expiration).await;
        }
        if envelope.is_transient() {
            tracing::warn!(order_id, error = envelope.message(), "registrar outcome unknown, reconciling");
            return self.reconcile(order).await;
        }

        let failure = FailureDetail::from_envelope(&envelope);
        self.fail(order, failure).await
    }

    /// Look the domain up instead of repeating the billed call.
    ///
    /// A registration counts as confirmed when `get_domain_info` reports a
    /// known status and, if the registrar can list the account, the domain is
    /// in that list. Transfers only need the status.
    async fn reconcile(&self, order: DomainOrder) -> Result<WorkflowResult, WorkflowError> {
        let domain = order.domain_name().to_string();
        let registrar = self.ctx.registrar.clone();
        let info = self
            .ctx
            .retry
            .read("get_domain_info", || {
                let registrar = registrar.clone();
                let domain = domain.clone();
                async move { registrar.get_domain_info(&domain).await }
            })
            .await;

        let found = info.data().filter(|i| i.status != DomainStatus::Unknown);
        if let Some(found) = found {
            let listed = match &order.request {
                OrderRequest::Register(_) => self.listed_in_account(&domain).await,
                OrderRequest::Transfer(_) => true,
            };
            if listed {
                tracing::info!(order_id = %order.order_id, domain = %domain, "registration confirmed by reconciliation");
                let expiration = found.expiration_date;
                return self.registered(order, None, expiration).await;
            }
        }

        tracing::warn!(
            order_id = %order.order_id,
            domain = %domain,
            code = info.error_code().unwrap_or_default(),
            "domain not confirmed at registrar, order left in registering"
        );
        let mut result = WorkflowResult::for_order(
            &order,
            WorkflowStatus::Pending,
            NextAction::Reconcile,
            format!("registration of {} not confirmed yet", domain),
        );
        if !info.is_success() {
            result = result.with_failure(FailureDetail::from_envelope(&info));
        }
        Ok(result)
    }

    /// `false` only when the account listing succeeded and lacks `domain`.
    async fn listed_in_account(&self, domain: &str) -> bool {
        let registrar = self.ctx.registrar.clone();
        let listing = self
            .ctx
            .retry
            .read("get_registered_domains", || {
                let registrar = registrar.clone();
                async move { registrar.get_registered_domains().await }
            })
            .await;
        match listing.data() {
            Some(domains) => domains.iter().any(|d| d.domain_name.eq_ignore_ascii_case(domain)),
            None => {
                tracing::debug!(domain, code = listing.error_code().unwrap_or_default(), "account listing unavailable");
                true
            }
        }
    }

    async fn registered(
        &self,
        mut order: DomainOrder,
        reference: Option<String>,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<WorkflowResult, WorkflowError> {
        let expiration = expiration.unwrap_or_else(|| years_from(Utc::now(), order.request.years()));
        if reference.is_some() {
            order.registrar_reference = reference;
        }
        order.expiration_date = Some(expiration);
        order.failure = None;
        self.ctx.orders.update(&order).await?;

        self.ctx
            .domains
            .put(DomainRecord {
                domain_id: order.domain_name().to_lowercase(),
                domain_name: order.domain_name().to_string(),
                customer_id: order.customer_id.clone(),
                expiration_date: expiration,
                auto_renew: order.request.auto_renew(),
                renewal_years: order.request.years(),
                renewal_marker: None,
            })
            .await?;

        let order = self
            .ctx
            .orders
            .transition(&order.order_id, OrderState::Registering, OrderState::Provisioning)
            .await?;
        tracing::info!(order_id = %order.order_id, domain = order.domain_name(), "domain registered");
        self.provisioning.provision_locked(order).await
    }

    async fn fail(&self, mut order: DomainOrder, failure: FailureDetail) -> Result<WorkflowResult, WorkflowError> {
        tracing::warn!(
            order_id = %order.order_id,
            domain = order.domain_name(),
            code = %failure.code,
            error = %failure.message,
            "registrar rejected the order"
        );
        order.failure = Some(failure);
        self.ctx.orders.update(&order).await?;
        let order = self
            .ctx
            .orders
            .transition(&order.order_id, OrderState::Registering, OrderState::Failed)
            .await?;
        let message = order
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_default();
        Ok(WorkflowResult::for_order(&order, WorkflowStatus::Failed, NextAction::ManualReview, message))
    }
}
