use std::fmt;

use chrono::{DateTime, Utc};
use dd_registrar::types::{DomainRegistrationRequest, DomainTransferRequest};
use dd_registrar::Envelope;
use serde::{Deserialize, Serialize};

/// Lifecycle of one domain order.
///
/// ```text
/// Initiated -> AwaitingPayment -> Registering -> Provisioning -> Completed
///      \              \                \               \
///       +--------------+----------------+---------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Initiated,
    AwaitingPayment,
    Registering,
    Provisioning,
    Completed,
    Failed,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Registering => "registering",
            Self::Provisioning => "provisioning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn valid_transitions(&self) -> &'static [OrderState] {
        match self {
            Self::Initiated => &[Self::AwaitingPayment, Self::Failed],
            Self::AwaitingPayment => &[Self::Registering, Self::Failed],
            Self::Registering => &[Self::Provisioning, Self::Failed],
            Self::Provisioning => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the registrar is asked to do once the order is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderRequest {
    Register(DomainRegistrationRequest),
    Transfer(DomainTransferRequest),
}

impl OrderRequest {
    pub fn domain_name(&self) -> &str {
        match self {
            Self::Register(r) => &r.domain_name,
            Self::Transfer(r) => &r.domain_name,
        }
    }

    pub fn years(&self) -> u32 {
        match self {
            Self::Register(r) => r.years,
            Self::Transfer(r) => r.years,
        }
    }

    pub fn auto_renew(&self) -> bool {
        match self {
            Self::Register(r) => r.auto_renew,
            Self::Transfer(r) => r.auto_renew,
        }
    }
}

/// A persisted domain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOrder {
    pub order_id: String,
    pub invoice_id: Option<String>,
    pub customer_id: String,
    pub request: OrderRequest,
    pub state: OrderState,
    /// Vendor-side order or transfer id, once the registrar accepted the order.
    pub registrar_reference: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub provisioned: bool,
    pub failure: Option<FailureDetail>,
    pub updated_at: DateTime<Utc>,
}

impl DomainOrder {
    pub fn domain_name(&self) -> &str {
        self.request.domain_name()
    }
}

/// Marks a renewal in flight for one expiration date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalMarker {
    pub expiration: DateTime<Utc>,
    pub invoice_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// A domain the reseller manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain_id: String,
    pub domain_name: String,
    pub customer_id: String,
    pub expiration_date: DateTime<Utc>,
    pub auto_renew: bool,
    pub renewal_years: u32,
    pub renewal_marker: Option<RenewalMarker>,
}

/// Registrar failure as carried in a workflow result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: String,
    pub message: String,
    pub errors: Vec<String>,
}

impl FailureDetail {
    pub fn from_envelope<T>(envelope: &Envelope<T>) -> Self {
        Self {
            code: envelope.error_code().unwrap_or_default().to_string(),
            message: envelope.message().to_string(),
            errors: envelope.errors().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Waiting on something outside the workflow.
    Pending,
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    None,
    AwaitPayment,
    /// The registrar outcome is unknown; re-enter to reconcile.
    Reconcile,
    /// Registration done; provisioning still has to run.
    Provision,
    ManualReview,
}

/// Outcome of one workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub domain_name: String,
    pub order_id: Option<String>,
    pub invoice_id: Option<String>,
    pub state: Option<OrderState>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub next_action: NextAction,
    pub message: String,
    pub failure: Option<FailureDetail>,
}

impl WorkflowResult {
    pub fn for_order(order: &DomainOrder, status: WorkflowStatus, next_action: NextAction, message: impl Into<String>) -> Self {
        Self {
            status,
            domain_name: order.domain_name().to_string(),
            order_id: Some(order.order_id.clone()),
            invoice_id: order.invoice_id.clone(),
            state: Some(order.state),
            expiration_date: order.expiration_date,
            next_action,
            message: message.into(),
            failure: order.failure.clone(),
        }
    }

    pub fn for_domain(domain: &DomainRecord, status: WorkflowStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            domain_name: domain.domain_name.clone(),
            order_id: None,
            invoice_id: domain.renewal_marker.as_ref().and_then(|m| m.invoice_id.clone()),
            state: None,
            expiration_date: Some(domain.expiration_date),
            next_action: NextAction::None,
            message: message.into(),
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: FailureDetail) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_next_action(mut self, next_action: NextAction) -> Self {
        self.next_action = next_action;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, WorkflowStatus::Succeeded | WorkflowStatus::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_order_lifecycle() {
        use OrderState::*;
        assert!(Initiated.can_transition_to(AwaitingPayment));
        assert!(AwaitingPayment.can_transition_to(Registering));
        assert!(Registering.can_transition_to(Provisioning));
        assert!(Provisioning.can_transition_to(Completed));
        assert!(!AwaitingPayment.can_transition_to(Provisioning));
        assert!(!Initiated.can_transition_to(Registering));
        assert!(!Registering.can_transition_to(AwaitingPayment));
    }

    #[test]
    fn failed_is_reachable_from_every_open_state() {
        use OrderState::*;
        for state in [Initiated, AwaitingPayment, Registering, Provisioning] {
            assert!(state.can_transition_to(Failed), "{state} -> failed");
        }
        for state in [Completed, Failed] {
            assert!(state.is_terminal());
            assert!(state.valid_transitions().is_empty());
        }
    }
}
