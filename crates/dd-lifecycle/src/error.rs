use thiserror::Error;

use crate::state::OrderState;

/// Errors raised by the workflow itself or by its collaborators.
///
/// Registrar failures are not errors at this level: they come back inside a
/// [`crate::WorkflowResult`] with the vendor detail attached.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("order {order_id} is {actual}, expected {expected}")]
    StateConflict {
        order_id: String,
        expected: String,
        actual: OrderState,
    },
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("domain {0} not found")]
    DomainNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("billing error: {0}")]
    Billing(String),
    #[error("provisioning error: {0}")]
    Provisioning(String),
    #[error("registrar unavailable: {0}")]
    RegistrarUnavailable(String),
}

impl WorkflowError {
    pub fn conflict(order_id: &str, expected: impl ToString, actual: OrderState) -> Self {
        Self::StateConflict {
            order_id: order_id.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }
}
