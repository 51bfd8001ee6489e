use crate::error::WorkflowError;
use crate::state::{DomainOrder, NextAction, OrderState, WorkflowResult, WorkflowStatus};
use crate::WorkflowContext;

/// Activates the purchased service for a registered order.
#[derive(Clone)]
pub struct ProvisioningWorkflow {
    ctx: WorkflowContext,
}

impl ProvisioningWorkflow {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Provision `order_id`. Calling it again for a completed order is a
    /// no-op success.
    pub async fn provision(&self, order_id: &str) -> Result<WorkflowResult, WorkflowError> {
        let _guard = self.ctx.locks.lock(order_id).await;
        let order = self
            .ctx
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))?;
        self.provision_locked(order).await
    }

    /// Caller holds the order lock.
    pub(crate) async fn provision_locked(&self, mut order: DomainOrder) -> Result<WorkflowResult, WorkflowError> {
        match order.state {
            OrderState::Completed => {
                return Ok(WorkflowResult::for_order(
                    &order,
                    WorkflowStatus::Succeeded,
                    NextAction::None,
                    "order already provisioned",
                ));
            }
            OrderState::Provisioning => {}
            other => return Err(WorkflowError::conflict(&order.order_id, OrderState::Provisioning, other)),
        }

        if !order.provisioned {
            if !self.ctx.billing.is_order_active(&order.order_id).await? {
                tracing::info!(order_id = %order.order_id, "order not active yet, provisioning deferred");
                return Ok(WorkflowResult::for_order(
                    &order,
                    WorkflowStatus::Pending,
                    NextAction::Provision,
                    "waiting for the order to become active",
                ));
            }
            self.ctx.provisioning.activate(&order).await?;
            order.provisioned = true;
            self.ctx.orders.update(&order).await?;
        }

        let order = self
            .ctx
            .orders
            .transition(&order.order_id, OrderState::Provisioning, OrderState::Completed)
            .await?;
        tracing::info!(order_id = %order.order_id, domain = order.domain_name(), "order completed");
        Ok(WorkflowResult::for_order(
            &order,
            WorkflowStatus::Succeeded,
            NextAction::None,
            format!("{} provisioned", order.domain_name()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pending_order, Harness};
    use crate::collaborators::OrderStore;

    async fn seed_provisioning(h: &Harness, order_id: &str) {
        let mut order = pending_order(order_id, "example.com");
        order.state = OrderState::Provisioning;
        h.orders.insert(order).await.unwrap();
    }

    #[tokio::test]
    async fn activates_only_after_the_order_is_active() {
        let h = Harness::new();
        seed_provisioning(&h, "ord_1").await;
        let workflow = ProvisioningWorkflow::new(h.context());

        let result = workflow.provision("ord_1").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Pending);
        assert_eq!(result.next_action, NextAction::Provision);
        assert!(h.provisioning.activations().is_empty());

        h.billing.mark_paid("ord_1");
        let result = workflow.provision("ord_1").await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Succeeded);
        assert_eq!(result.state, Some(OrderState::Completed));
        assert_eq!(h.provisioning.activations(), vec!["ord_1".to_string()]);
    }

    #[tokio::test]
    async fn re_provisioning_a_completed_order_is_a_no_op() {
        let h = Harness::new();
        seed_provisioning(&h, "ord_1").await;
        h.billing.mark_paid("ord_1");
        let workflow = ProvisioningWorkflow::new(h.context());

        workflow.provision("ord_1").await.unwrap();
        let again = workflow.provision("ord_1").await.unwrap();
        assert_eq!(again.status, WorkflowStatus::Succeeded);
        assert_eq!(h.provisioning.activations().len(), 1);
    }

    #[tokio::test]
    async fn unpaid_orders_cannot_be_provisioned() {
        let h = Harness::new();
        h.orders.insert(pending_order("ord_1", "example.com")).await.unwrap();
        let err = ProvisioningWorkflow::new(h.context()).provision("ord_1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { actual: OrderState::AwaitingPayment, .. }));
    }

    #[tokio::test]
    async fn unknown_order() {
        let h = Harness::new();
        let err = ProvisioningWorkflow::new(h.context()).provision("nope").await.unwrap_err();
        assert!(matches!(err, WorkflowError::OrderNotFound(id) if id == "nope"));
    }
}
