use chrono::Utc;
use tracing::info;

use crate::error::AppError;
use crate::fees;
use crate::models::actor::{Actor, Role};
use crate::models::order::{Order, OrderStatus, OrderType};
use crate::state::AppState;

/// First status a claim advances an order to. Source-fulfilled orders go
/// through the explicit `assigned` step; peer-to-peer riders head straight
/// for the pickup address.
pub fn first_assigned_status(order_type: OrderType) -> OrderStatus {
    match order_type {
        OrderType::SourceFulfilled => OrderStatus::Assigned,
        OrderType::PeerToPeer => OrderStatus::PickingUp,
    }
}

fn pre_claim_status(order_type: OrderType) -> OrderStatus {
    match order_type {
        OrderType::SourceFulfilled => OrderStatus::Preparing,
        OrderType::PeerToPeer => OrderStatus::Pending,
    }
}

/// Whether a rider may currently claim this order.
pub fn claimable(order: &Order) -> bool {
    if order.rider.is_some() {
        return false;
    }

    match order.order_type {
        OrderType::SourceFulfilled => order.status == OrderStatus::Preparing,
        OrderType::PeerToPeer => {
            matches!(order.status, OrderStatus::Pending | OrderStatus::Preparing)
        }
    }
}

/// Atomically claims an order for a rider.
///
/// The eligibility re-check and the assignment happen under the store's
/// per-entry write lock, so two riders racing from the same snapshot cannot
/// both win. The loser path takes a fresh read purely to word the rejection.
pub fn claim(state: &AppState, actor: Actor, order_number: &str) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    let claimed = {
        let mut entry = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| AppError::NotFound(format!("order {order_number} not found")))?;
        let order = entry.value_mut();

        if claimable(order) {
            order.rider = Some(actor.id);
            order.status = first_assigned_status(order.order_type);
            if order.rider_service_fee.is_none() && order.delivery_fee > 0 {
                order.rider_service_fee = Some(fees::rider_service_fee(order.delivery_fee));
            }
            order.updated_at = Utc::now();
            Some(order.clone())
        } else {
            None
        }
    };

    let Some(order) = claimed else {
        let (outcome, err) = claim_rejection(state, actor, order_number);
        state.metrics.claims_total.with_label_values(&[outcome]).inc();
        return Err(err);
    };

    state.metrics.claims_total.with_label_values(&["won"]).inc();
    state.events.publish_order_update(&order);
    state.events.publish_removal(&order.order_number);

    info!(
        order_number = %order.order_number,
        rider_id = %actor.id,
        status = order.status.as_str(),
        "order claimed"
    );

    Ok(order)
}

/// Reads the record again to explain exactly why the claim was refused.
/// A refusal counts as a race loss only when some rider holds the order;
/// everything else is plain ineligibility.
fn claim_rejection(state: &AppState, actor: Actor, order_number: &str) -> (&'static str, AppError) {
    match state.orders.get(order_number) {
        Some(order) if order.rider == Some(actor.id) => (
            "lost",
            AppError::AlreadyClaimed("order is already assigned to you".to_string()),
        ),
        Some(order) if order.rider.is_some() => (
            "lost",
            AppError::AlreadyClaimed("order was claimed by another rider".to_string()),
        ),
        Some(order) => (
            "ineligible",
            AppError::AlreadyClaimed(format!(
                "order is no longer available (status {})",
                order.status.as_str()
            )),
        ),
        None => (
            "ineligible",
            AppError::NotFound(format!("order {order_number} not found")),
        ),
    }
}

/// Releases a claimed order while it is still in the earliest assigned
/// state, reverting it to the pre-claim status and re-announcing it.
pub fn release(state: &AppState, actor: Actor, order_number: &str) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    let released = {
        let mut entry = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| AppError::NotFound(format!("order {order_number} not found")))?;
        let order = entry.value_mut();

        if order.rider != Some(actor.id) {
            return Err(AppError::Unauthorized(
                "order is not assigned to you".to_string(),
            ));
        }
        if order.status != first_assigned_status(order.order_type) {
            return Err(AppError::InvalidTransition(format!(
                "cannot release an order in status {}",
                order.status.as_str()
            )));
        }

        order.rider = None;
        order.status = pre_claim_status(order.order_type);
        order.updated_at = Utc::now();
        order.clone()
    };

    state.events.publish_order_update(&released);
    state.events.publish_availability(&released);

    info!(
        order_number = %released.order_number,
        rider_id = %actor.id,
        "order released"
    );

    Ok(released)
}
