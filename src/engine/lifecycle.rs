use chrono::Utc;
use tracing::info;

use crate::error::AppError;
use crate::fees;
use crate::models::actor::{Actor, Role};
use crate::models::order::{
    Order, OrderStatus, OrderType, PaymentMethod, PaymentStatus, RiderPaymentStatus,
};
use crate::state::AppState;

/// Runs a validated mutation against one order under its entry lock and
/// fans the updated record out. The closure must do all of its checks
/// before touching the record, so a rejected request leaves it unchanged.
pub(crate) fn with_order<F>(
    state: &AppState,
    order_number: &str,
    mutate: F,
) -> Result<Order, AppError>
where
    F: FnOnce(&mut Order) -> Result<(), AppError>,
{
    let updated = {
        let mut entry = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| AppError::NotFound(format!("order {order_number} not found")))?;
        let order = entry.value_mut();
        mutate(order)?;
        order.updated_at = Utc::now();
        order.clone()
    };

    state.events.publish_order_update(&updated);
    Ok(updated)
}

fn ensure_attached_rider(order: &Order, actor: Actor) -> Result<(), AppError> {
    if order.rider == Some(actor.id) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "order is not assigned to you".to_string(),
        ))
    }
}

fn ensure_source_owner(order: &Order, actor: Actor) -> Result<(), AppError> {
    if order.source_id == Some(actor.id) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "order does not belong to this source".to_string(),
        ))
    }
}

fn invalid_from(order: &Order, wanted: OrderStatus) -> AppError {
    AppError::InvalidTransition(format!(
        "cannot move from {} to {}",
        order.status.as_str(),
        wanted.as_str()
    ))
}

/// Source acceptance: pending → preparing. Settles the source's delivery-fee
/// obligation and opens the order to riders.
pub fn accept(state: &AppState, actor: Actor, order_number: &str) -> Result<Order, AppError> {
    actor.require_role(Role::Source)?;

    let order = with_order(state, order_number, |order| {
        ensure_source_owner(order, actor)?;
        if order.order_type != OrderType::SourceFulfilled {
            return Err(AppError::InvalidTransition(
                "peer-to-peer orders have no acceptance step".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(invalid_from(order, OrderStatus::Preparing));
        }

        order.status = OrderStatus::Preparing;
        order.source_payment_status = PaymentStatus::Paid;
        Ok(())
    })?;

    state.events.publish_availability(&order);
    info!(order_number = %order.order_number, "order accepted by source");
    Ok(order)
}

/// "Ready for pickup" signal from the source once a rider is attached.
pub fn mark_ready(state: &AppState, actor: Actor, order_number: &str) -> Result<Order, AppError> {
    actor.require_role(Role::Source)?;

    with_order(state, order_number, |order| {
        ensure_source_owner(order, actor)?;
        if order.status != OrderStatus::Assigned {
            return Err(invalid_from(order, OrderStatus::PickingUp));
        }

        order.status = OrderStatus::PickingUp;
        Ok(())
    })
}

pub fn attach_pickup_proof(
    state: &AppState,
    actor: Actor,
    order_number: &str,
    proof: String,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    with_order(state, order_number, |order| {
        ensure_attached_rider(order, actor)?;
        if !matches!(order.status, OrderStatus::Assigned | OrderStatus::PickingUp) {
            return Err(AppError::InvalidTransition(format!(
                "pickup proof cannot be attached in status {}",
                order.status.as_str()
            )));
        }

        order.pickup_proof = Some(proof);
        Ok(())
    })
}

pub fn attach_delivery_proof(
    state: &AppState,
    actor: Actor,
    order_number: &str,
    proof: String,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    with_order(state, order_number, |order| {
        ensure_attached_rider(order, actor)?;
        if !matches!(order.status, OrderStatus::Delivering | OrderStatus::Delivered) {
            return Err(AppError::InvalidTransition(format!(
                "delivery proof cannot be attached in status {}",
                order.status.as_str()
            )));
        }

        order.delivery_proof = Some(proof);
        Ok(())
    })
}

pub fn mark_picked_up(
    state: &AppState,
    actor: Actor,
    order_number: &str,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    with_order(state, order_number, |order| {
        ensure_attached_rider(order, actor)?;
        if order.status != OrderStatus::PickingUp {
            return Err(invalid_from(order, OrderStatus::PickedUp));
        }
        if order.pickup_proof.is_none() {
            return Err(AppError::PreconditionFailed(
                "pickup proof is required before marking picked-up".to_string(),
            ));
        }

        order.status = OrderStatus::PickedUp;
        Ok(())
    })
}

/// Progression past picked-up is where the rider's remittance gate sits for
/// source-fulfilled orders.
pub fn mark_delivering(
    state: &AppState,
    actor: Actor,
    order_number: &str,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    with_order(state, order_number, |order| {
        ensure_attached_rider(order, actor)?;
        if order.status != OrderStatus::PickedUp {
            return Err(invalid_from(order, OrderStatus::Delivering));
        }
        if order.order_type == OrderType::SourceFulfilled
            && order.rider_payment_status != RiderPaymentStatus::Verified
        {
            return Err(AppError::PreconditionFailed(
                "rider payment must be verified before delivering".to_string(),
            ));
        }

        order.status = OrderStatus::Delivering;
        Ok(())
    })
}

pub fn mark_delivered(
    state: &AppState,
    actor: Actor,
    order_number: &str,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;

    let order = with_order(state, order_number, |order| {
        ensure_attached_rider(order, actor)?;
        if order.status != OrderStatus::Delivering {
            return Err(invalid_from(order, OrderStatus::Delivered));
        }

        order.status = OrderStatus::Delivered;
        order.delivered_at = Some(Utc::now());
        // Cash settles on handover; transfers were referenced at creation.
        if order.payment_method == PaymentMethod::Cash {
            order.payment_status = PaymentStatus::Paid;
        }
        if order.rider_service_fee.is_none() && order.delivery_fee > 0 {
            order.rider_service_fee = Some(fees::rider_service_fee(order.delivery_fee));
        }
        Ok(())
    })?;

    info!(order_number = %order.order_number, "order delivered");
    Ok(order)
}

/// Cancellation by the customer or the source, only while no rider exists.
pub fn cancel(state: &AppState, actor: Actor, order_number: &str) -> Result<Order, AppError> {
    let mut was_claimable = false;

    let order = with_order(state, order_number, |order| {
        match actor.role {
            Role::Customer if order.customer_id == actor.id => {}
            Role::Source if order.source_id == Some(actor.id) => {}
            Role::Customer | Role::Source => {
                return Err(AppError::Unauthorized(
                    "order does not belong to you".to_string(),
                ));
            }
            _ => {
                return Err(AppError::Unauthorized(
                    "only the customer or the source may cancel".to_string(),
                ));
            }
        }

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Preparing) {
            return Err(AppError::InvalidTransition(format!(
                "order in status {} can no longer be cancelled",
                order.status.as_str()
            )));
        }

        was_claimable = crate::engine::dispatch::claimable(order);
        order.status = OrderStatus::Cancelled;
        Ok(())
    })?;

    if was_claimable {
        state.events.publish_removal(&order.order_number);
    }

    info!(order_number = %order.order_number, "order cancelled");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::engine::dispatch::claim;
    use crate::models::order::ServiceFeeStatus;
    use crate::state::AppState;

    const CUSTOMER: u128 = 1;
    const SOURCE: u128 = 2;
    const RIDER: u128 = 10;

    fn actor(seed: u128, role: Role) -> Actor {
        Actor::new(Uuid::from_u128(seed), role)
    }

    fn seed_order(state: &AppState, order_type: OrderType, method: PaymentMethod) -> String {
        let number = state.next_order_number();
        let order = Order {
            order_number: number.clone(),
            order_type,
            customer_id: Uuid::from_u128(CUSTOMER),
            source_id: match order_type {
                OrderType::SourceFulfilled => Some(Uuid::from_u128(SOURCE)),
                OrderType::PeerToPeer => None,
            },
            pickup_address: match order_type {
                OrderType::SourceFulfilled => None,
                OrderType::PeerToPeer => Some("12 Sender Close".to_string()),
            },
            delivery_address: "4 Receiver Road".to_string(),
            zone: "island".to_string(),
            subtotal: match order_type {
                OrderType::SourceFulfilled => 5500,
                OrderType::PeerToPeer => 0,
            },
            delivery_fee: 3000,
            total: match order_type {
                OrderType::SourceFulfilled => 8500,
                OrderType::PeerToPeer => 3000,
            },
            payment_method: method,
            payment_reference: None,
            payment_status: PaymentStatus::Pending,
            source_payment_status: PaymentStatus::Pending,
            rider_payment_reference: None,
            rider_payment_status: RiderPaymentStatus::Unsubmitted,
            rider_service_fee: None,
            rider_service_fee_status: ServiceFeeStatus::Pending,
            rider: None,
            status: OrderStatus::Pending,
            pickup_proof: None,
            delivery_proof: None,
            created_at: Utc::now(),
            delivered_at: None,
            updated_at: Utc::now(),
        };
        state.orders.insert(number.clone(), order);
        number
    }

    fn verify_rider_leg(state: &AppState, number: &str) {
        state.orders.get_mut(number).unwrap().rider_payment_status =
            RiderPaymentStatus::Verified;
    }

    #[test]
    fn accept_settles_source_leg_and_opens_order() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        let order = accept(&state, actor(SOURCE, Role::Source), &number).unwrap();

        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.source_payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn accept_by_other_source_is_unauthorized() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        let err = accept(&state, actor(99, Role::Source), &number).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn picked_up_requires_pickup_proof() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);
        accept(&state, actor(SOURCE, Role::Source), &number).unwrap();
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();
        mark_ready(&state, actor(SOURCE, Role::Source), &number).unwrap();

        let err = mark_picked_up(&state, actor(RIDER, Role::Rider), &number).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        attach_pickup_proof(
            &state,
            actor(RIDER, Role::Rider),
            &number,
            "img-1".to_string(),
        )
        .unwrap();
        let order = mark_picked_up(&state, actor(RIDER, Role::Rider), &number).unwrap();
        assert_eq!(order.status, OrderStatus::PickedUp);
    }

    #[test]
    fn delivering_gated_on_verified_rider_leg_for_source_fulfilled() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);
        accept(&state, actor(SOURCE, Role::Source), &number).unwrap();
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();
        mark_ready(&state, actor(SOURCE, Role::Source), &number).unwrap();
        attach_pickup_proof(
            &state,
            actor(RIDER, Role::Rider),
            &number,
            "img-1".to_string(),
        )
        .unwrap();
        mark_picked_up(&state, actor(RIDER, Role::Rider), &number).unwrap();

        let err = mark_delivering(&state, actor(RIDER, Role::Rider), &number).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));

        verify_rider_leg(&state, &number);
        let order = mark_delivering(&state, actor(RIDER, Role::Rider), &number).unwrap();
        assert_eq!(order.status, OrderStatus::Delivering);
    }

    #[test]
    fn peer_to_peer_skips_the_remittance_gate() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::PeerToPeer, PaymentMethod::Cash);
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();
        attach_pickup_proof(
            &state,
            actor(RIDER, Role::Rider),
            &number,
            "img-1".to_string(),
        )
        .unwrap();
        mark_picked_up(&state, actor(RIDER, Role::Rider), &number).unwrap();

        let order = mark_delivering(&state, actor(RIDER, Role::Rider), &number).unwrap();
        assert_eq!(order.status, OrderStatus::Delivering);
    }

    #[test]
    fn delivered_settles_cash_and_computes_service_fee_once() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::PeerToPeer, PaymentMethod::Cash);
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();
        attach_pickup_proof(
            &state,
            actor(RIDER, Role::Rider),
            &number,
            "img-1".to_string(),
        )
        .unwrap();
        mark_picked_up(&state, actor(RIDER, Role::Rider), &number).unwrap();
        mark_delivering(&state, actor(RIDER, Role::Rider), &number).unwrap();

        let fee_at_claim = state.orders.get(&number).unwrap().rider_service_fee;
        let order = mark_delivered(&state, actor(RIDER, Role::Rider), &number).unwrap();

        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.delivered_at.is_some());
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.rider_service_fee, Some(2400));
        // Unchanged since the claim computed it.
        assert_eq!(order.rider_service_fee, fee_at_claim);
    }

    #[test]
    fn rider_invariant_holds_across_the_lifecycle() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        let check = |state: &AppState| {
            let order = state.orders.get(&number).unwrap().clone();
            assert_eq!(order.rider.is_some(), order.status.requires_rider());
        };

        check(&state);
        accept(&state, actor(SOURCE, Role::Source), &number).unwrap();
        check(&state);
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();
        check(&state);
        mark_ready(&state, actor(SOURCE, Role::Source), &number).unwrap();
        check(&state);
    }

    #[test]
    fn cancel_allowed_only_before_a_rider_exists() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);
        accept(&state, actor(SOURCE, Role::Source), &number).unwrap();
        claim(&state, actor(RIDER, Role::Rider), &number).unwrap();

        let err = cancel(&state, actor(CUSTOMER, Role::Customer), &number).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn customer_can_cancel_pending_order() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        let order = cancel(&state, actor(CUSTOMER, Role::Customer), &number).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn rider_cannot_cancel() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        let err = cancel(&state, actor(RIDER, Role::Rider), &number).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn direct_status_skip_is_rejected() {
        let state = AppState::new(16);
        let number = seed_order(&state, OrderType::SourceFulfilled, PaymentMethod::Cash);

        // No acceptance, no claim: rider ops must all refuse.
        let err = mark_delivered(&state, actor(RIDER, Role::Rider), &number).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let order = state.orders.get(&number).unwrap().clone();
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
