use chrono::Utc;
use tracing::info;

use crate::engine::lifecycle::with_order;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::order::{Order, OrderStatus, RiderPaymentStatus, ServiceFeeStatus};
use crate::state::AppState;

/// Payment reference codes are exactly 6 ASCII digits, customer and rider
/// legs alike.
pub fn validate_reference_code(code: &str) -> Result<(), AppError> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::PreconditionFailed(
            "payment reference must be exactly 6 digits".to_string(),
        ))
    }
}

/// Rider submits the remittance reference for the delivery fee collected at
/// pickup. Accepted once; the platform verifies it out of band.
pub fn submit_rider_payment(
    state: &AppState,
    actor: Actor,
    order_number: &str,
    reference: String,
) -> Result<Order, AppError> {
    actor.require_role(Role::Rider)?;
    validate_reference_code(&reference)?;

    let order = with_order(state, order_number, |order| {
        if order.rider != Some(actor.id) {
            return Err(AppError::Unauthorized(
                "order is not assigned to you".to_string(),
            ));
        }
        if order.pickup_proof.is_none() {
            return Err(AppError::PreconditionFailed(
                "pickup proof must be attached before submitting the remittance".to_string(),
            ));
        }
        // One live reference at a time; a failed verification reopens the
        // slot so the order is not stuck short of delivering.
        if matches!(
            order.rider_payment_status,
            RiderPaymentStatus::PendingVerification | RiderPaymentStatus::Verified
        ) {
            return Err(AppError::PreconditionFailed(
                "a remittance reference was already submitted".to_string(),
            ));
        }

        order.rider_payment_reference = Some(reference);
        order.rider_payment_status = RiderPaymentStatus::PendingVerification;
        Ok(())
    })?;

    info!(order_number = %order.order_number, "rider remittance submitted");
    Ok(order)
}

/// Platform operator verifies or fails a submitted remittance.
pub fn review_rider_payment(
    state: &AppState,
    actor: Actor,
    order_number: &str,
    approve: bool,
) -> Result<Order, AppError> {
    actor.require_role(Role::Admin)?;

    with_order(state, order_number, |order| {
        if order.rider_payment_status != RiderPaymentStatus::PendingVerification {
            return Err(AppError::InvalidTransition(format!(
                "rider payment is not awaiting verification (currently {:?})",
                order.rider_payment_status
            )));
        }

        order.rider_payment_status = if approve {
            RiderPaymentStatus::Verified
        } else {
            RiderPaymentStatus::Failed
        };
        Ok(())
    })
}

/// Operator confirmation: the only path to `completed` and to paying out
/// the rider's service fee. Retries against an already confirmed order are
/// a no-op, never a double payout.
pub fn confirm_delivery(
    state: &AppState,
    actor: Actor,
    order_number: &str,
) -> Result<Order, AppError> {
    actor.require_role(Role::Admin)?;

    let (order, already_confirmed) = {
        let mut entry = state
            .orders
            .get_mut(order_number)
            .ok_or_else(|| AppError::NotFound(format!("order {order_number} not found")))?;
        let order = entry.value_mut();

        if order.status == OrderStatus::Completed
            && order.rider_service_fee_status == ServiceFeeStatus::Paid
        {
            (order.clone(), true)
        } else {
            if order.status != OrderStatus::Delivered {
                return Err(AppError::PreconditionFailed(format!(
                    "order must be delivered before confirmation (currently {})",
                    order.status.as_str()
                )));
            }
            if order.rider_payment_status != RiderPaymentStatus::Verified {
                return Err(AppError::PreconditionFailed(
                    "rider payment must be verified before confirmation".to_string(),
                ));
            }
            if order.delivery_proof.is_none() {
                return Err(AppError::PreconditionFailed(
                    "delivery proof is missing".to_string(),
                ));
            }

            order.rider_service_fee_status = ServiceFeeStatus::Paid;
            order.status = OrderStatus::Completed;
            order.updated_at = Utc::now();
            (order.clone(), false)
        }
    };

    if !already_confirmed {
        state.events.publish_order_update(&order);
        info!(
            order_number = %order.order_number,
            service_fee = order.rider_service_fee.unwrap_or(0),
            "delivery confirmed, service fee paid"
        );
    }

    Ok(order)
}
