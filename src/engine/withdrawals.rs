use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::order::ServiceFeeStatus;
use crate::models::withdrawal::{PayoutAccount, Withdrawal, WithdrawalStatus};
use crate::state::AppState;

/// Minimum calendar days between a rider's successive withdrawal requests.
const COOLDOWN_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub amount: i64,
    pub account: PayoutAccount,
}

/// Withdrawable balance: settled service fees minus everything already
/// requested, never negative.
pub fn available_balance(state: &AppState, rider_id: Uuid) -> i64 {
    let earned: i64 = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.rider == Some(rider_id)
                && order.rider_service_fee_status == ServiceFeeStatus::Paid
        })
        .map(|entry| entry.value().rider_service_fee.unwrap_or(0))
        .sum();

    let held: i64 = state
        .withdrawals
        .iter()
        .filter(|entry| {
            let w = entry.value();
            w.rider_id == rider_id
                && matches!(
                    w.status,
                    WithdrawalStatus::Pending
                        | WithdrawalStatus::Approved
                        | WithdrawalStatus::Completed
                )
        })
        .map(|entry| entry.value().amount)
        .sum();

    (earned - held).max(0)
}

/// Creates a withdrawal request, re-validating the balance server-side.
/// Validation order: positive amount, cooldown, single pending, balance.
pub fn create_withdrawal(
    state: &AppState,
    actor: Actor,
    req: NewWithdrawal,
) -> Result<Withdrawal, AppError> {
    actor.require_role(Role::Rider)?;

    let withdrawal = match validate(state, actor.id, &req) {
        Ok(()) => build(state, actor.id, req),
        Err(err) => {
            state
                .metrics
                .withdrawal_requests_total
                .with_label_values(&["rejected"])
                .inc();
            return Err(err);
        }
    };

    state
        .withdrawals
        .insert(withdrawal.id, withdrawal.clone());
    state
        .metrics
        .withdrawal_requests_total
        .with_label_values(&["accepted"])
        .inc();
    state.events.publish_withdrawal_update(&withdrawal);

    info!(
        withdrawal_id = %withdrawal.id,
        rider_id = %actor.id,
        amount = withdrawal.amount,
        "withdrawal requested"
    );

    Ok(withdrawal)
}

fn validate(state: &AppState, rider_id: Uuid, req: &NewWithdrawal) -> Result<(), AppError> {
    if req.amount <= 0 {
        return Err(AppError::BadRequest(
            "withdrawal amount must be positive".to_string(),
        ));
    }

    // Cooldown counts calendar days against the most recent withdrawal that
    // was not rejected.
    let latest_counted = state
        .withdrawals
        .iter()
        .filter(|entry| {
            let w = entry.value();
            w.rider_id == rider_id && w.status != WithdrawalStatus::Rejected
        })
        .map(|entry| entry.value().created_at)
        .max();

    if let Some(created_at) = latest_counted {
        let elapsed_days = (Utc::now().date_naive() - created_at.date_naive()).num_days();
        if elapsed_days < COOLDOWN_DAYS {
            return Err(AppError::CooldownActive {
                remaining_days: COOLDOWN_DAYS - elapsed_days,
            });
        }
    }

    let has_pending = state.withdrawals.iter().any(|entry| {
        let w = entry.value();
        w.rider_id == rider_id && w.status == WithdrawalStatus::Pending
    });
    if has_pending {
        return Err(AppError::DuplicatePendingWithdrawal);
    }

    let available = available_balance(state, rider_id);
    if req.amount > available {
        return Err(AppError::InsufficientBalance {
            shortfall: req.amount - available,
        });
    }

    Ok(())
}

fn build(state: &AppState, rider_id: Uuid, req: NewWithdrawal) -> Withdrawal {
    // Rough amount/1000 heuristic for the orders this draws against; the
    // list is informational only.
    let wanted = (req.amount / 1000).max(1) as usize;
    let settled_orders: Vec<String> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.rider == Some(rider_id)
                && order.rider_service_fee_status == ServiceFeeStatus::Paid
        })
        .map(|entry| entry.key().clone())
        .take(wanted)
        .collect();

    let now = Utc::now();
    Withdrawal {
        id: Uuid::new_v4(),
        rider_id,
        amount: req.amount,
        account: req.account,
        status: WithdrawalStatus::Pending,
        rejection_reason: None,
        settled_orders,
        created_at: now,
        updated_at: now,
    }
}

/// Operator decision on a withdrawal. Allowed moves: pending → approved,
/// pending → rejected, approved → completed.
pub fn review_withdrawal(
    state: &AppState,
    actor: Actor,
    withdrawal_id: Uuid,
    target: WithdrawalStatus,
    reason: Option<String>,
) -> Result<Withdrawal, AppError> {
    actor.require_role(Role::Admin)?;

    let updated = {
        let mut entry = state
            .withdrawals
            .get_mut(&withdrawal_id)
            .ok_or_else(|| AppError::NotFound(format!("withdrawal {withdrawal_id} not found")))?;
        let withdrawal = entry.value_mut();

        let allowed = matches!(
            (withdrawal.status, target),
            (WithdrawalStatus::Pending, WithdrawalStatus::Approved)
                | (WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
                | (WithdrawalStatus::Approved, WithdrawalStatus::Completed)
        );
        if !allowed {
            return Err(AppError::InvalidTransition(format!(
                "withdrawal cannot move from {:?} to {:?}",
                withdrawal.status, target
            )));
        }

        withdrawal.status = target;
        if target == WithdrawalStatus::Rejected {
            withdrawal.rejection_reason = reason;
        }
        withdrawal.updated_at = Utc::now();
        withdrawal.clone()
    };

    state.events.publish_withdrawal_update(&updated);

    info!(
        withdrawal_id = %updated.id,
        status = ?updated.status,
        "withdrawal reviewed"
    );

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::order::{
        Order, OrderStatus, OrderType, PaymentMethod, PaymentStatus, RiderPaymentStatus,
    };
    use crate::state::AppState;

    const RIDER: u128 = 10;
    const ADMIN: u128 = 20;

    fn rider() -> Actor {
        Actor::new(Uuid::from_u128(RIDER), Role::Rider)
    }

    fn admin() -> Actor {
        Actor::new(Uuid::from_u128(ADMIN), Role::Admin)
    }

    fn account() -> PayoutAccount {
        PayoutAccount {
            bank_name: "First Bank".to_string(),
            account_number: "0123456789".to_string(),
            account_holder: "A. Rider".to_string(),
        }
    }

    fn request(amount: i64) -> NewWithdrawal {
        NewWithdrawal {
            amount,
            account: account(),
        }
    }

    /// Inserts a completed order whose service fee has been paid out.
    fn seed_settled_order(state: &AppState, fee: i64) {
        let number = state.next_order_number();
        let order = Order {
            order_number: number.clone(),
            order_type: OrderType::SourceFulfilled,
            customer_id: Uuid::from_u128(1),
            source_id: Some(Uuid::from_u128(2)),
            pickup_address: None,
            delivery_address: "4 Receiver Road".to_string(),
            zone: "island".to_string(),
            subtotal: 5000,
            delivery_fee: fee,
            total: 5000 + fee,
            payment_method: PaymentMethod::Cash,
            payment_reference: None,
            payment_status: PaymentStatus::Paid,
            source_payment_status: PaymentStatus::Paid,
            rider_payment_reference: Some("654321".to_string()),
            rider_payment_status: RiderPaymentStatus::Verified,
            rider_service_fee: Some(crate::fees::rider_service_fee(fee)),
            rider_service_fee_status: ServiceFeeStatus::Paid,
            rider: Some(Uuid::from_u128(RIDER)),
            status: OrderStatus::Completed,
            pickup_proof: Some("img-1".to_string()),
            delivery_proof: Some("img-2".to_string()),
            created_at: Utc::now(),
            delivered_at: Some(Utc::now()),
            updated_at: Utc::now(),
        };
        state.orders.insert(number, order);
    }

    fn seed_withdrawal(state: &AppState, amount: i64, status: WithdrawalStatus, days_ago: i64) {
        let created = Utc::now() - Duration::days(days_ago);
        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            rider_id: Uuid::from_u128(RIDER),
            amount,
            account: account(),
            status,
            rejection_reason: None,
            settled_orders: Vec::new(),
            created_at: created,
            updated_at: created,
        };
        state.withdrawals.insert(withdrawal.id, withdrawal);
    }

    #[test]
    fn balance_sums_paid_fees_minus_requested_amounts() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000); // fee 2400
        seed_settled_order(&state, 2000); // fee 1600

        assert_eq!(available_balance(&state, Uuid::from_u128(RIDER)), 4000);

        seed_withdrawal(&state, 1500, WithdrawalStatus::Completed, 30);
        seed_withdrawal(&state, 1000, WithdrawalStatus::Pending, 30);
        assert_eq!(available_balance(&state, Uuid::from_u128(RIDER)), 1500);

        // Rejected requests release their amount.
        seed_withdrawal(&state, 900, WithdrawalStatus::Rejected, 30);
        assert_eq!(available_balance(&state, Uuid::from_u128(RIDER)), 1500);
    }

    #[test]
    fn balance_never_goes_negative() {
        let state = AppState::new(16);
        seed_settled_order(&state, 2000);
        seed_withdrawal(&state, 9999, WithdrawalStatus::Completed, 30);

        assert_eq!(available_balance(&state, Uuid::from_u128(RIDER)), 0);
    }

    #[test]
    fn creation_happy_path_becomes_pending() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);

        let withdrawal = create_withdrawal(&state, rider(), request(2000)).unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
        assert_eq!(withdrawal.settled_orders.len(), 1);
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let state = AppState::new(16);
        let err = create_withdrawal(&state, rider(), request(0)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn cooldown_day_six_reports_one_remaining_day() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        seed_withdrawal(&state, 100, WithdrawalStatus::Completed, 6);

        let err = create_withdrawal(&state, rider(), request(500)).unwrap_err();
        match err {
            AppError::CooldownActive { remaining_days } => assert_eq!(remaining_days, 1),
            other => panic!("expected CooldownActive, got {other:?}"),
        }
    }

    #[test]
    fn cooldown_expires_on_day_seven() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        seed_withdrawal(&state, 100, WithdrawalStatus::Completed, 7);

        let withdrawal = create_withdrawal(&state, rider(), request(500)).unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn rejected_withdrawals_do_not_start_a_cooldown() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        seed_withdrawal(&state, 100, WithdrawalStatus::Rejected, 1);

        assert!(create_withdrawal(&state, rider(), request(500)).is_ok());
    }

    #[test]
    fn second_pending_request_is_a_duplicate() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        seed_withdrawal(&state, 100, WithdrawalStatus::Pending, 10);

        let err = create_withdrawal(&state, rider(), request(500)).unwrap_err();
        assert!(matches!(err, AppError::DuplicatePendingWithdrawal));
    }

    #[test]
    fn overdraw_reports_the_numeric_shortfall() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000); // balance 2400

        let err = create_withdrawal(&state, rider(), request(3000)).unwrap_err();
        match err {
            AppError::InsufficientBalance { shortfall } => assert_eq!(shortfall, 600),
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
    }

    #[test]
    fn review_follows_the_allowed_moves_only() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        let withdrawal = create_withdrawal(&state, rider(), request(2000)).unwrap();

        // pending -> completed skips approval.
        let err = review_withdrawal(
            &state,
            admin(),
            withdrawal.id,
            WithdrawalStatus::Completed,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let approved = review_withdrawal(
            &state,
            admin(),
            withdrawal.id,
            WithdrawalStatus::Approved,
            None,
        )
        .unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Approved);

        let completed = review_withdrawal(
            &state,
            admin(),
            withdrawal.id,
            WithdrawalStatus::Completed,
            None,
        )
        .unwrap();
        assert_eq!(completed.status, WithdrawalStatus::Completed);

        // Completed records are immutable.
        let err = review_withdrawal(
            &state,
            admin(),
            withdrawal.id,
            WithdrawalStatus::Rejected,
            Some("late".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn rejection_records_the_reason() {
        let state = AppState::new(16);
        seed_settled_order(&state, 3000);
        let withdrawal = create_withdrawal(&state, rider(), request(2000)).unwrap();

        let rejected = review_withdrawal(
            &state,
            admin(),
            withdrawal.id,
            WithdrawalStatus::Rejected,
            Some("account name mismatch".to_string()),
        )
        .unwrap();

        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("account name mismatch")
        );
    }
}
