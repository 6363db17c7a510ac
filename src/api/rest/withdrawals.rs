use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::withdrawals::{self, NewWithdrawal};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::withdrawal::{PayoutAccount, Withdrawal, WithdrawalStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/withdrawals", post(create_withdrawal).get(list_withdrawals))
        .route("/withdrawals/balance", get(get_balance))
        .route("/withdrawals/:id/review", post(review_withdrawal))
}

#[derive(Deserialize)]
pub struct CreateWithdrawalRequest {
    pub amount: i64,
    pub account: PayoutAccount,
}

async fn create_withdrawal(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    withdrawals::create_withdrawal(
        &state,
        actor,
        NewWithdrawal {
            amount: payload.amount,
            account: payload.account,
        },
    )
    .map(Json)
}

async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let mut list: Vec<Withdrawal> = match actor.role {
        Role::Admin => state
            .withdrawals
            .iter()
            .map(|entry| entry.value().clone())
            .collect(),
        Role::Rider => state
            .withdrawals
            .iter()
            .filter(|entry| entry.value().rider_id == actor.id)
            .map(|entry| entry.value().clone())
            .collect(),
        _ => {
            return Err(AppError::Unauthorized(
                "withdrawals are visible to riders and admins only".to_string(),
            ));
        }
    };

    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(list))
}

#[derive(Serialize)]
struct BalanceResponse {
    available_balance: i64,
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<BalanceResponse>, AppError> {
    actor.require_role(Role::Rider)?;

    Ok(Json(BalanceResponse {
        available_balance: withdrawals::available_balance(&state, actor.id),
    }))
}

#[derive(Deserialize)]
pub struct ReviewWithdrawalRequest {
    pub status: WithdrawalStatus,
    pub reason: Option<String>,
}

async fn review_withdrawal(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewWithdrawalRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    withdrawals::review_withdrawal(&state, actor, id, payload.status, payload.reason).map(Json)
}
