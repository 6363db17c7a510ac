use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::{dispatch, lifecycle, payments};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::order::{
    Order, OrderType, PaymentMethod, PaymentStatus, RiderPaymentStatus, ServiceFeeStatus,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/available", get(list_available))
        .route("/orders/:number", get(get_order))
        .route("/orders/:number/accept", post(accept_order))
        .route("/orders/:number/claim", post(claim_order))
        .route("/orders/:number/release", post(release_order))
        .route("/orders/:number/ready", post(mark_ready))
        .route("/orders/:number/pickup-proof", post(attach_pickup_proof))
        .route("/orders/:number/delivery-proof", post(attach_delivery_proof))
        .route("/orders/:number/picked-up", post(mark_picked_up))
        .route("/orders/:number/delivering", post(mark_delivering))
        .route("/orders/:number/delivered", post(mark_delivered))
        .route("/orders/:number/cancel", post(cancel_order))
        .route("/orders/:number/rider-payment", post(submit_rider_payment))
        .route(
            "/orders/:number/rider-payment/review",
            post(review_rider_payment),
        )
        .route("/orders/:number/confirm", post(confirm_delivery))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub source_id: Option<Uuid>,
    pub pickup_address: Option<String>,
    pub delivery_address: String,
    pub zone: String,
    #[serde(default)]
    pub subtotal: i64,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    actor.require_role(Role::Customer)?;

    if payload.delivery_address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "delivery address cannot be empty".to_string(),
        ));
    }
    if payload.subtotal < 0 {
        return Err(AppError::BadRequest(
            "subtotal cannot be negative".to_string(),
        ));
    }

    let (source_id, pickup_address, subtotal) = match payload.order_type {
        OrderType::SourceFulfilled => {
            let source_id = payload.source_id.ok_or_else(|| {
                AppError::BadRequest("source_id is required for source-fulfilled orders".to_string())
            })?;
            (Some(source_id), None, payload.subtotal)
        }
        OrderType::PeerToPeer => {
            let pickup = payload
                .pickup_address
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "pickup_address is required for peer-to-peer orders".to_string(),
                    )
                })?;
            // Peer-to-peer orders carry no goods value, only the fee.
            (None, Some(pickup), 0)
        }
    };

    let (payment_reference, payment_status) = match payload.payment_method {
        PaymentMethod::Cash => (None, PaymentStatus::Pending),
        PaymentMethod::Transfer => {
            let reference = payload.payment_reference.ok_or_else(|| {
                AppError::PreconditionFailed(
                    "payment reference is required for transfers".to_string(),
                )
            })?;
            payments::validate_reference_code(&reference)?;
            (Some(reference), PaymentStatus::Paid)
        }
    };

    let delivery_fee = state.fee_table.delivery_fee(&payload.zone);
    let now = Utc::now();
    let order = Order {
        order_number: state.next_order_number(),
        order_type: payload.order_type,
        customer_id: actor.id,
        source_id,
        pickup_address,
        delivery_address: payload.delivery_address,
        zone: payload.zone,
        subtotal,
        delivery_fee,
        total: subtotal + delivery_fee,
        payment_method: payload.payment_method,
        payment_reference,
        payment_status,
        source_payment_status: PaymentStatus::Pending,
        rider_payment_reference: None,
        rider_payment_status: RiderPaymentStatus::Unsubmitted,
        rider_service_fee: None,
        rider_service_fee_status: ServiceFeeStatus::Pending,
        rider: None,
        status: crate::models::order::OrderStatus::Pending,
        pickup_proof: None,
        delivery_proof: None,
        created_at: now,
        delivered_at: None,
        updated_at: now,
    };

    state.orders.insert(order.order_number.clone(), order.clone());
    state
        .metrics
        .orders_created_total
        .with_label_values(&[order.order_type.as_str()])
        .inc();

    state.events.publish_order_update(&order);
    // Peer-to-peer orders are claimable from the moment they exist.
    if order.order_type == OrderType::PeerToPeer {
        state.events.publish_availability(&order);
    }

    info!(
        order_number = %order.order_number,
        order_type = order.order_type.as_str(),
        total = order.total,
        "order created"
    );

    Ok(Json(order))
}

fn can_view(order: &Order, actor: Actor) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Customer => order.customer_id == actor.id,
        Role::Source => order.source_id == Some(actor.id),
        Role::Rider => order.rider == Some(actor.id) || dispatch::claimable(order),
    }
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&number)
        .ok_or_else(|| AppError::NotFound(format!("order {number} not found")))?
        .clone();

    if !can_view(&order, actor) {
        return Err(AppError::Unauthorized(
            "order is not visible to you".to_string(),
        ));
    }

    Ok(Json(order))
}

/// Orders scoped to the caller: admins see everything, everyone else sees
/// their own side of the ledger.
async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Json<Vec<Order>> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            match actor.role {
                Role::Admin => true,
                Role::Customer => order.customer_id == actor.id,
                Role::Source => order.source_id == Some(actor.id),
                Role::Rider => order.rider == Some(actor.id),
            }
        })
        .map(|entry| entry.value().clone())
        .collect();

    orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
    Json(orders)
}

/// The shared availability pool every rider polls and races on.
async fn list_available(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Order>>, AppError> {
    actor.require_role(Role::Rider)?;

    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| dispatch::claimable(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
    Ok(Json(orders))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::accept(&state, actor, &number).map(Json)
}

async fn claim_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    dispatch::claim(&state, actor, &number).map(Json)
}

async fn release_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    dispatch::release(&state, actor, &number).map(Json)
}

async fn mark_ready(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::mark_ready(&state, actor, &number).map(Json)
}

#[derive(Deserialize)]
pub struct AttachProofRequest {
    pub proof: String,
}

async fn attach_pickup_proof(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
    Json(payload): Json<AttachProofRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::attach_pickup_proof(&state, actor, &number, payload.proof).map(Json)
}

async fn attach_delivery_proof(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
    Json(payload): Json<AttachProofRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::attach_delivery_proof(&state, actor, &number, payload.proof).map(Json)
}

async fn mark_picked_up(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::mark_picked_up(&state, actor, &number).map(Json)
}

async fn mark_delivering(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::mark_delivering(&state, actor, &number).map(Json)
}

async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::mark_delivered(&state, actor, &number).map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    lifecycle::cancel(&state, actor, &number).map(Json)
}

#[derive(Deserialize)]
pub struct RiderPaymentRequest {
    pub reference: String,
}

async fn submit_rider_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
    Json(payload): Json<RiderPaymentRequest>,
) -> Result<Json<Order>, AppError> {
    payments::submit_rider_payment(&state, actor, &number, payload.reference).map(Json)
}

#[derive(Deserialize)]
pub struct ReviewRiderPaymentRequest {
    pub approve: bool,
}

async fn review_rider_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
    Json(payload): Json<ReviewRiderPaymentRequest>,
) -> Result<Json<Order>, AppError> {
    payments::review_rider_payment(&state, actor, &number, payload.approve).map(Json)
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(number): Path<String>,
) -> Result<Json<Order>, AppError> {
    payments::confirm_delivery(&state, actor, &number).map(Json)
}
