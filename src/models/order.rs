use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Highest order number expressible in the `SE` + 6 digit form.
const MAX_SEQ: u64 = 999_999;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    SourceFulfilled,
    PeerToPeer,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::SourceFulfilled => "source-fulfilled",
            OrderType::PeerToPeer => "peer-to-peer",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Assigned,
    PickingUp,
    PickedUp,
    Delivering,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// The exact external vocabulary, used in responses and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickingUp => "picking-up",
            OrderStatus::PickedUp => "picked-up",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// States in which a rider must be attached to the order.
    pub fn requires_rider(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::PickingUp
                | OrderStatus::PickedUp
                | OrderStatus::Delivering
                | OrderStatus::Delivered
                | OrderStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

/// Customer payment leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// Rider-to-platform remittance leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RiderPaymentStatus {
    Unsubmitted,
    PendingVerification,
    Verified,
    Failed,
}

/// Platform-to-rider payout leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceFeeStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    pub order_type: OrderType,
    pub customer_id: Uuid,
    /// Fulfillment source, present for source-fulfilled orders only.
    pub source_id: Option<Uuid>,
    /// Pickup address, present for peer-to-peer orders only.
    pub pickup_address: Option<String>,
    pub delivery_address: String,
    pub zone: String,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub payment_status: PaymentStatus,
    pub source_payment_status: PaymentStatus,
    pub rider_payment_reference: Option<String>,
    pub rider_payment_status: RiderPaymentStatus,
    /// Set exactly once, the first time a rider attaches; never recomputed.
    pub rider_service_fee: Option<i64>,
    pub rider_service_fee_status: ServiceFeeStatus,
    pub rider: Option<Uuid>,
    pub status: OrderStatus,
    pub pickup_proof: Option<String>,
    pub delivery_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Formats a sequence value as an `SE`-prefixed order number.
///
/// Past the 6-digit range the counter cannot express new numbers, so a
/// millisecond-timestamp form is used instead; those are longer than the
/// sequential form and cannot collide with it. The still-unique sequence
/// value is kept as a suffix so two overflow numbers minted in the same
/// millisecond stay distinct.
pub fn format_order_number(seq: u64) -> String {
    if seq <= MAX_SEQ {
        format!("SE{:06}", seq)
    } else {
        format!("SE{}-{}", Utc::now().timestamp_millis(), seq)
    }
}
