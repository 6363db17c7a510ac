use prometheus::IntCounter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::order::Order;
use crate::models::withdrawal::Withdrawal;

pub const TOPIC_ALL_RIDERS: &str = "riders";
pub const TOPIC_ALL_ADMINS: &str = "admins";

pub fn order_topic(order_number: &str) -> String {
    format!("order:{order_number}")
}

pub fn customer_topic(customer_id: Uuid) -> String {
    format!("customer:{customer_id}")
}

pub fn rider_topic(rider_id: Uuid) -> String {
    format!("rider:{rider_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    /// Generic mutation notice carrying the full order record.
    OrderUpdated { order: Box<Order> },
    /// Order became claimable; riders should add it to their availability
    /// view.
    OrderAvailable { order: Box<Order> },
    /// Order left the availability pool; riders prune cached lists without
    /// a re-fetch.
    OrderRemoved { order_number: String },
    WithdrawalUpdated { withdrawal: Box<Withdrawal> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub payload: EventPayload,
}

/// Fan-out bus for order and withdrawal mutations. Subscribers filter by
/// topic; delivery guarantees beyond the broadcast buffer are out of scope.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
    published: IntCounter,
}

impl EventBus {
    pub fn new(buffer_size: usize, published: IntCounter) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size);
        Self { tx, published }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, topic: String, payload: EventPayload) {
        self.published.inc();
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(Envelope { topic, payload });
    }

    /// Standard fan-out for an order mutation: the order's own topic, the
    /// customer's topic, the attached rider's topic, and the admin feed.
    pub fn publish_order_update(&self, order: &Order) {
        let payload = EventPayload::OrderUpdated {
            order: Box::new(order.clone()),
        };

        self.publish(order_topic(&order.order_number), payload.clone());
        self.publish(customer_topic(order.customer_id), payload.clone());
        if let Some(rider_id) = order.rider {
            self.publish(rider_topic(rider_id), payload.clone());
        }
        self.publish(TOPIC_ALL_ADMINS.to_string(), payload);
    }

    /// Announces a newly claimable order on the shared rider feed.
    pub fn publish_availability(&self, order: &Order) {
        self.publish(
            TOPIC_ALL_RIDERS.to_string(),
            EventPayload::OrderAvailable {
                order: Box::new(order.clone()),
            },
        );
    }

    /// Tells riders to drop the order from cached availability lists.
    pub fn publish_removal(&self, order_number: &str) {
        self.publish(
            TOPIC_ALL_RIDERS.to_string(),
            EventPayload::OrderRemoved {
                order_number: order_number.to_string(),
            },
        );
    }

    pub fn publish_withdrawal_update(&self, withdrawal: &Withdrawal) {
        let payload = EventPayload::WithdrawalUpdated {
            withdrawal: Box::new(withdrawal.clone()),
        };

        self.publish(rider_topic(withdrawal.rider_id), payload.clone());
        self.publish(TOPIC_ALL_ADMINS.to_string(), payload);
    }
}
