use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::fees::ZoneFeeTable;
use crate::models::order::{format_order_number, Order};
use crate::models::withdrawal::Withdrawal;
use crate::notify::EventBus;
use crate::observability::metrics::Metrics;

pub struct AppState {
    /// Orders keyed by order number; records are never removed, cancellation
    /// is a status.
    pub orders: DashMap<String, Order>,
    pub withdrawals: DashMap<Uuid, Withdrawal>,
    order_seq: AtomicU64,
    pub fee_table: ZoneFeeTable,
    pub events: EventBus,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let metrics = Metrics::new();
        let events = EventBus::new(event_buffer_size, metrics.events_published_total.clone());

        Self {
            orders: DashMap::new(),
            withdrawals: DashMap::new(),
            order_seq: AtomicU64::new(0),
            fee_table: ZoneFeeTable::default(),
            events,
            metrics,
        }
    }

    /// Next order number from the shared atomic sequence. Numbers are never
    /// reused, including for cancelled orders.
    pub fn next_order_number(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format_order_number(seq)
    }
}
