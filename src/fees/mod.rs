use std::collections::HashMap;

/// Minimum delivery fee, applied when a zone is unknown or priced below it.
pub const FLOOR_FEE: i64 = 2000;

/// Share of the delivery fee paid out to the rider.
const RIDER_SHARE: f64 = 0.8;

/// Static zone-to-fee lookup, read-only at runtime.
#[derive(Debug, Clone)]
pub struct ZoneFeeTable {
    fees: HashMap<String, i64>,
}

impl ZoneFeeTable {
    pub fn new(fees: HashMap<String, i64>) -> Self {
        Self { fees }
    }

    /// Fee for a zone; unknown zones and under-floor entries fall back to
    /// the floor fee.
    pub fn delivery_fee(&self, zone: &str) -> i64 {
        self.fees
            .get(zone)
            .copied()
            .unwrap_or(FLOOR_FEE)
            .max(FLOOR_FEE)
    }
}

impl Default for ZoneFeeTable {
    fn default() -> Self {
        let fees = HashMap::from([
            ("central".to_string(), 2000),
            ("mainland".to_string(), 2500),
            ("island".to_string(), 3000),
            ("outskirts".to_string(), 3500),
            ("airport".to_string(), 5000),
        ]);
        Self { fees }
    }
}

/// Rider payout derived from the delivery fee.
pub fn rider_service_fee(delivery_fee: i64) -> i64 {
    (delivery_fee as f64 * RIDER_SHARE).round() as i64
}

#[cfg(test)]
mod tests {
    use super::{rider_service_fee, ZoneFeeTable, FLOOR_FEE};
    use std::collections::HashMap;

    #[test]
    fn unknown_zone_falls_back_to_floor() {
        let table = ZoneFeeTable::default();
        assert_eq!(table.delivery_fee("atlantis"), FLOOR_FEE);
    }

    #[test]
    fn known_zone_returns_configured_fee() {
        let table = ZoneFeeTable::default();
        assert_eq!(table.delivery_fee("island"), 3000);
    }

    #[test]
    fn under_floor_entry_is_clamped_up() {
        let table = ZoneFeeTable::new(HashMap::from([("cheap".to_string(), 500)]));
        assert_eq!(table.delivery_fee("cheap"), FLOOR_FEE);
    }

    #[test]
    fn service_fee_is_eighty_percent_rounded() {
        assert_eq!(rider_service_fee(3000), 2400);
        assert_eq!(rider_service_fee(2000), 1600);
        assert_eq!(rider_service_fee(2505), 2004);
    }
}
