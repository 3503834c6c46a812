use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Context of one offer's counter-offer thread. Dropped once the thread resolves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterOfferData {
    /// Price of the quote that was countered.
    pub original_price: Decimal,
    /// Latest price proposed by the shipper.
    pub counter_price: Decimal,
    /// Floor below which we never counter.
    pub min_acceptable: Decimal,
    pub max_counters: u32,
    /// Counter prices we have already proposed in this thread.
    pub current_counters: u32,
}

impl CounterOfferData {
    pub fn new(
        original_price: Decimal,
        counter_price: Decimal,
        min_acceptable: Decimal,
        max_counters: u32,
    ) -> Self {
        Self {
            original_price,
            counter_price,
            min_acceptable,
            max_counters,
            current_counters: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_counters >= self.max_counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exhausted_after_max_counters() {
        let mut data = CounterOfferData::new(dec!(1223), dec!(1000), dec!(1143), 3);
        assert!(!data.is_exhausted());
        data.current_counters = 3;
        assert!(data.is_exhausted());
    }

    #[test]
    fn roundtrip_counter_offer() {
        let data = CounterOfferData::new(dec!(1223), dec!(1100), dec!(1143), 3);
        let json = serde_json::to_string(&data).unwrap();
        let parsed: CounterOfferData = serde_json::from_str(&json).unwrap();
        assert_eq!(data, parsed);
    }
}
