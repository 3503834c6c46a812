use freightdesk_models::Urgency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Heuristic confidence that bidding on an offer is the right call.
///
/// Starts at 0.5 and adjusts for the profit band, the haul length, urgency
/// and how much the tuner has learned so far. The result is clamped to
/// `[0, 1]`. Pure and deterministic.
pub fn score_confidence(
    profit_pct: Decimal,
    distance_km: Decimal,
    urgency: Urgency,
    learning_progress: Decimal,
) -> Decimal {
    let mut confidence = dec!(0.5);

    // Bands are exclusive, highest first.
    if profit_pct > dec!(25) {
        confidence += dec!(0.3);
    } else if profit_pct > dec!(15) {
        confidence += dec!(0.2);
    } else if profit_pct > dec!(5) {
        confidence += dec!(0.1);
    } else if profit_pct < Decimal::ZERO {
        confidence -= dec!(0.4);
    }

    if distance_km < dec!(500) {
        confidence += dec!(0.1);
    } else if distance_km > dec!(1500) {
        confidence -= dec!(0.1);
    }

    match urgency {
        Urgency::Urgent => confidence += dec!(0.1),
        Urgency::High => confidence += dec!(0.05),
        Urgency::Normal | Urgency::Low => {}
    }

    confidence += learning_progress * dec!(0.1);

    confidence.clamp(Decimal::ZERO, Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_mid_distance() {
        let c = score_confidence(dec!(3), dec!(800), Urgency::Normal, Decimal::ZERO);
        assert_eq!(c, dec!(0.5));
    }

    #[test]
    fn profit_bands_are_exclusive() {
        let at = |pct| score_confidence(pct, dec!(800), Urgency::Normal, Decimal::ZERO);
        assert_eq!(at(dec!(31.7)), dec!(0.8));
        assert_eq!(at(dec!(20)), dec!(0.7));
        assert_eq!(at(dec!(10)), dec!(0.6));
        assert_eq!(at(dec!(5)), dec!(0.5));
        assert_eq!(at(dec!(0)), dec!(0.5));
        assert_eq!(at(dec!(-15.3)), dec!(0.1));
    }

    #[test]
    fn band_edges_are_strict() {
        let at = |pct| score_confidence(pct, dec!(800), Urgency::Normal, Decimal::ZERO);
        assert_eq!(at(dec!(25)), dec!(0.7));
        assert_eq!(at(dec!(15)), dec!(0.6));
    }

    #[test]
    fn distance_adjustments() {
        let at = |km| score_confidence(dec!(10), km, Urgency::Normal, Decimal::ZERO);
        assert_eq!(at(dec!(120)), dec!(0.7));
        assert_eq!(at(dec!(500)), dec!(0.6));
        assert_eq!(at(dec!(1500)), dec!(0.6));
        assert_eq!(at(dec!(2100)), dec!(0.5));
    }

    #[test]
    fn urgency_adjustments() {
        let at = |u| score_confidence(dec!(10), dec!(800), u, Decimal::ZERO);
        assert_eq!(at(Urgency::Urgent), dec!(0.7));
        assert_eq!(at(Urgency::High), dec!(0.65));
        assert_eq!(at(Urgency::Low), dec!(0.6));
    }

    #[test]
    fn learning_progress_adds_up_to_a_tenth() {
        let c = score_confidence(dec!(10), dec!(800), Urgency::Normal, dec!(0.5));
        assert_eq!(c, dec!(0.65));
        let c = score_confidence(dec!(10), dec!(800), Urgency::Normal, Decimal::ONE);
        assert_eq!(c, dec!(0.7));
    }

    #[test]
    fn clamped_at_the_top() {
        let c = score_confidence(dec!(80), dec!(50), Urgency::Urgent, Decimal::ONE);
        assert_eq!(c, Decimal::ONE);
    }

    #[test]
    fn clamped_at_the_bottom() {
        let c = score_confidence(dec!(-900), dec!(4000), Urgency::Low, Decimal::ZERO);
        assert_eq!(c, Decimal::ZERO);
    }

    #[test]
    fn always_within_unit_interval() {
        let profits = [
            dec!(-1000),
            dec!(-0.01),
            dec!(0),
            dec!(5.01),
            dec!(15.01),
            dec!(25.01),
            dec!(500),
        ];
        let distances = [dec!(0), dec!(499), dec!(1000), dec!(1501), dec!(10000)];
        let urgencies = [Urgency::Low, Urgency::Normal, Urgency::High, Urgency::Urgent];
        let learning = [dec!(0), dec!(0.5), dec!(1)];

        for p in profits {
            for d in distances {
                for u in urgencies {
                    for l in learning {
                        let c = score_confidence(p, d, u, l);
                        assert!(
                            c >= Decimal::ZERO && c <= Decimal::ONE,
                            "{p} {d} {u:?} {l} -> {c}"
                        );
                    }
                }
            }
        }
    }
}
