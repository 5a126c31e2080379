use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::*;

use super::EngineError;

/// How a stay's length is turned into billable nights.
///
/// New bookings bill the exact day difference (a 36 hour stay is 1.5 nights);
/// updates round up to whole nights. Both rules are kept as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightRounding {
    Exact,
    Ceil,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub nights: Decimal,
    pub rate: Decimal,
    pub base_price: Decimal,
    pub taxes: TaxBreakdown,
    pub total_price: Decimal,
}

pub fn nights(stay: &Span, rounding: NightRounding) -> Decimal {
    let days = Decimal::from(stay.duration_ms()) / Decimal::from(DAY_MS);
    match rounding {
        NightRounding::Exact => days,
        NightRounding::Ceil => days.ceil(),
    }
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn out_of_range() -> EngineError {
    EngineError::LimitExceeded("booking price out of range")
}

/// `percent`% of `base`, rounded to cents.
fn tax_amount(percent: Decimal, base: Decimal) -> Result<Decimal, EngineError> {
    if percent <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    (percent / Decimal::ONE_HUNDRED)
        .checked_mul(base)
        .map(money)
        .ok_or_else(out_of_range)
}

pub fn tax_breakdown(rates: &TaxRates, base: Decimal) -> Result<TaxBreakdown, EngineError> {
    let vat = tax_amount(rates.vat, base)?;
    let service_tax = tax_amount(rates.service_tax, base)?;
    let other = tax_amount(rates.other, base)?;
    let total = vat
        .checked_add(service_tax)
        .and_then(|t| t.checked_add(other))
        .ok_or_else(out_of_range)?;
    Ok(TaxBreakdown {
        vat,
        service_tax,
        other,
        total,
    })
}

/// Price `room_count` units of `rs` for `stay`.
pub fn quote(
    rs: &RoomState,
    stay: &Span,
    room_count: u32,
    rounding: NightRounding,
) -> Result<Quote, EngineError> {
    let nights = nights(stay, rounding);
    let rate = rs.nightly_rate();
    let base_price = rate
        .checked_mul(nights)
        .and_then(|v| v.checked_mul(Decimal::from(room_count)))
        .map(money)
        .ok_or_else(out_of_range)?;
    let taxes = tax_breakdown(&rs.taxes, base_price)?;
    let total_price = base_price.checked_add(taxes.total).ok_or_else(out_of_range)?;
    Ok(Quote {
        nights,
        rate,
        base_price,
        taxes,
        total_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;

    fn room(price: i64, discount: i64, vat: i64, service: i64, other: i64) -> RoomState {
        RoomState::new(
            Ulid::new(),
            &RoomSpec {
                name: "Standard".into(),
                price_per_night: Decimal::from(price),
                discounted_price: Decimal::from(discount),
                max_occupancy: 2,
                taxes: TaxRates {
                    vat: Decimal::from(vat),
                    service_tax: Decimal::from(service),
                    other: Decimal::from(other),
                },
                total_slots: 2,
            },
        )
    }

    #[test]
    fn two_rooms_two_nights_with_vat() {
        let rs = room(100, 0, 10, 0, 0);
        let q = quote(&rs, &Span::new(0, 2 * DAY_MS), 2, NightRounding::Exact).unwrap();
        assert_eq!(q.nights, Decimal::from(2));
        assert_eq!(q.base_price, Decimal::from(400));
        assert_eq!(q.taxes.vat, Decimal::from(40));
        assert_eq!(q.taxes.total, Decimal::from(40));
        assert_eq!(q.total_price, Decimal::from(440));
    }

    #[test]
    fn discount_replaces_base_rate() {
        let rs = room(100, 75, 0, 0, 0);
        let q = quote(&rs, &Span::new(0, DAY_MS), 1, NightRounding::Exact).unwrap();
        assert_eq!(q.rate, Decimal::from(75));
        assert_eq!(q.total_price, Decimal::from(75));
    }

    #[test]
    fn total_is_base_plus_every_tax() {
        let rs = room(133, 0, 7, 3, 1);
        for days in 1..10 {
            let q = quote(&rs, &Span::new(0, days * DAY_MS), 3, NightRounding::Exact).unwrap();
            assert_eq!(
                q.total_price,
                q.base_price + q.taxes.vat + q.taxes.service_tax + q.taxes.other
            );
            assert_eq!(q.taxes.total, q.taxes.vat + q.taxes.service_tax + q.taxes.other);
        }
    }

    #[test]
    fn tax_rounds_half_cent_away_from_zero() {
        // 5% of 0.50 = 0.025
        let taxes = tax_breakdown(
            &TaxRates {
                vat: Decimal::from(5),
                ..TaxRates::default()
            },
            "0.50".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(taxes.vat, "0.03".parse::<Decimal>().unwrap());
    }

    #[test]
    fn create_bills_partial_days_exactly() {
        let stay = Span::new(0, 36 * H);
        assert_eq!(nights(&stay, NightRounding::Exact), "1.5".parse::<Decimal>().unwrap());
        let q = quote(&room(100, 0, 0, 0, 0), &stay, 1, NightRounding::Exact).unwrap();
        assert_eq!(q.base_price, Decimal::from(150));
    }

    #[test]
    fn update_rounds_partial_days_up() {
        let stay = Span::new(0, 36 * H);
        assert_eq!(nights(&stay, NightRounding::Ceil), Decimal::from(2));
        let q = quote(&room(100, 0, 0, 0, 0), &stay, 1, NightRounding::Ceil).unwrap();
        assert_eq!(q.base_price, Decimal::from(200));
    }

    #[test]
    fn overflowing_price_is_an_error() {
        let mut rs = room(0, 0, 0, 0, 0);
        rs.price_per_night = Decimal::MAX;
        let stay = Span::new(0, 10 * DAY_MS);
        assert!(matches!(
            quote(&rs, &stay, 1, NightRounding::Exact),
            Err(EngineError::LimitExceeded(_))
        ));

        let mut rs = room(100, 0, 0, 0, 0);
        rs.taxes.vat = Decimal::MAX;
        assert!(matches!(
            quote(&rs, &stay, 1, NightRounding::Ceil),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn whole_days_agree_under_both_rules() {
        let stay = Span::new(5 * DAY_MS, 8 * DAY_MS);
        assert_eq!(
            nights(&stay, NightRounding::Exact),
            nights(&stay, NightRounding::Ceil)
        );
    }
}
