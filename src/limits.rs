use rust_decimal::Decimal;

use crate::model::{DAY_MS, Ms};

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_USERS: usize = 1_000_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_RATINGS_PER_ROOM: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_ROOMS_PER_BOOKING: i64 = 1_000;
pub const MAX_GUESTS_PER_BOOKING: i64 = 10_000;
pub const MAX_RECENT_BOOKINGS: usize = 100;

/// Highest nightly price (base or discounted) a room may carry.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);
/// Highest percentage for any single tax category.
pub const MAX_TAX_PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// Longest bookable stay.
pub const MAX_STAY_MS: Ms = 365 * DAY_MS;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
