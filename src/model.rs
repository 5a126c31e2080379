use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`. A stay is `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Parse a check-in/check-out value: an RFC 3339 timestamp or a bare
/// `YYYY-MM-DD` date (midnight UTC).
pub fn parse_instant(raw: &str) -> Option<Ms> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

pub fn to_datetime(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(Self::Pending),
            "Confirmed" => Some(Self::Confirmed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Active bookings hold room slots; cancelled ones don't.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Standard,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "standard" | "user" => Some(Self::Standard),
            _ => None,
        }
    }
}

/// Tax percentages applied to the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxRates {
    #[serde(with = "rust_decimal::serde::str")]
    pub vat: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub service_tax: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub other: Decimal,
}

/// Per-category tax amounts and their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxBreakdown {
    #[serde(with = "rust_decimal::serde::str")]
    pub vat: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub service_tax: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub other: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: Ulid,
    pub score: f64,
}

/// A persisted booking. Cancelled bookings stay in the room's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub span: Span,
    pub guests: u32,
    pub room_count: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub base_price: Decimal,
    pub taxes: TaxBreakdown,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub price_per_night: Decimal,
    /// Zero means no discount.
    pub discounted_price: Decimal,
    /// Guests allowed per booked room unit.
    pub max_occupancy: u32,
    pub taxes: TaxRates,
    pub available_slots: u32,
    pub booked_slots: u32,
    pub ratings: Vec<Rating>,
    /// All bookings (any status), sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, spec: &RoomSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            price_per_night: spec.price_per_night,
            discounted_price: spec.discounted_price,
            max_occupancy: spec.max_occupancy,
            taxes: spec.taxes,
            available_slots: spec.total_slots,
            booked_slots: 0,
            ratings: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available_slots > 0
    }

    pub fn total_slots(&self) -> u32 {
        self.available_slots + self.booked_slots
    }

    /// Discounted price when positive, otherwise the base price.
    pub fn nightly_rate(&self) -> Decimal {
        if self.discounted_price > Decimal::ZERO {
            self.discounted_price
        } else {
            self.price_per_night
        }
    }

    pub fn acquire_slots(&mut self, units: u32) {
        self.available_slots = self.available_slots.saturating_sub(units);
        self.booked_slots += units;
    }

    pub fn release_slots(&mut self, units: u32) {
        self.available_slots += units;
        self.booked_slots = self.booked_slots.saturating_sub(units);
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Return only bookings whose stay overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserState {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_booking: bool,
    pub current_booking: Option<Ulid>,
    pub booked_slots: u32,
}

// ── Operation inputs ─────────────────────────────────────────────

/// Editable room fields, used for both create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSpec {
    pub name: String,
    pub price_per_night: Decimal,
    pub discounted_price: Decimal,
    pub max_occupancy: u32,
    pub taxes: TaxRates,
    pub total_slots: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub check_in: Ms,
    pub check_out: Ms,
    pub guests: i64,
    pub room_count: i64,
}

/// Optional changes to an existing booking. `status` is only set by admin paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingChanges {
    pub check_in: Option<Ms>,
    pub check_out: Option<Ms>,
    pub room_id: Option<Ulid>,
    pub guests: Option<i64>,
    pub status: Option<BookingStatus>,
}

impl BookingChanges {
    pub fn touches_stay(&self) -> bool {
        self.check_in.is_some() || self.check_out.is_some()
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
/// Every state-changing operation commits exactly one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        #[serde(with = "rust_decimal::serde::str")]
        price_per_night: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        discounted_price: Decimal,
        max_occupancy: u32,
        taxes: TaxRates,
        available_slots: u32,
        booked_slots: u32,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        #[serde(with = "rust_decimal::serde::str")]
        price_per_night: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        discounted_price: Decimal,
        max_occupancy: u32,
        taxes: TaxRates,
        total_slots: u32,
    },
    UserRegistered {
        id: Ulid,
        name: String,
        email: String,
        role: Role,
        is_booking: bool,
        current_booking: Option<Ulid>,
        booked_slots: u32,
    },
    /// A booking was created or changed. `previous` is `(room_id, status)`
    /// before the write; `None` for a new booking. Slot counters follow
    /// from the transition.
    BookingWritten {
        booking: Booking,
        previous: Option<(Ulid, BookingStatus)>,
    },
    /// Compaction only: reinstates a booking without touching counters.
    BookingRestored {
        booking: Booking,
    },
    RatingAdded {
        room_id: Ulid,
        rating: Rating,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub price_per_night: Decimal,
    pub discounted_price: Decimal,
    pub max_occupancy: u32,
    pub taxes: TaxRatesInfo,
    pub total_slots: u32,
    pub available_slots: u32,
    pub booked_slots: u32,
    pub is_available: bool,
    pub ratings: Vec<Rating>,
}

/// Same as [`TaxRates`] but with the default (API) decimal encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaxRatesInfo {
    pub vat: Decimal,
    pub service_tax: Decimal,
    pub other: Decimal,
}

impl From<&RoomState> for RoomInfo {
    fn from(rs: &RoomState) -> Self {
        Self {
            id: rs.id,
            name: rs.name.clone(),
            price_per_night: rs.price_per_night,
            discounted_price: rs.discounted_price,
            max_occupancy: rs.max_occupancy,
            taxes: TaxRatesInfo {
                vat: rs.taxes.vat,
                service_tax: rs.taxes.service_tax,
                other: rs.taxes.other,
            },
            total_slots: rs.total_slots(),
            available_slots: rs.available_slots,
            booked_slots: rs.booked_slots,
            is_available: rs.is_available(),
            ratings: rs.ratings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxBreakdownInfo {
    pub vat: Decimal,
    pub service_tax: Decimal,
    pub other: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingInfo {
    pub id: Ulid,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub room_name: Option<String>,
    pub guest_name: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guests: u32,
    pub room_count: u32,
    pub base_price: Decimal,
    pub taxes: TaxBreakdownInfo,
    pub total_tax: Decimal,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl BookingInfo {
    pub fn new(b: &Booking, room_name: Option<String>, guest_name: Option<String>) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            room_id: b.room_id,
            room_name,
            guest_name,
            check_in: to_datetime(b.span.start),
            check_out: to_datetime(b.span.end),
            guests: b.guests,
            room_count: b.room_count,
            base_price: b.base_price,
            taxes: TaxBreakdownInfo {
                vat: b.taxes.vat,
                service_tax: b.taxes.service_tax,
                other: b.taxes.other,
            },
            total_tax: b.taxes.total,
            total_price: b.total_price,
            status: b.status,
            created_at: to_datetime(b.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_booking: bool,
    pub current_booking: Option<Ulid>,
    pub booked_slots: u32,
}

impl From<&UserState> for UserInfo {
    fn from(u: &UserState) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            is_booking: u.is_booking,
            current_booking: u.current_booking,
            booked_slots: u.booked_slots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingSummary {
    pub room_id: Ulid,
    pub average: u32,
    pub count: usize,
    pub no_ratings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_bookings: usize,
    pub guests_booking: usize,
    pub idle_users: usize,
    pub revenue: Decimal,
    pub recent_bookings: Vec<BookingInfo>,
}

/// Month-over-month comparison of a count or an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodChange {
    pub current: Decimal,
    pub previous: Decimal,
    pub change: Decimal,
    pub percentage_change: Decimal,
    pub no_prior_data: bool,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            room_id: Ulid::new(),
            span: Span::new(start, end),
            guests: 1,
            room_count: 1,
            base_price: Decimal::ZERO,
            taxes: TaxBreakdown::default(),
            total_price: Decimal::ZERO,
            status: BookingStatus::Pending,
            created_at: 0,
        }
    }

    fn room() -> RoomState {
        RoomState::new(
            Ulid::new(),
            &RoomSpec {
                name: "Deluxe".into(),
                price_per_night: Decimal::from(100),
                discounted_price: Decimal::ZERO,
                max_occupancy: 2,
                taxes: TaxRates::default(),
                total_slots: 3,
            },
        )
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // checkout day == next check-in day
    }

    #[test]
    fn parse_instant_accepts_dates_and_timestamps() {
        assert_eq!(parse_instant("1970-01-02"), Some(DAY_MS));
        assert_eq!(parse_instant("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(parse_instant("1970-01-01T02:00:00+02:00"), Some(0));
        assert_eq!(parse_instant("not a date"), None);
        assert_eq!(parse_instant("2024-02-30"), None);
    }

    #[test]
    fn status_parse_is_exact() {
        assert_eq!(BookingStatus::parse("Confirmed"), Some(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::parse("confirmed"), None);
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(BookingStatus::Pending.is_active());
    }

    #[test]
    fn nightly_rate_prefers_positive_discount() {
        let mut rs = room();
        assert_eq!(rs.nightly_rate(), Decimal::from(100));
        rs.discounted_price = Decimal::from(80);
        assert_eq!(rs.nightly_rate(), Decimal::from(80));
        rs.discounted_price = Decimal::from(-5);
        assert_eq!(rs.nightly_rate(), Decimal::from(100));
    }

    #[test]
    fn slot_accounting_keeps_total() {
        let mut rs = room();
        rs.acquire_slots(2);
        assert_eq!((rs.available_slots, rs.booked_slots), (1, 2));
        assert!(rs.is_available());
        assert_eq!(RoomInfo::from(&rs).total_slots, 3);
        rs.acquire_slots(1);
        assert!(!rs.is_available());
        rs.release_slots(3);
        assert_eq!((rs.available_slots, rs.booked_slots), (3, 0));
        assert_eq!(rs.total_slots(), 3);
    }

    #[test]
    fn booking_ordering() {
        let mut rs = room();
        rs.insert_booking(booking(300, 400));
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(200, 300));
        assert_eq!(rs.bookings[0].span.start, 100);
        assert_eq!(rs.bookings[1].span.start, 200);
        assert_eq!(rs.bookings[2].span.start, 300);
    }

    #[test]
    fn booking_remove() {
        let mut rs = room();
        let b = booking(100, 200);
        let id = b.id;
        rs.insert_booking(b);
        assert!(rs.remove_booking(Ulid::new()).is_none());
        assert_eq!(rs.remove_booking(id).map(|b| b.id), Some(id));
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = room();
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(450, 600));
        rs.insert_booking(booking(1000, 1100));

        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = room();
        rs.insert_booking(booking(100, 200));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_long_stay_spanning_query() {
        let mut rs = room();
        rs.insert_booking(booking(0, 10_000));
        assert_eq!(rs.overlapping(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut b = booking(DAY_MS, 3 * DAY_MS);
        b.base_price = "400.50".parse().unwrap();
        b.taxes.vat = "40.05".parse().unwrap();
        let event = Event::BookingWritten {
            booking: b,
            previous: Some((Ulid::new(), BookingStatus::Pending)),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
