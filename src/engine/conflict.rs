use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Check-out strictly after check-in, inside the supported range and stay length.
pub(crate) fn validate_stay(check_in: Ms, check_out: Ms) -> Result<Span, EngineError> {
    if check_out <= check_in {
        return Err(EngineError::validation(
            "Check-out date must be after the check-in date.",
        ));
    }
    if check_in < MIN_VALID_TIMESTAMP_MS || check_out > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::validation("Booking dates are out of range."));
    }
    if check_out - check_in > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(Span::new(check_in, check_out))
}

pub(crate) fn validate_guests(guests: i64) -> Result<u32, EngineError> {
    if guests <= 0 || guests > MAX_GUESTS_PER_BOOKING {
        return Err(EngineError::validation(
            "Number of guests must be a positive integer.",
        ));
    }
    Ok(guests as u32)
}

pub(crate) fn validate_room_count(room_count: i64) -> Result<u32, EngineError> {
    if room_count <= 0 || room_count > MAX_ROOMS_PER_BOOKING {
        return Err(EngineError::validation(
            "Number of rooms must be a positive integer.",
        ));
    }
    Ok(room_count as u32)
}

/// Max occupancy is per room unit.
pub(crate) fn check_occupancy(rs: &RoomState, guests: u32, room_count: u32) -> Result<(), EngineError> {
    let limit = u64::from(rs.max_occupancy) * u64::from(room_count);
    if u64::from(guests) > limit {
        return Err(EngineError::validation(
            "Number of guests exceeds room's max occupancy.",
        ));
    }
    Ok(())
}

/// First active booking on the room overlapping `stay`, skipping `exclude`.
pub(crate) fn find_conflict<'a>(
    rs: &'a RoomState,
    stay: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    rs.overlapping(stay)
        .find(|b| b.is_active() && Some(b.id) != exclude)
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    stay: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, stay, exclude) {
        Some(existing) => Err(EngineError::Conflict {
            booking_id: existing.id,
            stay: existing.span,
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_slots(rs: &RoomState, requested: u32) -> Result<(), EngineError> {
    if rs.available_slots < requested {
        return Err(EngineError::InsufficientSlots {
            available: rs.available_slots,
            requested,
        });
    }
    Ok(())
}
