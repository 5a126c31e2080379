use ulid::Ulid;

use crate::model::Span;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Ulid },
    #[error("No bookings found for this user.")]
    NoBookings(Ulid),
    /// Another active booking on the room overlaps the requested stay.
    #[error("room is already booked for the selected dates")]
    Conflict { booking_id: Ulid, stay: Span },
    #[error("only {available} rooms are available, cannot book {requested}")]
    InsufficientSlots { available: u32, requested: u32 },
    #[error("room {0} is not available")]
    RoomUnavailable(Ulid),
    #[error("booking is already cancelled")]
    AlreadyCancelled(Ulid),
    #[error("cannot cancel a completed booking")]
    CompletedStay(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn room_not_found(id: Ulid) -> Self {
        Self::NotFound { kind: "room", id }
    }

    pub fn booking_not_found(id: Ulid) -> Self {
        Self::NotFound { kind: "booking", id }
    }

    pub fn user_not_found(id: Ulid) -> Self {
        Self::NotFound { kind: "user", id }
    }
}
