use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{BookingNotice, Notification};
use crate::observability;

use super::conflict::{
    check_no_conflict, check_occupancy, check_slots, validate_guests, validate_room_count,
    validate_stay,
};
use super::pricing::{quote, NightRounding};
use super::{Engine, EngineError, SharedRoomState, WalCommand};

pub const REFUND_NOTE: &str = "If applicable, refund will be processed within 5-7 business days";

/// A cancelled booking and the note shown to the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refund_note: &'static str,
}

/// How many times a booking write re-resolves its room after losing a race
/// with a concurrent room change.
const RELOCK_ATTEMPTS: usize = 3;

fn validate_name(name: &str, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty.")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_room_spec(spec: &RoomSpec) -> Result<(), EngineError> {
    validate_name(&spec.name, "Room name")?;
    if spec.price_per_night < Decimal::ZERO || spec.discounted_price < Decimal::ZERO {
        return Err(EngineError::validation("Prices must not be negative."));
    }
    if spec.price_per_night > MAX_PRICE || spec.discounted_price > MAX_PRICE {
        return Err(EngineError::validation(format!("Prices must not exceed {MAX_PRICE}.")));
    }
    if spec.max_occupancy == 0 {
        return Err(EngineError::validation("Max occupancy must be a positive integer."));
    }
    let TaxRates { vat, service_tax, other } = spec.taxes;
    if vat < Decimal::ZERO || service_tax < Decimal::ZERO || other < Decimal::ZERO {
        return Err(EngineError::validation("Tax rates must not be negative."));
    }
    if vat > MAX_TAX_PERCENT || service_tax > MAX_TAX_PERCENT || other > MAX_TAX_PERCENT {
        return Err(EngineError::validation(format!(
            "Tax rates must not exceed {MAX_TAX_PERCENT}%."
        )));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(&self, spec: RoomSpec) -> Result<RoomInfo, EngineError> {
        validate_room_spec(&spec)?;
        let _gate = self.snapshot_gate.read().await;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let id = Ulid::new();
        let event = Event::RoomCreated {
            id,
            name: spec.name.clone(),
            price_per_night: spec.price_per_night,
            discounted_price: spec.discounted_price,
            max_occupancy: spec.max_occupancy,
            taxes: spec.taxes,
            available_slots: spec.total_slots,
            booked_slots: 0,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, &spec);
        let info = RoomInfo::from(&rs);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        tracing::info!(room_id = %id, name = %spec.name, slots = spec.total_slots, "room created");
        Ok(info)
    }

    /// Replace a room's editable fields. Slots already booked stay booked.
    pub async fn update_room(&self, id: Ulid, spec: RoomSpec) -> Result<RoomInfo, EngineError> {
        validate_room_spec(&spec)?;
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::room_not_found(id))?;
        let mut guard = rs.write().await;
        if spec.total_slots < guard.booked_slots {
            return Err(EngineError::validation(format!(
                "Total slots cannot be less than the {} slots already booked.",
                guard.booked_slots
            )));
        }

        let event = Event::RoomUpdated {
            id,
            name: spec.name,
            price_per_night: spec.price_per_night,
            discounted_price: spec.discounted_price,
            max_occupancy: spec.max_occupancy,
            taxes: spec.taxes,
            total_slots: spec.total_slots,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(RoomInfo::from(&*guard))
    }

    pub async fn register_user(&self, new: NewUser) -> Result<UserInfo, EngineError> {
        validate_name(&new.name, "Name")?;
        let email = new.email.trim().to_string();
        if !email.contains('@') {
            return Err(EngineError::validation("A valid e-mail address is required."));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("e-mail too long"));
        }
        let _gate = self.snapshot_gate.read().await;
        if self.users.len() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }

        let user = UserState {
            id: Ulid::new(),
            name: new.name,
            email,
            role: new.role,
            is_booking: false,
            current_booking: None,
            booked_slots: 0,
        };
        let event = Event::UserRegistered {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_booking: false,
            current_booking: None,
            booked_slots: 0,
        };
        self.wal_append(&event).await?;
        let info = UserInfo::from(&user);
        self.users.insert(user.id, user);
        Ok(info)
    }

    /// Record a 0–5 score. The score is checked before anything is written.
    pub async fn add_rating(&self, room_id: Ulid, user_id: Ulid, score: f64) -> Result<RoomInfo, EngineError> {
        if !score.is_finite() || !(0.0..=5.0).contains(&score) {
            return Err(EngineError::validation("Rating must be between 0 and 5."));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::room_not_found(room_id))?;
        let mut guard = rs.write().await;
        if guard.ratings.len() >= MAX_RATINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many ratings on room"));
        }

        let event = Event::RatingAdded {
            room_id,
            rating: Rating { user_id, score },
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(RoomInfo::from(&*guard))
    }

    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        let guests = validate_guests(req.guests)?;
        let room_count = validate_room_count(req.room_count)?;
        let stay = validate_stay(req.check_in, req.check_out)?;
        if !self.users.contains_key(&req.user_id) {
            return Err(EngineError::user_not_found(req.user_id));
        }
        let rs = self
            .get_room_state(&req.room_id)
            .ok_or(EngineError::room_not_found(req.room_id))?;

        // Held from the overlap check through the commit.
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        check_occupancy(&guard, guests, room_count)?;
        if let Err(e) = check_no_conflict(&guard, &stay, None) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let priced = quote(&guard, &stay, room_count, NightRounding::Exact)?;
        if priced.nights <= Decimal::ZERO {
            return Err(EngineError::validation("A booking must cover at least part of a night."));
        }
        check_slots(&guard, room_count)?;

        let booking = Booking {
            id: Ulid::new(),
            user_id: req.user_id,
            room_id: req.room_id,
            span: stay,
            guests,
            room_count,
            base_price: priced.base_price,
            taxes: priced.taxes,
            total_price: priced.total_price,
            status: BookingStatus::Pending,
            created_at: self.now(),
        };
        let booking = self.persist_booking(&mut guard, None, booking, None).await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            user_id = %booking.user_id,
            rooms = booking.room_count,
            total = %booking.total_price,
            "booking created"
        );
        self.notify(&booking, &guard, Notification::Confirmation);
        Ok(booking)
    }

    /// Apply guest-editable changes (and, on admin paths, a status change).
    /// Role checks happen before this is called.
    pub async fn update_booking(&self, id: Ulid, changes: BookingChanges) -> Result<Booking, EngineError> {
        if let Some(check_in) = changes.check_in
            && let Some(check_out) = changes.check_out
        {
            validate_stay(check_in, check_out)?;
        }
        if let Some(guests) = changes.guests {
            validate_guests(guests)?;
        }

        for _ in 0..RELOCK_ATTEMPTS {
            let old_room_id = self
                .room_for_booking(&id)
                .ok_or(EngineError::booking_not_found(id))?;
            let new_room_id = changes.room_id.unwrap_or(old_room_id);
            let old_rs = self
                .get_room_state(&old_room_id)
                .ok_or(EngineError::room_not_found(old_room_id))?;

            if new_room_id == old_room_id {
                let mut guard = old_rs.write_owned().await;
                if guard.booking(id).is_none() {
                    continue;
                }
                return self.rewrite_booking(&mut guard, None, id, &changes).await;
            }

            let new_rs = self
                .get_room_state(&new_room_id)
                .ok_or(EngineError::room_not_found(new_room_id))?;
            let (mut old_guard, mut new_guard) =
                lock_pair((old_room_id, old_rs), (new_room_id, new_rs)).await;
            if old_guard.booking(id).is_none() {
                continue;
            }
            return self
                .rewrite_booking(&mut new_guard, Some(&mut *old_guard), id, &changes)
                .await;
        }
        Err(EngineError::booking_not_found(id))
    }

    pub async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<Booking, EngineError> {
        self.update_booking(
            id,
            BookingChanges {
                status: Some(status),
                ..BookingChanges::default()
            },
        )
        .await
    }

    /// `target` is the room the booking ends up in; `source` is its current
    /// room when that differs.
    async fn rewrite_booking(
        &self,
        target: &mut RoomState,
        mut source: Option<&mut RoomState>,
        id: Ulid,
        changes: &BookingChanges,
    ) -> Result<Booking, EngineError> {
        let current = source
            .as_deref()
            .unwrap_or(&*target)
            .booking(id)
            .cloned()
            .ok_or(EngineError::booking_not_found(id))?;
        let moving = source.is_some();

        if !current.is_active() && (moving || changes.touches_stay()) {
            return Err(EngineError::validation(
                "Cannot change the room or dates of a cancelled booking.",
            ));
        }

        let status = changes.status.unwrap_or(current.status);
        let was_active = current.is_active();
        let will_be_active = status.is_active();

        let stay = if changes.touches_stay() {
            validate_stay(
                changes.check_in.unwrap_or(current.span.start),
                changes.check_out.unwrap_or(current.span.end),
            )?
        } else {
            current.span
        };

        let guests = match changes.guests {
            Some(g) => validate_guests(g)?,
            None => current.guests,
        };
        if changes.guests.is_some() || moving {
            check_occupancy(target, guests, current.room_count)?;
        }

        if will_be_active && (moving || !was_active) {
            if moving && !target.is_available() {
                return Err(EngineError::RoomUnavailable(target.id));
            }
            check_slots(target, current.room_count)?;
        }
        if will_be_active && (moving || changes.touches_stay() || !was_active) {
            if let Err(e) = check_no_conflict(target, &stay, Some(id)) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(e);
            }
        }

        let mut updated = Booking {
            room_id: target.id,
            span: stay,
            guests,
            status,
            ..current.clone()
        };
        if moving || changes.touches_stay() {
            let priced = quote(target, &stay, current.room_count, NightRounding::Ceil)?;
            updated.base_price = priced.base_price;
            updated.taxes = priced.taxes;
            updated.total_price = priced.total_price;
        }

        let previous = Some((current.room_id, current.status));
        let booking = self
            .persist_booking(target, source.as_deref_mut(), updated, previous)
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            status = ?booking.status,
            moved = moving,
            "booking updated"
        );
        if was_active && !will_be_active {
            metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
            self.notify(&booking, target, Notification::Cancellation);
        }
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<CancelOutcome, EngineError> {
        for _ in 0..RELOCK_ATTEMPTS {
            let room_id = self
                .room_for_booking(&id)
                .ok_or(EngineError::booking_not_found(id))?;
            let rs = self
                .get_room_state(&room_id)
                .ok_or(EngineError::room_not_found(room_id))?;
            let mut guard = rs.write().await;
            let Some(current) = guard.booking(id).cloned() else {
                continue;
            };

            if !current.is_active() {
                return Err(EngineError::AlreadyCancelled(id));
            }
            if current.span.end < self.now() {
                return Err(EngineError::CompletedStay(id));
            }

            let cancelled = Booking {
                status: BookingStatus::Cancelled,
                ..current.clone()
            };
            let previous = Some((current.room_id, current.status));
            let booking = self.persist_booking(&mut guard, None, cancelled, previous).await?;

            metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
            tracing::info!(booking_id = %id, room_id = %room_id, released = booking.room_count, "booking cancelled");
            self.notify(&booking, &guard, Notification::Cancellation);
            return Ok(CancelOutcome {
                booking,
                refund_note: REFUND_NOTE,
            });
        }
        Err(EngineError::booking_not_found(id))
    }

    /// Queue a notice for the booking's guest. Never fails the caller.
    fn notify(&self, booking: &Booking, room: &RoomState, make: fn(BookingNotice) -> Notification) {
        let Some(user) = self.users.get(&booking.user_id) else {
            tracing::warn!(booking_id = %booking.id, "no user to notify");
            return;
        };
        let notice = BookingNotice::new(booking, room, &user);
        drop(user);
        self.outbox.enqueue(make(notice));
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.snapshot_gate.write().await;

        // Read-lock every room in id order so no booking write lands mid-snapshot.
        let mut room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        room_ids.sort();
        let mut guards = Vec::with_capacity(room_ids.len());
        for id in &room_ids {
            if let Some(rs) = self.get_room_state(id) {
                guards.push(rs.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for rs in &guards {
            events.push(Event::RoomCreated {
                id: rs.id,
                name: rs.name.clone(),
                price_per_night: rs.price_per_night,
                discounted_price: rs.discounted_price,
                max_occupancy: rs.max_occupancy,
                taxes: rs.taxes,
                available_slots: rs.available_slots,
                booked_slots: rs.booked_slots,
            });
            for rating in &rs.ratings {
                events.push(Event::RatingAdded {
                    room_id: rs.id,
                    rating: *rating,
                });
            }
        }
        for user in self.users.iter() {
            events.push(Event::UserRegistered {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                role: user.role,
                is_booking: user.is_booking,
                current_booking: user.current_booking,
                booked_slots: user.booked_slots,
            });
        }
        for rs in &guards {
            for booking in &rs.bookings {
                events.push(Event::BookingRestored {
                    booking: booking.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Write-lock two distinct rooms in ascending id order. Guards come back in
/// argument order.
async fn lock_pair(
    (a_id, a): (Ulid, SharedRoomState),
    (b_id, b): (Ulid, SharedRoomState),
) -> (OwnedRwLockWriteGuard<RoomState>, OwnedRwLockWriteGuard<RoomState>) {
    if a_id < b_id {
        let ga = a.write_owned().await;
        let gb = b.write_owned().await;
        (ga, gb)
    } else {
        let gb = b.write_owned().await;
        let ga = a.write_owned().await;
        (ga, gb)
    }
}
