mod conflict;
mod error;
mod mutations;
pub mod pricing;
mod queries;
pub mod reporting;

pub use error::EngineError;
pub use mutations::{CancelOutcome, REFUND_NOTE};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::Outbox;
use crate::observability;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Source of "now" for completed-stay checks, creation stamps and reports.
pub type Clock = Arc<dyn Fn() -> Ms + Send + Sync>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopping");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, events = batch.len(), "WAL flush failed");
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed to control path")));
        }
    }
}

pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    /// Mutated only while the lock of a room holding one of the user's bookings is held.
    pub users: DashMap<Ulid, UserState>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) outbox: Outbox,
    pub(super) clock: Clock,
    /// Held shared by writers that touch no room lock; compaction takes it exclusively.
    pub(super) snapshot_gate: RwLock<()>,
}

fn apply_room_update(rs: &mut RoomState, event: &Event) {
    match event {
        Event::RoomUpdated {
            name,
            price_per_night,
            discounted_price,
            max_occupancy,
            taxes,
            total_slots,
            ..
        } => {
            rs.name = name.clone();
            rs.price_per_night = *price_per_night;
            rs.discounted_price = *discounted_price;
            rs.max_occupancy = *max_occupancy;
            rs.taxes = *taxes;
            rs.available_slots = total_slots.saturating_sub(rs.booked_slots);
        }
        Event::RatingAdded { rating, .. } => rs.ratings.push(*rating),
        _ => {}
    }
}

/// Apply a `BookingWritten` record. `target` holds `booking.room_id`; `source`
/// is the previous room when the booking moved, `None` otherwise. Counters
/// follow from the status transition: the previous placement gives back its
/// slots if it was active, the new one takes them if it is active.
fn apply_booking_write(
    target: &mut RoomState,
    source: Option<&mut RoomState>,
    booking: &Booking,
    previous: Option<(Ulid, BookingStatus)>,
    users: &DashMap<Ulid, UserState>,
    index: &DashMap<Ulid, Ulid>,
) {
    let mut user = users.get_mut(&booking.user_id);

    if let Some((_, prev_status)) = previous {
        let old = match source {
            Some(src) => {
                let old = src.remove_booking(booking.id);
                if prev_status.is_active() {
                    src.release_slots(old.as_ref().map_or(booking.room_count, |b| b.room_count));
                }
                old
            }
            None => {
                let old = target.remove_booking(booking.id);
                if prev_status.is_active() {
                    target.release_slots(old.as_ref().map_or(booking.room_count, |b| b.room_count));
                }
                old
            }
        };
        if prev_status.is_active()
            && let Some(u) = user.as_deref_mut()
        {
            let units = old.as_ref().map_or(booking.room_count, |b| b.room_count);
            u.booked_slots = u.booked_slots.saturating_sub(units);
        }
    }

    let was_active = previous.is_some_and(|(_, s)| s.is_active());
    if booking.is_active() {
        target.acquire_slots(booking.room_count);
    }
    if let Some(u) = user.as_deref_mut() {
        if booking.is_active() {
            u.booked_slots += booking.room_count;
            if !was_active {
                u.is_booking = true;
                u.current_booking = Some(booking.id);
            }
        } else if was_active {
            if u.current_booking == Some(booking.id) {
                u.current_booking = None;
            }
            u.is_booking = u.current_booking.is_some();
        }
    }

    target.insert_booking(booking.clone());
    index.insert(booking.id, booking.room_id);
}

impl Engine {
    pub fn new(wal_path: PathBuf, outbox: Outbox) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            users: DashMap::new(),
            booking_to_room: DashMap::new(),
            wal_tx,
            outbox,
            clock: Arc::new(conflict::now_ms),
            snapshot_gate: RwLock::new(()),
        };

        // Sole owner of every Arc here, so try_write always succeeds. Never
        // blocking_write: this can run inside an async context.
        for event in &events {
            engine.replay_event(event);
        }
        if !events.is_empty() {
            tracing::info!(
                events = events.len(),
                rooms = engine.rooms.len(),
                users = engine.users.len(),
                bookings = engine.booking_to_room.len(),
                "replayed WAL"
            );
        }

        Ok(engine)
    }

    /// Replace the clock. Used by tests to pin "now".
    pub fn with_clock(mut self, clock: impl Fn() -> Ms + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub(super) fn now(&self) -> Ms {
        (self.clock)()
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::RoomCreated {
                id,
                name,
                price_per_night,
                discounted_price,
                max_occupancy,
                taxes,
                available_slots,
                booked_slots,
            } => {
                let mut rs = RoomState::new(
                    *id,
                    &RoomSpec {
                        name: name.clone(),
                        price_per_night: *price_per_night,
                        discounted_price: *discounted_price,
                        max_occupancy: *max_occupancy,
                        taxes: *taxes,
                        total_slots: *available_slots,
                    },
                );
                rs.booked_slots = *booked_slots;
                self.rooms.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::UserRegistered {
                id,
                name,
                email,
                role,
                is_booking,
                current_booking,
                booked_slots,
            } => {
                self.users.insert(
                    *id,
                    UserState {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                        role: *role,
                        is_booking: *is_booking,
                        current_booking: *current_booking,
                        booked_slots: *booked_slots,
                    },
                );
            }
            Event::RoomUpdated { id, .. } | Event::RatingAdded { room_id: id, .. } => {
                let Some(rs) = self.get_room_state(id) else {
                    tracing::warn!(room_id = %id, "replay: event for unknown room");
                    return;
                };
                let Ok(mut guard) = rs.try_write() else { return };
                apply_room_update(&mut guard, event);
            }
            Event::BookingRestored { booking } => {
                let Some(rs) = self.get_room_state(&booking.room_id) else {
                    tracing::warn!(booking_id = %booking.id, "replay: booking for unknown room");
                    return;
                };
                let Ok(mut guard) = rs.try_write() else { return };
                guard.insert_booking(booking.clone());
                self.booking_to_room.insert(booking.id, booking.room_id);
            }
            Event::BookingWritten { booking, previous } => {
                let Some(target) = self.get_room_state(&booking.room_id) else {
                    tracing::warn!(booking_id = %booking.id, "replay: booking for unknown room");
                    return;
                };
                let Ok(mut target) = target.try_write() else { return };
                match previous {
                    Some((prev_room, _)) if *prev_room != booking.room_id => {
                        let source = self.get_room_state(prev_room);
                        let mut source = source.as_ref().and_then(|s| s.try_write().ok());
                        apply_booking_write(
                            &mut target,
                            source.as_deref_mut(),
                            booking,
                            *previous,
                            &self.users,
                            &self.booking_to_room,
                        );
                    }
                    _ => apply_booking_write(
                        &mut target,
                        None,
                        booking,
                        *previous,
                        &self.users,
                        &self.booking_to_room,
                    ),
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append then apply a room-level event under the caller's lock.
    pub(super) async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_room_update(rs, event);
        Ok(())
    }

    /// WAL-append then apply a booking write. Caller holds every room lock involved.
    pub(super) async fn persist_booking(
        &self,
        target: &mut RoomState,
        source: Option<&mut RoomState>,
        booking: Booking,
        previous: Option<(Ulid, BookingStatus)>,
    ) -> Result<Booking, EngineError> {
        let event = Event::BookingWritten {
            booking: booking.clone(),
            previous,
        };
        self.wal_append(&event).await?;
        apply_booking_write(target, source, &booking, previous, &self.users, &self.booking_to_room);
        Ok(booking)
    }
}
