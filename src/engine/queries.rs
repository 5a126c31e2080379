use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::reporting::{amount_change, count_change, month_windows};
use super::{Engine, EngineError, SharedRoomState};

impl Engine {
    pub async fn get_room(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::room_not_found(id))?;
        let guard = rs.read().await;
        Ok(RoomInfo::from(&*guard))
    }

    /// All rooms, oldest first.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for rs in self.room_handles() {
            rooms.push(RoomInfo::from(&*rs.read().await));
        }
        rooms
    }

    pub fn get_user(&self, id: Ulid) -> Result<UserInfo, EngineError> {
        self.users
            .get(&id)
            .map(|u| UserInfo::from(&*u))
            .ok_or(EngineError::user_not_found(id))
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        let room_id = self
            .room_for_booking(&id)
            .ok_or(EngineError::booking_not_found(id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::room_not_found(room_id))?;
        let guard = rs.read().await;
        let booking = guard
            .booking(id)
            .ok_or(EngineError::booking_not_found(id))?;
        Ok(self.booking_info(booking, &guard))
    }

    /// Every booking, newest first.
    pub async fn list_bookings(&self) -> Vec<BookingInfo> {
        let mut out = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().map(|b| self.booking_info(b, &guard)));
        }
        sort_newest_first(&mut out);
        out
    }

    /// A user's bookings, newest first. Empty is reported as not found.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let bookings = self.user_bookings(user_id).await;
        if bookings.is_empty() {
            return Err(EngineError::NoBookings(user_id));
        }
        Ok(bookings)
    }

    pub async fn user_bookings(&self, user_id: Ulid) -> Vec<BookingInfo> {
        let mut out = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.user_id == user_id)
                    .map(|b| self.booking_info(b, &guard)),
            );
        }
        sort_newest_first(&mut out);
        out
    }

    /// Mean score rounded to the nearest whole number; 0 when unrated.
    pub async fn average_rating(&self, room_id: Ulid) -> Result<RatingSummary, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::room_not_found(room_id))?;
        let guard = rs.read().await;
        let count = guard.ratings.len();
        let average = if count == 0 {
            0
        } else {
            let sum: f64 = guard.ratings.iter().map(|r| r.score).sum();
            (sum / count as f64).round() as u32
        };
        Ok(RatingSummary {
            room_id,
            average,
            count,
            no_ratings: count == 0,
        })
    }

    pub async fn dashboard_summary(&self, recent: usize) -> DashboardSummary {
        let mut all = self.list_bookings().await;
        let revenue = all
            .iter()
            .fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.total_price));
        let guests_booking = self.users.iter().filter(|u| u.is_booking).count();
        let total_bookings = all.len();
        all.truncate(recent.min(MAX_RECENT_BOOKINGS));
        DashboardSummary {
            total_bookings,
            guests_booking,
            idle_users: self.users.len().saturating_sub(guests_booking),
            revenue,
            recent_bookings: all,
        }
    }

    /// Bookings checking in this calendar month against last month.
    pub async fn booking_change(&self) -> PeriodChange {
        let (current, previous) = month_windows(self.now());
        let (mut cur, mut prev) = (0usize, 0usize);
        for rs in self.room_handles() {
            let guard = rs.read().await;
            for b in &guard.bookings {
                if current.contains_instant(b.span.start) {
                    cur += 1;
                } else if previous.contains_instant(b.span.start) {
                    prev += 1;
                }
            }
        }
        count_change(cur, prev)
    }

    /// Revenue of bookings created this calendar month against last month.
    pub async fn revenue_change(&self) -> PeriodChange {
        let (current, previous) = month_windows(self.now());
        let (mut cur, mut prev) = (Decimal::ZERO, Decimal::ZERO);
        for rs in self.room_handles() {
            let guard = rs.read().await;
            for b in &guard.bookings {
                if current.contains_instant(b.created_at) {
                    cur = cur.saturating_add(b.total_price);
                } else if previous.contains_instant(b.created_at) {
                    prev = prev.saturating_add(b.total_price);
                }
            }
        }
        amount_change(cur, prev)
    }

    /// Snapshot of room handles in id order, so no DashMap guard is held across an await.
    fn room_handles(&self) -> Vec<SharedRoomState> {
        let mut handles: Vec<(Ulid, SharedRoomState)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, rs)| rs).collect()
    }

    fn booking_info(&self, booking: &Booking, room: &RoomState) -> BookingInfo {
        let guest_name = self.users.get(&booking.user_id).map(|u| u.name.clone());
        BookingInfo::new(booking, Some(room.name.clone()), guest_name)
    }
}

fn sort_newest_first(bookings: &mut [BookingInfo]) {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
