use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{record_outcome, BOOKINGS_TOTAL, CANCELLATIONS_TOTAL, COMPACTIONS_TOTAL};

use super::conflict::{try_reserve, validate_span};
use super::{wal_error, ClassLedger, EngineError, Scheduler, WalCommand};

impl Scheduler {
    /// Book a personal-training session on both the trainer and the room.
    /// All-or-nothing: either both timelines carry the session or neither does.
    pub async fn book_pt_session(
        &self,
        member_id: MemberId,
        trainer_id: TrainerId,
        room_id: RoomId,
        span: Span,
    ) -> Result<Ulid, EngineError> {
        let result: Result<Ulid, EngineError> = async {
            validate_span(&span)?;
            if !self.directory.member_exists(member_id).await {
                return Err(EngineError::MemberNotFound(member_id));
            }
            if !self.directory.trainer_exists(trainer_id).await {
                return Err(EngineError::TrainerNotFound(trainer_id));
            }
            if !self.directory.room_exists(room_id).await {
                return Err(EngineError::RoomNotFound(room_id));
            }
            self.commit_reservation(Reservation {
                id: Ulid::new(),
                span,
                kind: ReservationKind::PtSession {
                    member_id,
                    trainer_id,
                    room_id,
                },
            })
            .await
        }
        .await;
        record_outcome(BOOKINGS_TOTAL, "pt_session", &result);
        result
    }

    /// Create a group class in `room_id`. Only the room's timeline is checked
    /// and claimed; the trainer's other commitments are not consulted.
    pub async fn create_group_class(
        &self,
        name: impl Into<String>,
        trainer_id: TrainerId,
        room_id: RoomId,
        span: Span,
        capacity: u32,
    ) -> Result<Ulid, EngineError> {
        let name = name.into();
        let result: Result<Ulid, EngineError> = async {
            validate_span(&span)?;
            if name.len() > MAX_CLASS_NAME_LEN {
                return Err(EngineError::LimitExceeded("class name too long"));
            }
            if capacity == 0 {
                return Err(EngineError::InvalidCapacity(capacity));
            }
            if capacity > MAX_CLASS_CAPACITY {
                return Err(EngineError::LimitExceeded("class capacity too large"));
            }
            if !self.directory.trainer_exists(trainer_id).await {
                return Err(EngineError::TrainerNotFound(trainer_id));
            }
            if !self.directory.room_exists(room_id).await {
                return Err(EngineError::RoomNotFound(room_id));
            }
            self.commit_reservation(Reservation {
                id: Ulid::new(),
                span,
                kind: ReservationKind::GroupClass {
                    name,
                    trainer_id,
                    room_id,
                    capacity,
                },
            })
            .await
        }
        .await;
        record_outcome(BOOKINGS_TOTAL, "group_class", &result);
        result
    }

    /// Reserve on every owning timeline under their locks, persist, then
    /// publish. A rejection on a later timeline rolls back the earlier ones
    /// before any lock is released.
    async fn commit_reservation(&self, reservation: Reservation) -> Result<Ulid, EngineError> {
        let id = reservation.id;
        let resources = reservation.resources();

        let _gate = self.gate.read().await;
        let mut guards = self.lock_timelines(&resources).await;
        if guards.iter().any(|g| g.len() >= MAX_ENTRIES_PER_TIMELINE) {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        // Phase 1: tentative reserve in lock order (trainer before room).
        for idx in 0..guards.len() {
            if let Err(conflicting) = try_reserve(&mut guards[idx], reservation.to_interval()) {
                let resource = guards[idx].resource;
                for earlier in &mut guards[..idx] {
                    earlier.remove_interval(id);
                }
                debug!(%id, %resource, ?conflicting, "reservation rejected: conflict");
                return Err(EngineError::conflict(resource, conflicting));
            }
        }

        // Phase 2: durable, then visible.
        let event = Event::for_reservation(&reservation);
        if let Err(e) = self.wal_append(&event).await {
            for guard in guards.iter_mut() {
                guard.remove_interval(id);
            }
            return Err(e);
        }

        if let ReservationKind::GroupClass { capacity, room_id, .. } = &reservation.kind {
            let ledger = ClassLedger::new(id, ResourceRef::room(*room_id), *capacity);
            self.classes.insert(id, Arc::new(Mutex::new(ledger)));
        }
        info!(
            %id,
            resources = ?resources,
            start = reservation.span.start,
            end = reservation.span.end,
            "reservation committed"
        );
        self.reservations.insert(id, reservation);
        drop(guards);

        self.publish(&resources, &event);
        Ok(id)
    }

    /// Release a session or class from every timeline it occupies. A class's
    /// enrollment ledger is closed with it. Unknown or already-cancelled ids
    /// are a no-op.
    pub async fn cancel(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.gate.read().await;
        let Some(resources) = self.reservations.get(&id).map(|r| r.resources()) else {
            debug!(%id, "cancel: no such reservation");
            return Ok(());
        };

        let mut guards = self.lock_timelines(&resources).await;
        // A concurrent cancel may have won the locks first.
        if !self.reservations.contains_key(&id) {
            return Ok(());
        }

        let event = Event::ReservationCancelled { id };
        self.wal_append(&event).await?;
        for guard in guards.iter_mut() {
            guard.remove_interval(id);
        }
        if let Some((_, ledger)) = self.classes.remove(&id) {
            ledger.lock().await.closed = true;
        }
        self.reservations.remove(&id);
        drop(guards);

        self.publish(&resources, &event);
        metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
        info!(%id, "reservation cancelled");
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.gate.write().await;

        let mut reservations: Vec<Reservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);
        let mut events: Vec<Event> = reservations.iter().map(Event::for_reservation).collect();

        let ledgers: Vec<_> = self.classes.iter().map(|e| e.value().clone()).collect();
        for ledger in ledgers {
            let guard = ledger.lock().await;
            events.extend(guard.registrants.iter().map(|&member_id| Event::MemberEnrolled {
                class_id: guard.class_id,
                member_id,
            }));
        }

        let availability: Vec<_> = self.availability.iter().map(|e| (*e.key(), e.value().clone())).collect();
        for (trainer_id, ledger) in availability {
            let guard = ledger.read().await;
            events.extend(guard.intervals.iter().map(|i| Event::AvailabilityDeclared {
                id: i.id,
                trainer_id,
                span: i.span,
            }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(wal_error)?;

        metrics::counter!(COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "WAL compacted");
        Ok(())
    }
}
