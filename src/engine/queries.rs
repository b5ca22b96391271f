use tokio::sync::broadcast;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, Scheduler};

impl Scheduler {
    /// Entries on `resource`'s timeline intersecting `range`, in start order.
    pub async fn query(
        &self,
        resource: ResourceRef,
        range: Span,
    ) -> Result<Vec<ReservationInfo>, EngineError> {
        if !range.is_valid() {
            return Err(EngineError::InvalidInterval {
                start: range.start,
                end: range.end,
            });
        }
        // `duration_ms` saturates, so extreme bounds land here too.
        if range.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(tl) = self.existing_timeline(&resource) else {
            return Ok(Vec::new());
        };
        let guard = tl.read().await;
        Ok(guard
            .overlapping(&range)
            .map(|i| ReservationInfo {
                id: i.id,
                resource,
                start: i.span.start,
                end: i.span.end,
                kind: i.kind.clone(),
            })
            .collect())
    }

    /// Committed changes touching `resource`, from now on.
    pub fn subscribe(&self, resource: ResourceRef) -> broadcast::Receiver<Event> {
        self.notify.subscribe(resource)
    }

    pub fn reservation(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub async fn class_info(&self, class_id: &Ulid) -> Option<ClassInfo> {
        let reservation = self.reservation(class_id)?;
        let ledger = self.class_ledger(class_id)?;
        let enrolled = ledger.lock().await.occupancy();
        class_info_from(&reservation, enrolled)
    }

    /// All live group classes, ordered by start.
    pub async fn list_classes(&self) -> Vec<ClassInfo> {
        let ids: Vec<Ulid> = self.classes.iter().map(|e| *e.key()).collect();
        let mut classes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(info) = self.class_info(&id).await {
                classes.push(info);
            }
        }
        classes.sort_by_key(|c| (c.start, c.id));
        classes
    }

    /// PT sessions on the trainer's timeline plus the classes they teach.
    /// Classes never sit on a trainer timeline, so they come from the class index.
    pub async fn trainer_schedule(&self, trainer_id: TrainerId) -> TrainerSchedule {
        let mut schedule = TrainerSchedule::default();

        if let Some(tl) = self.existing_timeline(&ResourceRef::trainer(trainer_id)) {
            let ids: Vec<Ulid> = tl.read().await.intervals.iter().map(|i| i.id).collect();
            for id in ids {
                let Some(reservation) = self.reservation(&id) else {
                    continue;
                };
                if let ReservationKind::PtSession {
                    member_id, room_id, ..
                } = reservation.kind
                {
                    schedule.sessions.push(SessionInfo {
                        id,
                        member_id,
                        trainer_id,
                        room_id,
                        start: reservation.span.start,
                        end: reservation.span.end,
                    });
                }
            }
        }

        schedule.classes = self
            .list_classes()
            .await
            .into_iter()
            .filter(|c| c.trainer_id == trainer_id)
            .collect();
        schedule
    }
}

fn class_info_from(reservation: &Reservation, enrolled: u32) -> Option<ClassInfo> {
    match &reservation.kind {
        ReservationKind::GroupClass {
            name,
            trainer_id,
            room_id,
            capacity,
        } => Some(ClassInfo {
            id: reservation.id,
            name: name.clone(),
            trainer_id: *trainer_id,
            room_id: *room_id,
            start: reservation.span.start,
            end: reservation.span.end,
            capacity: *capacity,
            enrolled,
        }),
        ReservationKind::PtSession { .. } => None,
    }
}
