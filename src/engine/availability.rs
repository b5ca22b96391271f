use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::MAX_ENTRIES_PER_TIMELINE;
use crate::model::*;

use super::conflict::{find_conflicts, validate_span};
use super::{EngineError, Scheduler};

// Availability windows are advisory. Nothing in booking consults them.

impl Scheduler {
    pub async fn declare_availability(
        &self,
        trainer_id: TrainerId,
        span: Span,
    ) -> Result<Ulid, EngineError> {
        validate_span(&span)?;
        if !self.directory.trainer_exists(trainer_id).await {
            return Err(EngineError::TrainerNotFound(trainer_id));
        }

        let _gate = self.gate.read().await;
        let ledger = self.availability_ledger(trainer_id);
        let mut guard = ledger.write().await;
        if guard.len() >= MAX_ENTRIES_PER_TIMELINE {
            return Err(EngineError::LimitExceeded("too many availability windows"));
        }

        let conflicting = find_conflicts(&guard, &span);
        if !conflicting.is_empty() {
            debug!(trainer_id, ?conflicting, "availability rejected: overlap");
            return Err(EngineError::AvailabilityOverlap {
                trainer_id,
                conflicting,
            });
        }

        let id = Ulid::new();
        let event = Event::AvailabilityDeclared { id, trainer_id, span };
        self.wal_append(&event).await?;
        guard.insert_interval(Interval {
            id,
            span,
            kind: IntervalKind::Availability,
        });
        self.publish(&[ResourceRef::trainer(trainer_id)], &event);
        info!(%id, trainer_id, start = span.start, end = span.end, "availability declared");
        Ok(id)
    }

    /// Declared windows for `trainer_id`, in start order.
    pub async fn availability_for(&self, trainer_id: TrainerId) -> Vec<AvailabilityWindow> {
        let Some(ledger) = self.availability.get(&trainer_id).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        let guard = ledger.read().await;
        guard
            .intervals
            .iter()
            .map(|i| AvailabilityWindow {
                id: i.id,
                trainer_id,
                start: i.span.start,
                end: i.span.end,
            })
            .collect()
    }
}
