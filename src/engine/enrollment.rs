use std::collections::BTreeSet;

use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{record_outcome, ENROLLMENTS_TOTAL};

use super::{EngineError, Scheduler};

/// Registrants of one group class. Lives behind a per-class mutex so the
/// duplicate check, the capacity check and the insert form one step.
#[derive(Debug, Clone)]
pub struct ClassLedger {
    pub class_id: Ulid,
    pub room: ResourceRef,
    pub capacity: u32,
    pub registrants: BTreeSet<MemberId>,
    /// Set when the class is cancelled; a closed ledger behaves as if absent.
    pub closed: bool,
}

impl ClassLedger {
    pub fn new(class_id: Ulid, room: ResourceRef, capacity: u32) -> Self {
        Self {
            class_id,
            room,
            capacity,
            registrants: BTreeSet::new(),
            closed: false,
        }
    }

    pub fn occupancy(&self) -> u32 {
        self.registrants.len() as u32
    }

    /// Whether `member_id` may take a seat right now. Duplicates are reported
    /// before fullness so a registered member retrying a full class learns why.
    pub fn check_admit(&self, member_id: MemberId) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::ClassNotFound(self.class_id));
        }
        if self.registrants.contains(&member_id) {
            return Err(EngineError::AlreadyRegistered {
                class_id: self.class_id,
                member_id,
            });
        }
        if self.occupancy() >= self.capacity {
            return Err(EngineError::ClassFull {
                class_id: self.class_id,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn roster(&self) -> Roster {
        Roster {
            class_id: self.class_id,
            capacity: self.capacity,
            registrants: self.registrants.iter().copied().collect(),
        }
    }
}

impl Scheduler {
    /// Take a seat in `class_id`. A member already registered gets
    /// `AlreadyRegistered` even when the class is also full.
    pub async fn enroll(&self, class_id: Ulid, member_id: MemberId) -> Result<(), EngineError> {
        let result = self.enroll_inner(class_id, member_id).await;
        record_outcome(ENROLLMENTS_TOTAL, "enroll", &result);
        result
    }

    async fn enroll_inner(&self, class_id: Ulid, member_id: MemberId) -> Result<(), EngineError> {
        let ledger = self
            .class_ledger(&class_id)
            .ok_or(EngineError::ClassNotFound(class_id))?;
        if !self.directory.member_exists(member_id).await {
            return Err(EngineError::MemberNotFound(member_id));
        }

        let _gate = self.gate.read().await;
        let mut guard = ledger.lock().await;
        if let Err(e) = guard.check_admit(member_id) {
            debug!(%class_id, member_id, "enrollment rejected: {e}");
            return Err(e);
        }

        let event = Event::MemberEnrolled { class_id, member_id };
        self.wal_append(&event).await?;
        guard.registrants.insert(member_id);
        self.publish(&[guard.room], &event);
        info!(
            %class_id,
            member_id,
            occupancy = guard.occupancy(),
            capacity = guard.capacity,
            "member enrolled"
        );
        Ok(())
    }

    /// Remove `member_id` from the class. Unknown classes and members that were
    /// never registered are a no-op.
    pub async fn unenroll(&self, class_id: Ulid, member_id: MemberId) -> Result<(), EngineError> {
        let Some(ledger) = self.class_ledger(&class_id) else {
            return Ok(());
        };

        let _gate = self.gate.read().await;
        let mut guard = ledger.lock().await;
        if guard.closed || !guard.registrants.contains(&member_id) {
            return Ok(());
        }

        let event = Event::MemberUnenrolled { class_id, member_id };
        self.wal_append(&event).await?;
        guard.registrants.remove(&member_id);
        self.publish(&[guard.room], &event);
        record_outcome(ENROLLMENTS_TOTAL, "unenroll", &Ok(()));
        info!(%class_id, member_id, occupancy = guard.occupancy(), "member unenrolled");
        Ok(())
    }

    pub async fn roster(&self, class_id: Ulid) -> Option<Roster> {
        let ledger = self.class_ledger(&class_id)?;
        let guard = ledger.lock().await;
        if guard.closed {
            return None;
        }
        Some(guard.roster())
    }
}
