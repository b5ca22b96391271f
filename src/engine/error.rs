use ulid::Ulid;

use crate::model::{MemberId, Ms, ResourceRef, RoomId, TrainerId};

#[derive(Debug)]
pub enum EngineError {
    TrainerNotFound(TrainerId),
    RoomNotFound(RoomId),
    MemberNotFound(MemberId),
    ClassNotFound(Ulid),
    TrainerConflict {
        trainer_id: TrainerId,
        conflicting: Vec<Ulid>,
    },
    RoomConflict {
        room_id: RoomId,
        conflicting: Vec<Ulid>,
    },
    AvailabilityOverlap {
        trainer_id: TrainerId,
        conflicting: Vec<Ulid>,
    },
    ClassFull {
        class_id: Ulid,
        capacity: u32,
    },
    AlreadyRegistered {
        class_id: Ulid,
        member_id: MemberId,
    },
    InvalidInterval {
        start: Ms,
        end: Ms,
    },
    InvalidCapacity(u32),
    /// Two overlapping entries found in one timeline. Never repaired.
    InvariantViolation {
        resource: ResourceRef,
        first: Ulid,
        second: Ulid,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Conflict rejection for `resource`, tagged by its kind.
    pub(crate) fn conflict(resource: ResourceRef, conflicting: Vec<Ulid>) -> Self {
        match resource.kind {
            crate::model::ResourceKind::Trainer => EngineError::TrainerConflict {
                trainer_id: resource.id,
                conflicting,
            },
            crate::model::ResourceKind::Room => EngineError::RoomConflict {
                room_id: resource.id,
                conflicting,
            },
        }
    }

    /// Ids of the existing entries that caused a conflict rejection.
    pub fn conflicting_ids(&self) -> &[Ulid] {
        match self {
            EngineError::TrainerConflict { conflicting, .. }
            | EngineError::RoomConflict { conflicting, .. }
            | EngineError::AvailabilityOverlap { conflicting, .. } => conflicting,
            _ => &[],
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::TrainerConflict { .. }
                | EngineError::RoomConflict { .. }
                | EngineError::AvailabilityOverlap { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::TrainerNotFound(_)
                | EngineError::RoomNotFound(_)
                | EngineError::MemberNotFound(_)
                | EngineError::ClassNotFound(_)
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::TrainerNotFound(_) => "trainer_not_found",
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::MemberNotFound(_) => "member_not_found",
            EngineError::ClassNotFound(_) => "class_not_found",
            EngineError::TrainerConflict { .. } => "trainer_conflict",
            EngineError::RoomConflict { .. } => "room_conflict",
            EngineError::AvailabilityOverlap { .. } => "availability_overlap",
            EngineError::ClassFull { .. } => "class_full",
            EngineError::AlreadyRegistered { .. } => "already_registered",
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::InvalidCapacity(_) => "invalid_capacity",
            EngineError::InvariantViolation { .. } => "invariant_violation",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::TrainerNotFound(id) => write!(f, "trainer not found: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::MemberNotFound(id) => write!(f, "member not found: {id}"),
            EngineError::ClassNotFound(id) => write!(f, "class not found: {id}"),
            EngineError::TrainerConflict {
                trainer_id,
                conflicting,
            } => write!(
                f,
                "trainer {trainer_id} is not available in that time slot; conflicts with {conflicting:?}"
            ),
            EngineError::RoomConflict {
                room_id,
                conflicting,
            } => write!(
                f,
                "room {room_id} is already booked for that time; conflicts with {conflicting:?}"
            ),
            EngineError::AvailabilityOverlap {
                trainer_id,
                conflicting,
            } => write!(
                f,
                "availability for trainer {trainer_id} overlaps existing windows {conflicting:?}"
            ),
            EngineError::ClassFull { class_id, capacity } => {
                write!(f, "class {class_id} is full (capacity {capacity})")
            }
            EngineError::AlreadyRegistered {
                class_id,
                member_id,
            } => write!(f, "member {member_id} already registered in class {class_id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            EngineError::InvalidCapacity(cap) => {
                write!(f, "invalid capacity {cap}: must be greater than zero")
            }
            EngineError::InvariantViolation {
                resource,
                first,
                second,
            } => write!(
                f,
                "invariant violation on {resource}: entries {first} and {second} overlap"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
