use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type MemberId = u64;
pub type TrainerId = u64;
pub type RoomId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    /// Unchecked; callers that accept outside input go through `is_valid`.
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    /// Saturates at `Ms::MAX` for spans wider than `i64` can express.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Trainer,
    Room,
}

/// A bookable resource. The derived `Ord` (kind, then id) is the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: u64,
}

impl ResourceRef {
    pub fn trainer(id: TrainerId) -> Self {
        Self { kind: ResourceKind::Trainer, id }
    }

    pub fn room(id: RoomId) -> Self {
        Self { kind: ResourceKind::Room, id }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ResourceKind::Trainer => write!(f, "trainer #{}", self.id),
            ResourceKind::Room => write!(f, "room #{}", self.id),
        }
    }
}

/// What a timeline entry represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalKind {
    PtSession { member_id: MemberId },
    GroupClass,
    /// Declared trainer availability. Only ever stored in availability ledgers.
    Availability,
}

/// A single entry on a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: Ulid,
    pub span: Span,
    pub kind: IntervalKind,
}

/// Ordered, pairwise non-overlapping entries for one resource.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub resource: ResourceRef,
    /// Sorted by `span.start`. Since entries never overlap, also sorted by `span.end`.
    pub intervals: Vec<Interval>,
}

impl Timeline {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            intervals: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index at which an interval starting at `start` would be inserted.
    pub fn insertion_point(&self, start: Ms) -> usize {
        self.intervals.partition_point(|i| i.span.start < start)
    }

    /// Insert without a conflict check. Callers must have run the conflict check
    /// under the same lock; replay relies on `verify` afterwards.
    pub fn insert_interval(&mut self, interval: Interval) {
        let pos = self.insertion_point(interval.span.start);
        self.intervals.insert(pos, interval);
    }

    /// Remove interval by id. Absent ids are a no-op.
    pub fn remove_interval(&mut self, id: Ulid) -> Option<Interval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.intervals.iter().any(|i| i.id == id)
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search on both ends since starts and ends are both sorted.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Interval> {
        let left = self.intervals.partition_point(|i| i.span.end <= query.start);
        let right = self.intervals.partition_point(|i| i.span.start < query.end);
        self.intervals[left..right.max(left)].iter()
    }

    /// First adjacent pair that overlaps, if any.
    pub fn verify(&self) -> Result<(), (Ulid, Ulid)> {
        for pair in self.intervals.windows(2) {
            if pair[0].span.overlaps(&pair[1].span) {
                return Err((pair[0].id, pair[1].id));
            }
        }
        Ok(())
    }
}

/// What a reservation is, with the details needed to rebuild it from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationKind {
    PtSession {
        member_id: MemberId,
        trainer_id: TrainerId,
        room_id: RoomId,
    },
    GroupClass {
        name: String,
        trainer_id: TrainerId,
        room_id: RoomId,
        capacity: u32,
    },
}

/// A committed claim on one or more timelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub span: Span,
    pub kind: ReservationKind,
}

impl Reservation {
    /// Owning resources in lock order.
    pub fn resources(&self) -> Vec<ResourceRef> {
        match &self.kind {
            ReservationKind::PtSession { trainer_id, room_id, .. } => {
                let mut refs = vec![ResourceRef::trainer(*trainer_id), ResourceRef::room(*room_id)];
                refs.sort();
                refs
            }
            ReservationKind::GroupClass { room_id, .. } => vec![ResourceRef::room(*room_id)],
        }
    }

    pub fn trainer_id(&self) -> TrainerId {
        match &self.kind {
            ReservationKind::PtSession { trainer_id, .. }
            | ReservationKind::GroupClass { trainer_id, .. } => *trainer_id,
        }
    }

    pub fn interval_kind(&self) -> IntervalKind {
        match &self.kind {
            ReservationKind::PtSession { member_id, .. } => IntervalKind::PtSession {
                member_id: *member_id,
            },
            ReservationKind::GroupClass { .. } => IntervalKind::GroupClass,
        }
    }

    pub fn to_interval(&self) -> Interval {
        Interval {
            id: self.id,
            span: self.span,
            kind: self.interval_kind(),
        }
    }
}

/// Committed changes, one WAL record each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SessionBooked {
        id: Ulid,
        member_id: MemberId,
        trainer_id: TrainerId,
        room_id: RoomId,
        span: Span,
    },
    ClassCreated {
        id: Ulid,
        name: String,
        trainer_id: TrainerId,
        room_id: RoomId,
        span: Span,
        capacity: u32,
    },
    ReservationCancelled {
        id: Ulid,
    },
    AvailabilityDeclared {
        id: Ulid,
        trainer_id: TrainerId,
        span: Span,
    },
    MemberEnrolled {
        class_id: Ulid,
        member_id: MemberId,
    },
    MemberUnenrolled {
        class_id: Ulid,
        member_id: MemberId,
    },
}

impl Event {
    pub fn for_reservation(reservation: &Reservation) -> Self {
        match &reservation.kind {
            ReservationKind::PtSession {
                member_id,
                trainer_id,
                room_id,
            } => Event::SessionBooked {
                id: reservation.id,
                member_id: *member_id,
                trainer_id: *trainer_id,
                room_id: *room_id,
                span: reservation.span,
            },
            ReservationKind::GroupClass {
                name,
                trainer_id,
                room_id,
                capacity,
            } => Event::ClassCreated {
                id: reservation.id,
                name: name.clone(),
                trainer_id: *trainer_id,
                room_id: *room_id,
                span: reservation.span,
                capacity: *capacity,
            },
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub resource: ResourceRef,
    pub start: Ms,
    pub end: Ms,
    pub kind: IntervalKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub id: Ulid,
    pub trainer_id: TrainerId,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Ulid,
    pub member_id: MemberId,
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: Ulid,
    pub name: String,
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub start: Ms,
    pub end: Ms,
    pub capacity: u32,
    pub enrolled: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub class_id: Ulid,
    pub capacity: u32,
    /// Ascending member ids.
    pub registrants: Vec<MemberId>,
}

impl Roster {
    pub fn seats_left(&self) -> u32 {
        self.capacity.saturating_sub(self.registrants.len() as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrainerSchedule {
    pub sessions: Vec<SessionInfo>,
    pub classes: Vec<ClassInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: Ms, end: Ms) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::GroupClass,
        }
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlap_is_symmetric() {
        let spans = [
            Span::new(0, 10),
            Span::new(5, 15),
            Span::new(10, 20),
            Span::new(0, 30),
            Span::new(29, 31),
            Span::new(40, 41),
        ];
        for a in &spans {
            for b in &spans {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn span_validity() {
        assert!(Span::new(1, 2).is_valid());
        assert!(!Span::new(2, 2).is_valid());
        assert!(!Span::new(3, 2).is_valid());
    }

    #[test]
    fn duration_of_extreme_span_saturates() {
        let widest = Span::new(Ms::MIN, Ms::MAX);
        assert!(widest.is_valid());
        assert_eq!(widest.duration_ms(), Ms::MAX);
        assert_eq!(Span::new(-5, 5).duration_ms(), 10);
    }

    #[test]
    fn resource_order_is_kind_then_id() {
        let mut refs = vec![
            ResourceRef::room(1),
            ResourceRef::trainer(9),
            ResourceRef::room(0),
            ResourceRef::trainer(2),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ResourceRef::trainer(2),
                ResourceRef::trainer(9),
                ResourceRef::room(0),
                ResourceRef::room(1),
            ]
        );
    }

    #[test]
    fn interval_ordering() {
        let mut tl = Timeline::new(ResourceRef::room(1));
        tl.insert_interval(entry(300, 400));
        tl.insert_interval(entry(100, 200));
        tl.insert_interval(entry(200, 300));
        assert_eq!(tl.intervals[0].span.start, 100);
        assert_eq!(tl.intervals[1].span.start, 200);
        assert_eq!(tl.intervals[2].span.start, 300);
        assert!(tl.verify().is_ok());
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut tl = Timeline::new(ResourceRef::room(1));
        tl.insert_interval(entry(100, 200));
        assert!(tl.remove_interval(Ulid::new()).is_none());
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut tl = Timeline::new(ResourceRef::trainer(1));
        let entries: Vec<Interval> = (0..3).map(|i| entry(i * 100, i * 100 + 50)).collect();
        let ids: Vec<Ulid> = entries.iter().map(|e| e.id).collect();
        for e in entries {
            tl.insert_interval(e);
        }
        tl.remove_interval(ids[1]);
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.intervals[0].id, ids[0]);
        assert_eq!(tl.intervals[1].id, ids[2]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut tl = Timeline::new(ResourceRef::room(1));
        tl.insert_interval(entry(100, 200));
        tl.insert_interval(entry(450, 600));
        tl.insert_interval(entry(1000, 1100));

        let hits: Vec<_> = tl.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut tl = Timeline::new(ResourceRef::room(1));
        tl.insert_interval(entry(100, 200));
        tl.insert_interval(entry(300, 400));
        let hits: Vec<_> = tl.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_empty_timeline() {
        let tl = Timeline::new(ResourceRef::room(1));
        assert_eq!(tl.overlapping(&Span::new(0, 1000)).count(), 0);
    }

    #[test]
    fn verify_reports_overlapping_pair() {
        let mut tl = Timeline::new(ResourceRef::room(1));
        let a = entry(100, 200);
        let b = entry(150, 250);
        let (a_id, b_id) = (a.id, b.id);
        tl.insert_interval(a);
        tl.insert_interval(b);
        assert_eq!(tl.verify(), Err((a_id, b_id)));
    }

    #[test]
    fn pt_session_resources_are_lock_ordered() {
        let r = Reservation {
            id: Ulid::new(),
            span: Span::new(0, 10),
            kind: ReservationKind::PtSession {
                member_id: 1,
                trainer_id: 50,
                room_id: 2,
            },
        };
        assert_eq!(r.resources(), vec![ResourceRef::trainer(50), ResourceRef::room(2)]);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ClassCreated {
            id: Ulid::new(),
            name: "Spin".into(),
            trainer_id: 1,
            room_id: 2,
            span: Span::new(0, 3_600_000),
            capacity: 12,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
