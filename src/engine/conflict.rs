use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if !span.is_valid() {
        return Err(EngineError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Ids of entries on `timeline` that overlap `candidate`, in start order.
///
/// Entries are sorted and pairwise disjoint, so only the predecessor of the
/// insertion point can reach into the candidate from the left, and successors
/// stop mattering at the first one starting at or after `candidate.end`.
pub fn find_conflicts(timeline: &Timeline, candidate: &Span) -> Vec<Ulid> {
    let entries = &timeline.intervals;
    let pos = timeline.insertion_point(candidate.start);
    let mut hits = Vec::new();

    if pos > 0 && entries[pos - 1].span.end > candidate.start {
        hits.push(entries[pos - 1].id);
    }
    for interval in &entries[pos..] {
        if interval.span.start >= candidate.end {
            break;
        }
        hits.push(interval.id);
    }
    hits
}

/// Check-then-insert. The caller holds the timeline's write lock, which is what
/// makes the pair atomic.
pub(crate) fn try_reserve(timeline: &mut Timeline, interval: Interval) -> Result<(), Vec<Ulid>> {
    let conflicts = find_conflicts(timeline, &interval.span);
    if !conflicts.is_empty() {
        return Err(conflicts);
    }
    timeline.insert_interval(interval);
    Ok(())
}

/// Surface an overlapping pair as an error. Nothing here repairs the timeline.
pub(crate) fn verify_timeline(timeline: &Timeline) -> Result<(), EngineError> {
    timeline.verify().map_err(|(first, second)| {
        tracing::error!(
            resource = %timeline.resource,
            %first,
            %second,
            "timeline invariant violated: overlapping entries"
        );
        EngineError::InvariantViolation {
            resource: timeline.resource,
            first,
            second,
        }
    })
}
