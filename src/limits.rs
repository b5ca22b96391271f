use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// One week. Nothing the club books runs longer.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// Widest window a single `query` may scan: ~1 year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_ENTRIES_PER_TIMELINE: usize = 100_000;
pub const MAX_CLASS_NAME_LEN: usize = 200;
pub const MAX_CLASS_CAPACITY: u32 = 10_000;
