use crate::model::Ms;

/// 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// One year.
pub const MAX_INTERVAL_DURATION_MS: u64 = 365 * 24 * 3_600_000;

pub const MAX_ID_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 1024;

/// Live plus parked reservations held for a single resource.
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 10_000;
pub const MAX_OVERRIDE_TARGETS: usize = 256;
