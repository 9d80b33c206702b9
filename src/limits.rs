use crate::model::Ms;

pub const MAX_ID_LEN: usize = 256;
pub const MAX_NAME_LEN: usize = 256;
/// Customer, service and reason text.
pub const MAX_TEXT_LEN: usize = 1024;

pub const MAX_APPOINTMENTS_PER_DAY: usize = 10_000;
pub const MAX_DAYS: usize = 10_000;
pub const MAX_ROSTER_LEN: usize = 256;
/// Rows in one multi-row insert.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// 2000-01-01T00:00:00
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// No appointment runs longer than a day.
pub const MAX_SPAN_DURATION_MS: Ms = 24 * 3_600_000;
