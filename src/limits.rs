/// Max length of an owner-attribute value (instructor name).
pub const MAX_OWNER_LEN: usize = 256;

/// Max length of a resource display name.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of a cancellation reason.
pub const MAX_REASON_LEN: usize = 1024;

/// Max registered resources per store.
pub const MAX_RESOURCES: usize = 100_000;

/// Max schedule entries (cancelled included) for one owner on one date.
pub const MAX_ENTRIES_PER_OWNER_DAY: usize = 1_000;

/// Max bytes in one protocol line.
pub const MAX_LINE_LEN: usize = 64 * 1024;
