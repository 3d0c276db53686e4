pub mod ttl_cache;

use time::{OffsetDateTime, PrimitiveDateTime};

/// Current UTC time as stored in `timestamp` columns.
pub fn utc_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Seconds since the epoch for a UTC `timestamp` column value.
pub fn unix_timestamp(at: PrimitiveDateTime) -> i64 {
    at.assume_utc().unix_timestamp()
}
