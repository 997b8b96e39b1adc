//! Timestamp formatting across the `time`/`chrono` boundary.
//!
//! Storage and domain code use `time::OffsetDateTime`; display formatting
//! goes through `chrono-tz` because that is where the IANA zone database
//! lives.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const ARCHIVE_TIMESTAMP: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let datetime_utc = DateTime::<Utc>::from_timestamp(utc.unix_timestamp(), utc.nanosecond())
        .unwrap_or_else(|| {
            DateTime::<Utc>::from_timestamp(utc.unix_timestamp(), 0).expect("valid UTC timestamp")
        });
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// Human-readable timestamp in the wiki's display timezone.
pub fn display_datetime(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz)
        .format("%Y/%m/%d %H:%M:%S")
        .to_string()
}

/// UTC timestamp used in export archives: `YYYY-MM-DD HH:MM:SS`.
pub fn archive_timestamp(time: OffsetDateTime) -> String {
    time.to_offset(UtcOffset::UTC)
        .format(ARCHIVE_TIMESTAMP)
        .expect("archive timestamp formats")
}

pub fn parse_archive_timestamp(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    Ok(PrimitiveDateTime::parse(value, ARCHIVE_TIMESTAMP)?.assume_utc())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn archive_timestamp_roundtrip() {
        let moment = datetime!(2011-03-07 18:45:12 UTC);
        let formatted = archive_timestamp(moment);
        assert_eq!(formatted, "2011-03-07 18:45:12");
        assert_eq!(parse_archive_timestamp(&formatted).unwrap(), moment);
    }

    #[test]
    fn display_datetime_applies_zone_offset() {
        let moment = datetime!(2011-03-07 18:45:12 UTC);
        assert_eq!(
            display_datetime(moment, Tz::UTC),
            "2011/03/07 18:45:12"
        );
        // Helsinki is UTC+2 in March (before DST).
        assert_eq!(
            display_datetime(moment, Tz::Europe__Helsinki),
            "2011/03/07 20:45:12"
        );
    }
}
