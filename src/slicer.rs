//! Time bucket keys.
//!
//! Format strings are `time` format descriptions (`[year][month][day]`),
//! not strftime patterns.

use std::num::NonZeroU8;

use time::format_description::{self, OwnedFormatItem};
use time::parsing::Parsed;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{ConfigError, WriteError};

/// Daily buckets.
pub const DEFAULT_TIME_SLICE_FORMAT: &str = "[year][month][day]";

/// Which offset timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZonePolicy {
    #[default]
    Local,
    Utc,
}

impl TimeZonePolicy {
    pub fn from_localtime(localtime: bool) -> Self {
        if localtime {
            TimeZonePolicy::Local
        } else {
            TimeZonePolicy::Utc
        }
    }

    /// Resolves the offset once. The local offset is sampled at call time,
    /// so a DST change is only picked up by a fresh resolve.
    pub fn offset(self) -> UtcOffset {
        match self {
            TimeZonePolicy::Utc => UtcOffset::UTC,
            TimeZonePolicy::Local => match UtcOffset::current_local_offset() {
                Ok(offset) => offset,
                Err(err) => {
                    log::warn!("local offset unavailable ({err}), falling back to UTC");
                    UtcOffset::UTC
                }
            },
        }
    }
}

pub(crate) fn parse_format(format: &str) -> Result<OwnedFormatItem, ConfigError> {
    format_description::parse_owned::<1>(format).map_err(|err| ConfigError::InvalidTimeFormat {
        format: format.to_string(),
        reason: err.to_string(),
    })
}

/// Maps timestamps to bucket keys and keys back to the start of their
/// bucket.
#[derive(Debug, Clone)]
pub struct TimeSlicer {
    format: String,
    items: OwnedFormatItem,
    offset: UtcOffset,
}

impl TimeSlicer {
    pub fn new(format: &str, policy: TimeZonePolicy) -> Result<Self, ConfigError> {
        Self::with_offset(format, policy.offset())
    }

    pub fn with_offset(format: &str, offset: UtcOffset) -> Result<Self, ConfigError> {
        let items = parse_format(format)?;
        // Reject descriptions that cannot render a plain timestamp, so that
        // key_for only fails on genuinely broken input.
        OffsetDateTime::UNIX_EPOCH
            .format(&items)
            .map_err(|err| ConfigError::InvalidTimeFormat {
                format: format.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            format: format.to_string(),
            items,
            offset,
        })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn key_for(&self, at: OffsetDateTime) -> Result<String, time::error::Format> {
        at.to_offset(self.offset).format(&self.items)
    }

    /// Components missing from the format default to the start of the
    /// period: January, day 1, midnight.
    pub fn parse_key(&self, key: &str) -> Result<PrimitiveDateTime, WriteError> {
        let invalid = |reason: String| WriteError::InvalidKey {
            key: key.to_string(),
            reason,
        };

        let mut parsed = Parsed::new();
        let rest = parsed
            .parse_item(key.as_bytes(), &self.items)
            .map_err(|err| invalid(err.to_string()))?;
        if !rest.is_empty() {
            return Err(invalid("trailing characters".to_string()));
        }

        let year = parsed
            .year()
            .ok_or_else(|| invalid("missing year".to_string()))?;
        let month = parsed.month().unwrap_or(Month::January);
        let day = parsed.day().map(NonZeroU8::get).unwrap_or(1);
        let date =
            Date::from_calendar_date(year, month, day).map_err(|err| invalid(err.to_string()))?;
        let time = Time::from_hms(
            parsed.hour_24().unwrap_or(0),
            parsed.minute().unwrap_or(0),
            parsed.second().unwrap_or(0),
        )
        .map_err(|err| invalid(err.to_string()))?;

        Ok(PrimitiveDateTime::new(date, time))
    }
}
