//! Record line rendering.
//!
//! Line format: `<time>\t<tag>\t<json>\n`. Tabs or newlines inside the tag
//! are written as-is; consumers splitting on tabs must not rely on tags
//! being free of them. The JSON payload never contains raw newlines.

use serde_json::{Map, Value};
use thiserror::Error;
use time::format_description::OwnedFormatItem;
use time::{OffsetDateTime, UtcOffset};

use crate::error::ConfigError;
use crate::slicer::{parse_format, TimeZonePolicy};

/// ISO 8601 with a numeric offset, e.g. `2024-06-15T12:00:00+0000`.
pub const DEFAULT_TIME_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to format timestamp: {0}")]
    Time(#[from] time::error::Format),
    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RecordFormatter {
    items: OwnedFormatItem,
    offset: UtcOffset,
}

impl RecordFormatter {
    pub fn new(time_format: Option<&str>, policy: TimeZonePolicy) -> Result<Self, ConfigError> {
        Self::with_offset(time_format, policy.offset())
    }

    pub fn with_offset(time_format: Option<&str>, offset: UtcOffset) -> Result<Self, ConfigError> {
        let format = time_format.unwrap_or(DEFAULT_TIME_FORMAT);
        Ok(Self {
            items: parse_format(format)?,
            offset,
        })
    }

    /// Keys are emitted in sorted order, so equal records render to equal
    /// lines.
    pub fn format(
        &self,
        tag: &str,
        time: OffsetDateTime,
        record: &Map<String, Value>,
    ) -> Result<String, FormatError> {
        let time_str = time.to_offset(self.offset).format(&self.items)?;
        let json = serde_json::to_string(record)?;
        Ok(format!("{time_str}\t{tag}\t{json}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn default_line_layout() {
        let formatter = RecordFormatter::with_offset(None, UtcOffset::UTC).expect("formatter");
        let time = OffsetDateTime::from_unix_timestamp(1_718_452_800).expect("time");
        let line = formatter
            .format("app.access", time, &record(json!({"b": 2, "a": "x"})))
            .expect("format");
        assert_eq!(
            line,
            "2024-06-15T12:00:00+0000\tapp.access\t{\"a\":\"x\",\"b\":2}\n"
        );
    }

    #[test]
    fn custom_format_and_offset() {
        let offset = UtcOffset::from_hms(-5, 0, 0).expect("offset");
        let formatter =
            RecordFormatter::with_offset(Some("[year]/[month]/[day] [hour]:[minute]"), offset)
                .expect("formatter");
        let time = OffsetDateTime::from_unix_timestamp(1_718_452_800).expect("time");
        let line = formatter
            .format("t", time, &Map::new())
            .expect("format");
        assert_eq!(line, "2024/06/15 07:00\tt\t{}\n");
    }

    #[test]
    fn embedded_newlines_stay_escaped_in_payload() {
        let formatter = RecordFormatter::with_offset(None, UtcOffset::UTC).expect("formatter");
        let time = OffsetDateTime::UNIX_EPOCH;
        let line = formatter
            .format("t", time, &record(json!({"msg": "a\nb\tc"})))
            .expect("format");
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with("{\"msg\":\"a\\nb\\tc\"}\n"));
    }
}
