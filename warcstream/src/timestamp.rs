// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WARC (W3C-DTF) and ARC (compact numeric) timestamp handling.

use chrono::{DateTime, NaiveDate, Utc};

/// Canonical `WARC-Date` format with second precision.
pub const WARC_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp as a canonical `WARC-Date` value.
pub fn format_warc_date(date: &DateTime<Utc>) -> String {
    date.format(WARC_DATE_FORMAT).to_string()
}

/// Current time as a canonical `WARC-Date` value.
pub fn warc_date_now() -> String {
    format_warc_date(&Utc::now())
}

/// Parse a `WARC-Date` value.
///
/// Accepts any RFC 3339 timestamp, including fractional seconds and
/// numeric offsets, and normalizes it to UTC.
pub fn parse_warc_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Parse an ARC `Archive-date` value.
///
/// ARC dates are 14 digits (`YYYYMMDDhhmmss`). Shorter dates with 8 or 12
/// digits are padded with zeros; digits beyond the 14th are ignored.
pub fn parse_arc_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = match value.len() {
        8 | 12 | 14 => value,
        n if n > 14 => &value[..14],
        _ => return None,
    };
    let field = |start: usize| -> Option<u32> {
        digits.get(start..start + 2).map_or(Some(0), |s| s.parse().ok())
    };
    let year: i32 = digits[..4].parse().ok()?;
    NaiveDate::from_ymd_opt(year, field(4)?, field(6)?)?
        .and_hms_opt(field(8)?, field(10)?, field(12)?)
        .map(|d| d.and_utc())
}

/// Convert an ARC `Archive-date` value into a canonical `WARC-Date` value.
pub fn arc_to_warc_date(value: &str) -> Option<String> {
    parse_arc_date(value).map(|d| format_warc_date(&d))
}
