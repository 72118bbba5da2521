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

//! ARC header lines.
//!
//! An ARC record starts with a single space-separated line. Version 1 lines
//! have five fields (`URL IP-address Archive-date Content-type
//! Archive-length`), version 2 lines add result code, checksum, location,
//! offset and filename before the length.

use crate::header::{HeaderEncoding, HeaderMap};

pub const URL: &str = "URL";
pub const IP_ADDRESS: &str = "IP-address";
pub const ARCHIVE_DATE: &str = "Archive-date";
pub const CONTENT_TYPE: &str = "Content-type";
pub const RESULT_CODE: &str = "Result-code";
pub const CHECKSUM: &str = "Checksum";
pub const LOCATION: &str = "Location";
pub const OFFSET: &str = "Offset";
pub const FILENAME: &str = "Filename";
pub const ARCHIVE_LENGTH: &str = "Archive-length";

/// URL scheme of the leading file description record.
pub const FILEDESC_SCHEME: &str = "filedesc://";

const V2_MIDDLE: [&str; 5] = [RESULT_CODE, CHECKSUM, LOCATION, OFFSET, FILENAME];

/// Parse an ARC header line (without line terminator) into a header map.
///
/// Returns `None` if the line has fewer than five fields.
pub fn parse_header_line(line: &[u8]) -> Option<HeaderMap> {
    let fields: Vec<&[u8]> = line.trim_ascii()
        .split(|&b| b == b' ')
        .filter(|f| !f.is_empty())
        .collect();
    let n = fields.len();
    if n < 5 {
        return None;
    }

    let mut headers = HeaderMap::new(HeaderEncoding::Latin1);

    // Unescaped spaces in URLs shift every field, so the URL absorbs the excess.
    let url_end = if n > 10 { n - 9 } else { 1 };
    headers.append_bytes(URL.as_bytes(), &fields[..url_end].join(&b' '));
    headers.append_bytes(IP_ADDRESS.as_bytes(), fields[url_end]);
    headers.append_bytes(ARCHIVE_DATE.as_bytes(), fields[url_end + 1]);
    headers.append_bytes(CONTENT_TYPE.as_bytes(), fields[url_end + 2]);
    for (name, value) in V2_MIDDLE.iter().zip(&fields[url_end + 3..n - 1]) {
        headers.append_bytes(name.as_bytes(), value);
    }
    headers.append_bytes(ARCHIVE_LENGTH.as_bytes(), fields[n - 1]);
    Some(headers)
}

/// Format the header line of an ARC record, without line terminator.
///
/// Writes a version 2 line if any version 2 field is present, a version 1
/// line otherwise. Missing fields become `-`.
pub fn format_header_line(headers: &HeaderMap) -> Vec<u8> {
    let field = |name: &str| -> Vec<u8> {
        match headers.get_bytes(name.as_bytes()) {
            Some(v) if !v.is_empty() => v.iter()
                .flat_map(|&b| if b == b' ' { b"%20".to_vec() } else { vec![b] })
                .filter(|&b| b != b'\r' && b != b'\n')
                .collect(),
            _ => b"-".to_vec(),
        }
    };

    let mut names = vec![URL, IP_ADDRESS, ARCHIVE_DATE, CONTENT_TYPE];
    if V2_MIDDLE.iter().any(|name| headers.contains_key(name)) {
        names.extend_from_slice(&V2_MIDDLE);
    }
    names.push(ARCHIVE_LENGTH);

    names.iter()
        .map(|name| field(*name))
        .collect::<Vec<_>>()
        .join(&b' ')
}

/// Whether a URL names a file description record.
pub fn is_filedesc(url: &str) -> bool {
    url.get(..FILEDESC_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(FILEDESC_SCHEME))
}
