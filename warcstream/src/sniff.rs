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

//! Format and compression detection over leading byte windows.

use std::io::Read;
use flate2::bufread::GzDecoder;
use tracing::debug;

use crate::arc;
use crate::error::{Result, WarcError};
use crate::record::{ArchiveFormat, Compression};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gzip magic followed by the deflate method byte.
pub(crate) const GZIP_MEMBER_HEADER: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Prefix of every WARC version line.
pub const WARC_MAGIC: &[u8] = b"WARC/";

const WARC_VERSIONS: [&[u8]; 3] = [b"WARC/1.0", b"WARC/1.1", b"WARC/0."];

const SNIFF_DECOMPRESS_LIMIT: usize = 4096;

pub fn is_gzip(window: &[u8]) -> bool {
    window.starts_with(&GZIP_MAGIC)
}

/// Whether a line is a WARC version line of a known major version.
pub fn is_warc_version_line(line: &[u8]) -> bool {
    WARC_VERSIONS.iter().any(|v| line.starts_with(v))
}

/// Whether a line looks like the header line of an ARC record.
///
/// This is either the `filedesc://` line of the first record or a line with
/// at least five space-separated fields, an 8 to 14 digit date in the third
/// field and a numeric length in the last field.
pub fn is_arc_header_line(line: &[u8]) -> bool {
    let line = line.trim_ascii();
    if line.len() >= arc::FILEDESC_SCHEME.len()
        && line[..arc::FILEDESC_SCHEME.len()].eq_ignore_ascii_case(arc::FILEDESC_SCHEME.as_bytes()) {
        return true;
    }

    let fields: Vec<&[u8]> = line.split(|&b| b == b' ').filter(|f| !f.is_empty()).collect();
    if fields.len() < 5 {
        return false;
    }
    let is_digits = |f: &[u8]| !f.is_empty() && f.iter().all(u8::is_ascii_digit);
    let date = fields[2];
    (8..=14).contains(&date.len())
        && is_digits(date)
        && fields.last().is_some_and(|f| is_digits(f))
}

fn first_line(window: &[u8]) -> &[u8] {
    let start = window.iter().position(|&b| b != b'\r' && b != b'\n').unwrap_or(window.len());
    let window = &window[start..];
    let end = window.iter().position(|&b| b == b'\n').unwrap_or(window.len());
    &window[..end]
}

/// Detect the archive format from the first line of uncompressed bytes.
///
/// Leading CR and LF bytes are skipped.
pub fn sniff_format_line(window: &[u8]) -> Option<ArchiveFormat> {
    let line = first_line(window);
    if is_warc_version_line(line) {
        Some(ArchiveFormat::Warc)
    } else if is_arc_header_line(line) {
        Some(ArchiveFormat::Arc)
    } else {
        None
    }
}

/// Classify a leading byte window of an archive.
///
/// Gzip input is detected from its magic bytes. The format is then sniffed
/// from the leading decompressed bytes of the first member, which may be cut
/// off by the end of the window.
pub fn sniff(window: &[u8]) -> Result<(ArchiveFormat, Compression)> {
    sniff_at(window, 0)
}

/// Classify a byte window that starts at `offset` in its source.
pub(crate) fn sniff_at(window: &[u8], offset: u64) -> Result<(ArchiveFormat, Compression)> {
    let result = if is_gzip(window) {
        let mut decoder = GzDecoder::new(window);
        let mut decompressed = vec![0u8; SNIFF_DECOMPRESS_LIMIT];
        let mut filled = 0;
        while filled < decompressed.len() {
            match decoder.read(&mut decompressed[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if filled == 0 => {
                    return Err(WarcError::GzipMember { offset, reason: e.to_string() });
                }
                // Window ends inside the member.
                Err(_) => break,
            }
        }
        let format = sniff_format_line(&decompressed[..filled]);
        format.map(|f| (f, Compression::GzipPerRecord))
            .ok_or_else(|| unknown(&decompressed[..filled], offset))
    } else {
        sniff_format_line(window)
            .map(|f| (f, Compression::None))
            .ok_or_else(|| unknown(window, offset))
    };
    if let Ok((format, compression)) = &result {
        debug!("Detected {} archive with compression {:?} at offset {}", format, compression, offset);
    }
    result
}

fn unknown(window: &[u8], offset: u64) -> WarcError {
    let line = first_line(window);
    let preview = String::from_utf8_lossy(&line[..line.len().min(64)]).to_string();
    WarcError::UnknownFormat {
        offset,
        reason: if preview.is_empty() { "no data".to_string() } else { format!("first line {preview:?}") },
    }
}
