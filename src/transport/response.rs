//! Response normalization utilities.
//!
//! Maps protocol-native results into the uniform [`Response`] shape: both the
//! version-prefixed protocol label and the stripped version are retained,
//! structured headers are built next to the original raw flat array, and the
//! derived size metadata sums raw header and body byte lengths.

use std::collections::HashMap;

use crate::document::{RequestEcho, Response, ResponseMeta, Timings};

/// Merges a flat alternating `[name, value, name, value, …]` header array
/// into lower-cased name → ordered value list, preserving every repetition
/// in arrival order. A trailing unpaired name is dropped and merging stops
/// growing from that point (truncation, not an error).
pub fn merge_raw_http_headers(raw_headers: &[String]) -> HashMap<String, Vec<String>> {
    let mut merged: HashMap<String, Vec<String>> = HashMap::new();
    for pair in raw_headers.chunks_exact(2) {
        merged
            .entry(pair[0].to_lowercase())
            .or_default()
            .push(pair[1].clone());
    }
    merged
}

/// Renders a byte count as a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Builds the normalized [`Response`] from captured wire data.
pub fn normalize_response(
    status_code: u16,
    status_message: Option<String>,
    version: &str,
    raw_headers: Vec<String>,
    raw_body: Vec<u8>,
    timings: Timings,
    request: RequestEcho,
) -> Response {
    let mut headers = merge_raw_http_headers(&raw_headers);
    // Pseudo-headers such as `:status` are transport internals.
    headers.retain(|name, _| !name.starts_with(':'));

    let http_version = version.strip_prefix("HTTP/").unwrap_or(version).to_string();
    let protocol = format!("HTTP/{http_version}");

    let header_bytes: u64 = raw_headers.iter().map(|field| field.len() as u64).sum();
    let size = format_size(header_bytes + raw_body.len() as u64);

    let content_type = headers
        .get("content-type")
        .and_then(|values| values.first())
        .cloned();
    let body = String::from_utf8(raw_body.clone()).ok();

    Response {
        status_code,
        status_message,
        protocol,
        http_version,
        headers,
        raw_headers,
        body,
        raw_body,
        content_type,
        timings,
        timestamp: Some(chrono::Utc::now()),
        request: Some(request),
        meta: ResponseMeta { size },
    }
}
