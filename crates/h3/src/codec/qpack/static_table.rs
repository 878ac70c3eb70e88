//! QPACK static table, [RFC 9204 Appendix A](https://www.rfc-editor.org/rfc/rfc9204.html#appendix-A)

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::protocol::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEntry {
    pub name: &'static str,
    pub value: &'static str,
}

const fn entry(name: &'static str, value: &'static str) -> StaticEntry {
    StaticEntry { name, value }
}

pub const STATIC_TABLE_LEN: usize = 99;

#[rustfmt::skip]
pub static STATIC_TABLE: [StaticEntry; STATIC_TABLE_LEN] = [
    entry(":authority", ""),
    entry(":path", "/"),
    entry("age", "0"),
    entry("content-disposition", ""),
    entry("content-length", "0"),
    entry("cookie", ""),
    entry("date", ""),
    entry("etag", ""),
    entry("if-modified-since", ""),
    entry("if-none-match", ""),
    entry("last-modified", ""),
    entry("link", ""),
    entry("location", ""),
    entry("referer", ""),
    entry("set-cookie", ""),
    entry(":method", "CONNECT"),
    entry(":method", "DELETE"),
    entry(":method", "GET"),
    entry(":method", "HEAD"),
    entry(":method", "OPTIONS"),
    entry(":method", "POST"),
    entry(":method", "PUT"),
    entry(":scheme", "http"),
    entry(":scheme", "https"),
    entry(":status", "103"),
    entry(":status", "200"),
    entry(":status", "304"),
    entry(":status", "404"),
    entry(":status", "503"),
    entry("accept", "*/*"),
    entry("accept", "application/dns-message"),
    entry("accept-encoding", "gzip, deflate, br"),
    entry("accept-ranges", "bytes"),
    entry("access-control-allow-headers", "cache-control"),
    entry("access-control-allow-headers", "content-type"),
    entry("access-control-allow-origin", "*"),
    entry("cache-control", "max-age=0"),
    entry("cache-control", "max-age=2592000"),
    entry("cache-control", "max-age=604800"),
    entry("cache-control", "no-cache"),
    entry("cache-control", "no-store"),
    entry("cache-control", "public, max-age=31536000"),
    entry("content-encoding", "br"),
    entry("content-encoding", "gzip"),
    entry("content-type", "application/dns-message"),
    entry("content-type", "application/javascript"),
    entry("content-type", "application/json"),
    entry("content-type", "application/x-www-form-urlencoded"),
    entry("content-type", "image/gif"),
    entry("content-type", "image/jpeg"),
    entry("content-type", "image/png"),
    entry("content-type", "text/css"),
    entry("content-type", "text/html; charset=utf-8"),
    entry("content-type", "text/plain"),
    entry("content-type", "text/plain;charset=utf-8"),
    entry("range", "bytes=0-"),
    entry("strict-transport-security", "max-age=31536000"),
    entry("strict-transport-security", "max-age=31536000; includesubdomains"),
    entry("strict-transport-security", "max-age=31536000; includesubdomains; preload"),
    entry("vary", "accept-encoding"),
    entry("vary", "origin"),
    entry("x-content-type-options", "nosniff"),
    entry("x-xss-protection", "1; mode=block"),
    entry(":status", "100"),
    entry(":status", "204"),
    entry(":status", "206"),
    entry(":status", "302"),
    entry(":status", "400"),
    entry(":status", "403"),
    entry(":status", "421"),
    entry(":status", "425"),
    entry(":status", "500"),
    entry("accept-language", ""),
    entry("access-control-allow-credentials", "FALSE"),
    entry("access-control-allow-credentials", "TRUE"),
    entry("access-control-allow-headers", "*"),
    entry("access-control-allow-methods", "get"),
    entry("access-control-allow-methods", "get, post, options"),
    entry("access-control-allow-methods", "options"),
    entry("access-control-expose-headers", "content-length"),
    entry("access-control-request-headers", "content-type"),
    entry("access-control-request-method", "get"),
    entry("access-control-request-method", "post"),
    entry("alt-svc", "clear"),
    entry("authorization", ""),
    entry("content-security-policy", "script-src 'none'; object-src 'none'; base-uri 'none'"),
    entry("early-data", "1"),
    entry("expect-ct", ""),
    entry("forwarded", ""),
    entry("if-range", ""),
    entry("origin", ""),
    entry("purpose", "prefetch"),
    entry("server", ""),
    entry("timing-allow-origin", "*"),
    entry("upgrade-insecure-requests", "1"),
    entry("user-agent", ""),
    entry("x-forwarded-for", ""),
    entry("x-frame-options", "deny"),
    entry("x-frame-options", "sameorigin"),
];

/// Result of looking a field up in the static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticMatch {
    /// name and value match; the field can be sent as an indexed field line
    Exact(usize),
    /// only the name matches; index of the first entry carrying it
    Name(usize),
    None,
}

struct NameIndex {
    first: usize,
    values: Vec<(&'static [u8], usize)>,
}

static BY_NAME: Lazy<HashMap<&'static [u8], NameIndex>> = Lazy::new(|| {
    let mut map: HashMap<&'static [u8], NameIndex> = HashMap::with_capacity(STATIC_TABLE_LEN);
    for (index, entry) in STATIC_TABLE.iter().enumerate() {
        map.entry(entry.name.as_bytes())
            .or_insert_with(|| NameIndex { first: index, values: Vec::new() })
            .values
            .push((entry.value.as_bytes(), index));
    }
    map
});

/// Returns the entry at `index`.
#[inline]
pub fn get(index: u64) -> Result<&'static StaticEntry, DecodeError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| STATIC_TABLE.get(i))
        .ok_or(DecodeError::InvalidStaticIndex { index })
}

/// Finds the best static representation for a field, preferring an exact match.
pub fn find(name: &[u8], value: &[u8]) -> StaticMatch {
    let Some(by_name) = BY_NAME.get(name) else {
        return StaticMatch::None;
    };

    by_name
        .values
        .iter()
        .find(|(candidate, _)| *candidate == value)
        .map_or(StaticMatch::Name(by_name.first), |(_, index)| StaticMatch::Exact(*index))
}
