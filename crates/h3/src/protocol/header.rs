use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, TE, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::codec::qpack::encode_field_section;
use crate::ensure;
use crate::protocol::H3Error;

/// A decoded field: raw name and value octets, in wire order.
///
/// Names are not validated here; request and response mapping check them when
/// they are turned into [`http`] types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    name: Bytes,
    value: Bytes,
}

impl HeaderField {
    pub fn new<N: Into<Bytes>, V: Into<Bytes>>(name: N, value: V) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Pseudo-header fields start with a colon.
    #[inline]
    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }

    /// Size as counted by SETTINGS_MAX_FIELD_SECTION_SIZE: name, value and 32
    /// bytes of overhead.
    #[inline]
    pub fn section_size(&self) -> u64 {
        (self.name.len() + self.value.len() + 32) as u64
    }

    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.name, self.value)
    }
}

/// Total size of a field section as counted by SETTINGS_MAX_FIELD_SECTION_SIZE.
pub fn field_section_size<'a, I>(fields: I) -> u64
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    fields.into_iter().map(|(name, value)| (name.len() + value.len() + 32) as u64).sum()
}

/// Converts a regular (non pseudo) field into an `http` header pair.
///
/// HTTP/3 field names must be lowercase, and connection-specific fields are
/// malformed, [RFC 9114 Section 4.2](https://www.rfc-editor.org/rfc/rfc9114.html#section-4.2).
pub(crate) fn to_http_header(field: &HeaderField) -> Result<(HeaderName, HeaderValue), H3Error> {
    ensure!(
        !field.name().iter().any(u8::is_ascii_uppercase),
        H3Error::message(format!("uppercase field name {}", String::from_utf8_lossy(field.name())))
    );

    let name = HeaderName::from_bytes(field.name()).map_err(H3Error::message)?;
    ensure!(
        !is_connection_specific(&name),
        H3Error::message(format!("connection-specific field {name}"))
    );

    let value = HeaderValue::from_bytes(field.value()).map_err(H3Error::message)?;
    ensure!(name != TE || value == "trailers", H3Error::message("te field other than trailers"));

    Ok((name, value))
}

#[inline]
pub(crate) fn is_connection_specific(name: &HeaderName) -> bool {
    *name == CONNECTION || *name == TRANSFER_ENCODING || *name == UPGRADE || name == "keep-alive" || name == "proxy-connection"
}

/// Builds a trailer map; pseudo-header fields are not allowed in trailers.
pub fn trailers_from_fields(fields: &[HeaderField]) -> Result<HeaderMap, H3Error> {
    let mut trailers = HeaderMap::with_capacity(fields.len());
    for field in fields {
        ensure!(!field.is_pseudo(), H3Error::message("pseudo-header field in trailers"));
        let (name, value) = to_http_header(field)?;
        trailers.append(name, value);
    }
    Ok(trailers)
}

/// Iterates the fields of `headers` that may be sent over HTTP/3.
pub(crate) fn sendable_fields(headers: &HeaderMap) -> impl Iterator<Item = (&[u8], &[u8])> {
    headers
        .iter()
        .filter(|(name, _)| !is_connection_specific(name))
        .map(|(name, value)| (name.as_str().as_bytes(), value.as_bytes()))
}

/// Writes a trailer section, returning its field section size.
pub fn encode_trailers(trailers: &HeaderMap, dst: &mut BytesMut) -> u64 {
    encode_field_section(sendable_fields(trailers), dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::qpack::decode_field_section;
    use crate::protocol::ErrorCode;

    #[test]
    fn pseudo_and_size() {
        let field = HeaderField::new(":path", "/index.html");
        assert!(field.is_pseudo());
        assert_eq!(field.section_size(), 5 + 11 + 32);

        let field = HeaderField::new("accept", "*/*");
        assert!(!field.is_pseudo());
        assert_eq!(field_section_size([(field.name(), field.value())]), 6 + 3 + 32);
    }

    #[test]
    fn trailers_round_trip() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("0"));
        trailers.insert(CONNECTION, HeaderValue::from_static("close"));

        let mut buf = BytesMut::new();
        encode_trailers(&trailers, &mut buf);
        let fields = decode_field_section(&buf).unwrap();
        assert_eq!(fields, vec![HeaderField::new("grpc-status", "0")]);

        let decoded = trailers_from_fields(&fields).unwrap();
        assert_eq!(decoded.get("grpc-status").unwrap(), "0");
    }

    #[test]
    fn malformed_fields() {
        let err = trailers_from_fields(&[HeaderField::new(":status", "200")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_MESSAGE_ERROR);

        let err = trailers_from_fields(&[HeaderField::new("Content-Type", "text/plain")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_MESSAGE_ERROR);

        let err = trailers_from_fields(&[HeaderField::new("transfer-encoding", "chunked")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_MESSAGE_ERROR);

        let err = trailers_from_fields(&[HeaderField::new("te", "gzip")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_MESSAGE_ERROR);
        assert!(trailers_from_fields(&[HeaderField::new("te", "trailers")]).is_ok());
    }
}
