//! HTTP/3 SETTINGS, [RFC 9114 Section 7.2.4](https://www.rfc-editor.org/rfc/rfc9114.html#section-7.2.4)

use bytes::BufMut;

use crate::codec::varint;
use crate::ensure;
use crate::protocol::DecodeError;

pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x1;
pub const SETTINGS_MAX_FIELD_SECTION_SIZE: u64 = 0x6;
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x7;

/// Smallest reserved identifier used to exercise unknown settings handling.
pub const SETTINGS_GREASE: u64 = 0x21;

/// Ordered setting identifiers and values.
///
/// Identifiers are unique; inserting an existing identifier replaces its value in
/// place, so the encoding order is the first insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: Vec<(u64, u64)>,
}

impl Settings {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets `id` to `value`, returning the previous value.
    pub fn insert(&mut self, id: u64, value: u64) -> Option<u64> {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, old)) => Some(std::mem::replace(old, value)),
            None => {
                self.entries.push((id, value));
                None
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<u64> {
        self.entries.iter().find(|(existing, _)| *existing == id).map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The peer's limit on the size of field sections it accepts, if announced.
    pub fn max_field_section_size(&self) -> Option<u64> {
        self.get(SETTINGS_MAX_FIELD_SECTION_SIZE)
    }

    /// Encoded payload length, without the frame header.
    pub fn payload_len(&self) -> usize {
        self.entries.iter().map(|(id, value)| varint::encoded_len(*id) + varint::encoded_len(*value)).sum()
    }

    /// Writes the `(identifier, value)` pairs.
    pub fn encode_payload<B: BufMut>(&self, dst: &mut B) -> Result<(), DecodeError> {
        for (id, value) in &self.entries {
            varint::encode(*id, dst)?;
            varint::encode(*value, dst)?;
        }
        Ok(())
    }

    /// Parses a complete SETTINGS payload.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::InvalidSettings`] for a duplicate identifier or an HTTP/2-only identifier
    /// - [`DecodeError::InvalidFrame`] when the payload ends inside a pair
    pub fn decode(payload: &[u8]) -> Result<Settings, DecodeError> {
        let mut settings = Settings::new();
        let mut offset = 0;

        while offset < payload.len() {
            let (id, n) = varint::decode(payload, offset)?
                .ok_or_else(|| DecodeError::invalid_frame("SETTINGS payload ends inside an identifier"))?;
            offset += n;
            let (value, n) = varint::decode(payload, offset)?
                .ok_or_else(|| DecodeError::invalid_frame("SETTINGS payload ends inside a value"))?;
            offset += n;

            ensure!(!is_reserved_http2(id), DecodeError::invalid_settings(format!("HTTP/2 setting 0x{id:x}")));
            ensure!(
                settings.insert(id, value).is_none(),
                DecodeError::invalid_settings(format!("duplicate setting 0x{id:x}"))
            );
        }

        Ok(settings)
    }
}

impl FromIterator<(u64, u64)> for Settings {
    fn from_iter<T: IntoIterator<Item = (u64, u64)>>(iter: T) -> Self {
        let mut settings = Settings::new();
        for (id, value) in iter {
            settings.insert(id, value);
        }
        settings
    }
}

/// HTTP/2 setting identifiers that must not appear in HTTP/3.
#[inline]
fn is_reserved_http2(id: u64) -> bool {
    matches!(id, 0x2..=0x5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn insertion_order_and_replace() {
        let mut settings = Settings::new();
        assert_eq!(settings.insert(SETTINGS_MAX_FIELD_SECTION_SIZE, 100), None);
        assert_eq!(settings.insert(SETTINGS_GREASE, 0), None);
        assert_eq!(settings.insert(SETTINGS_MAX_FIELD_SECTION_SIZE, 200), Some(100));

        assert_eq!(settings.iter().collect::<Vec<_>>(), vec![(0x6, 200), (0x21, 0)]);
        assert_eq!(settings.max_field_section_size(), Some(200));
    }

    #[test]
    fn encode_payload() {
        let settings: Settings = [(SETTINGS_MAX_FIELD_SECTION_SIZE, 63)].into_iter().collect();
        let mut buf = BytesMut::new();
        settings.encode_payload(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x06, 0x3F]);
        assert_eq!(settings.payload_len(), 2);
    }

    #[test]
    fn decode_keeps_unknown_identifiers() {
        let settings = Settings::decode(&[0x06, 0x3F, 0x21, 0x00, 0x40, 0x41, 0x05]).unwrap();
        assert_eq!(settings.max_field_section_size(), Some(63));
        assert_eq!(settings.get(0x21), Some(0));
        assert_eq!(settings.get(0x41), Some(5));
    }

    #[test]
    fn decode_rejects_duplicates() {
        let err = Settings::decode(&[0x06, 0x01, 0x06, 0x02]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidSettings { .. }));
    }

    #[test]
    fn decode_rejects_http2_identifiers() {
        for id in 0x2..=0x5u8 {
            let err = Settings::decode(&[id, 0x00]).unwrap_err();
            assert!(matches!(err, DecodeError::InvalidSettings { .. }), "id {id}");
        }
    }

    #[test]
    fn decode_rejects_truncated_pair() {
        let err = Settings::decode(&[0x06]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFrame { .. }));
    }

    #[test]
    fn empty_payload() {
        assert!(Settings::decode(&[]).unwrap().is_empty());
    }
}
