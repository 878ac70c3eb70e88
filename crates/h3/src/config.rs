//! Connection configuration
//!
//! [`H3Config`] deserializes with serde, so it can be embedded in any
//! application config file; every field has a default.
//!
//! ```
//! use micro_h3::config::H3Config;
//!
//! let config: H3Config = serde_json::from_str(r#"{ "max_request_header_length": 8192 }"#).unwrap();
//! assert_eq!(config.local_settings().max_field_section_size(), Some(8192));
//! ```

use serde::Deserialize;

use crate::codec::frame::DEFAULT_MAX_CONTROL_FRAME_SIZE;
use crate::pool::DEFAULT_SEGMENT_SIZE;
use crate::protocol::Settings;
use crate::protocol::settings::{SETTINGS_GREASE, SETTINGS_MAX_FIELD_SECTION_SIZE};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct H3Config {
    /// Largest HEADERS payload accepted on a request stream, announced to the peer
    /// as SETTINGS_MAX_FIELD_SECTION_SIZE. `None` means unlimited.
    pub max_request_header_length: Option<u64>,

    /// Send a reserved setting so peers keep tolerating unknown identifiers.
    pub grease_settings: bool,

    /// Extra `(identifier, value)` pairs appended to the local SETTINGS.
    pub additional_settings: Vec<(u64, u64)>,

    /// Segment size of the buffer pool behind response DATA writers.
    pub writer_segment_size: usize,

    /// Largest SETTINGS or GOAWAY payload accepted on the control stream.
    pub max_control_frame_size: usize,
}

impl Default for H3Config {
    fn default() -> Self {
        Self {
            max_request_header_length: None,
            grease_settings: true,
            additional_settings: Vec::new(),
            writer_segment_size: DEFAULT_SEGMENT_SIZE,
            max_control_frame_size: DEFAULT_MAX_CONTROL_FRAME_SIZE,
        }
    }
}

impl H3Config {
    /// The SETTINGS sent on the local control stream.
    ///
    /// The header limit comes first when configured; otherwise, with greasing on,
    /// a single reserved setting keeps the frame non-empty.
    pub fn local_settings(&self) -> Settings {
        let mut settings = Settings::new();
        match self.max_request_header_length {
            Some(limit) => {
                settings.insert(SETTINGS_MAX_FIELD_SECTION_SIZE, limit);
            }
            None if self.grease_settings => {
                settings.insert(SETTINGS_GREASE, 0);
            }
            None => {}
        }

        for (id, value) in &self.additional_settings {
            settings.insert(*id, *value);
        }
        settings
    }

    /// The HEADERS payload limit as a buffer size.
    pub fn max_field_section_size(&self) -> Option<usize> {
        self.max_request_header_length.map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_greased() {
        let settings = H3Config::default().local_settings();
        assert_eq!(settings.iter().collect::<Vec<_>>(), vec![(0x21, 0)]);
    }

    #[test]
    fn header_limit_is_announced() {
        let config = H3Config { max_request_header_length: Some(63), ..Default::default() };
        assert_eq!(config.local_settings().iter().collect::<Vec<_>>(), vec![(0x6, 63)]);
        assert_eq!(config.max_field_section_size(), Some(63));
    }

    #[test]
    fn no_grease_no_limit_is_empty() {
        let config = H3Config { grease_settings: false, ..Default::default() };
        assert!(config.local_settings().is_empty());
    }

    #[test]
    fn from_json() {
        let config: H3Config = serde_json::from_str(
            r#"{
                "grease_settings": false,
                "additional_settings": [[1, 0], [7, 0]],
                "writer_segment_size": 4096
            }"#,
        )
        .unwrap();

        assert_eq!(config.local_settings().iter().collect::<Vec<_>>(), vec![(0x1, 0), (0x7, 0)]);
        assert_eq!(config.writer_segment_size, 4096);
        assert_eq!(config.max_control_frame_size, DEFAULT_MAX_CONTROL_FRAME_SIZE);
    }
}
