//! Key/value camera parameter store.
//!
//! Parameters travel between the host and the camera as a flattened
//! `key=value;key=value` string. Only a handful of keys are read by the
//! notifier (thumbnail geometry and the EXIF-related fields); everything else
//! is carried through untouched.

use std::collections::BTreeMap;

/// Thumbnail width in pixels.
pub const KEY_JPEG_THUMBNAIL_WIDTH: &str = "jpeg-thumbnail-width";
/// Thumbnail height in pixels.
pub const KEY_JPEG_THUMBNAIL_HEIGHT: &str = "jpeg-thumbnail-height";
/// Thumbnail JPEG quality, 1..=100.
pub const KEY_JPEG_THUMBNAIL_QUALITY: &str = "jpeg-thumbnail-quality";
/// GPS latitude in decimal degrees.
pub const KEY_GPS_LATITUDE: &str = "gps-latitude";
/// GPS longitude in decimal degrees.
pub const KEY_GPS_LONGITUDE: &str = "gps-longitude";
/// GPS altitude in meters.
pub const KEY_GPS_ALTITUDE: &str = "gps-altitude";
/// GPS fix time in seconds since the UNIX epoch.
pub const KEY_GPS_TIMESTAMP: &str = "gps-timestamp";
/// GPS processing method name.
pub const KEY_GPS_PROCESSING_METHOD: &str = "gps-processing-method";
/// Lens focal length in millimeters.
pub const KEY_FOCAL_LENGTH: &str = "focal-length";
/// Image rotation in degrees (0, 90, 180, 270).
pub const KEY_ROTATION: &str = "rotation";

/// Camera configuration as string key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraParameters {
    values: BTreeMap<String, String>,
}

impl CameraParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flattened `key=value;key=value` string.
    ///
    /// Entries without `=` or with an empty key are skipped.
    #[must_use]
    pub fn unflatten(flattened: &str) -> Self {
        let values = flattened
            .split(';')
            .filter_map(|entry| entry.split_once('='))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        Self { values }
    }

    /// Serialize into the flattened `key=value;key=value` form.
    #[must_use]
    pub fn flatten(&self) -> String {
        self.values
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Raw string value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Integer value for `key`, `None` if missing or not an integer.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.get(key)?.trim().parse().ok()
    }

    /// Floating point value for `key`, `None` if missing or not a number.
    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse().ok()
    }

    /// Set a string value. Keys and values containing `;` or `=` are rejected
    /// since they cannot survive flattening.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let invalid = |s: &str| s.contains(';') || s.contains('=');
        if key.is_empty() || invalid(key) || invalid(value) {
            tracing::warn!(key, value, "Rejected camera parameter");
            return false;
        }
        self.values.insert(key.to_owned(), value.to_owned());
        true
    }

    /// Set an integer value.
    pub fn set_int(&mut self, key: &str, value: i32) -> bool {
        self.set(key, &value.to_string())
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Configured thumbnail size, if both dimensions are positive.
    #[must_use]
    pub fn thumbnail_size(&self) -> Option<(u32, u32)> {
        let width = u32::try_from(self.get_int(KEY_JPEG_THUMBNAIL_WIDTH)?).ok()?;
        let height = u32::try_from(self.get_int(KEY_JPEG_THUMBNAIL_HEIGHT)?).ok()?;
        (width > 0 && height > 0).then_some((width, height))
    }
}
