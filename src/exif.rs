//! EXIF metadata assembly for compressed still images.
//!
//! [`ExifData`] is built from the current [`CameraParameters`] at capture
//! time, optionally takes ownership of a JPEG thumbnail, and serializes into
//! a JPEG APP1 segment holding a little-endian TIFF structure:
//!
//! ```text
//! header | IFD0 | Exif IFD | GPS IFD (optional) | IFD1 + thumbnail (optional)
//! ```

use crate::error::{EncodeError, EncodeResult};
use crate::parameters::{
    CameraParameters, KEY_FOCAL_LENGTH, KEY_GPS_ALTITUDE, KEY_GPS_LATITUDE, KEY_GPS_LONGITUDE,
    KEY_GPS_PROCESSING_METHOD, KEY_GPS_TIMESTAMP, KEY_ROTATION,
};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use tracing::warn;

/// JPEG APP1 marker.
pub const APP1_MARKER: [u8; 2] = [0xFF, 0xE1];

/// Identifier that opens every EXIF APP1 payload.
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

/// Largest APP1 payload; the 16-bit length field counts itself.
const MAX_APP1_PAYLOAD: usize = u16::MAX as usize - 2;

/// Largest thumbnail accepted, leaving room for the IFDs in the segment.
pub const MAX_THUMBNAIL_BYTES: usize = 60 * 1024;

/// Longest processing method name written to the GPS IFD.
pub const MAX_PROCESSING_METHOD_BYTES: usize = 128;

const DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

// IFD0 / IFD1
const TAG_COMPRESSION: u16 = 0x0103;
const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_ORIENTATION: u16 = 0x0112;
const TAG_X_RESOLUTION: u16 = 0x011A;
const TAG_Y_RESOLUTION: u16 = 0x011B;
const TAG_RESOLUTION_UNIT: u16 = 0x0128;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_JPEG_OFFSET: u16 = 0x0201;
const TAG_JPEG_LENGTH: u16 = 0x0202;
const TAG_YCBCR_POSITIONING: u16 = 0x0213;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;

// Exif IFD
const TAG_EXIF_VERSION: u16 = 0x9000;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;
const TAG_COMPONENTS_CONFIGURATION: u16 = 0x9101;
const TAG_FOCAL_LENGTH: u16 = 0x920A;
const TAG_FLASHPIX_VERSION: u16 = 0xA000;
const TAG_COLOR_SPACE: u16 = 0xA001;
const TAG_PIXEL_X_DIMENSION: u16 = 0xA002;
const TAG_PIXEL_Y_DIMENSION: u16 = 0xA003;

// GPS IFD
const TAG_GPS_VERSION_ID: u16 = 0x0000;
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;
const TAG_GPS_ALTITUDE_REF: u16 = 0x0005;
const TAG_GPS_ALTITUDE: u16 = 0x0006;
const TAG_GPS_TIME_STAMP: u16 = 0x0007;
const TAG_GPS_PROCESSING_METHOD: u16 = 0x001B;
const TAG_GPS_DATE_STAMP: u16 = 0x001D;

/// GPS fix attached to a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsInfo {
    /// Latitude in decimal degrees, positive north.
    pub latitude: f64,
    /// Longitude in decimal degrees, positive east.
    pub longitude: f64,
    /// Altitude in meters above sea level.
    pub altitude: Option<f64>,
    /// Fix time in seconds since the UNIX epoch.
    pub timestamp: Option<i64>,
    /// Name of the positioning method (e.g. "GPS", "NETWORK").
    pub processing_method: Option<String>,
}

impl GpsInfo {
    fn from_parameters(params: &CameraParameters) -> Option<Self> {
        let latitude = params.get_float(KEY_GPS_LATITUDE)?;
        let longitude = params.get_float(KEY_GPS_LONGITUDE)?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            warn!(latitude, longitude, "Ignoring out of range GPS coordinates");
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            altitude: params.get_float(KEY_GPS_ALTITUDE).filter(|alt| alt.is_finite()),
            timestamp: params
                .get(KEY_GPS_TIMESTAMP)
                .and_then(|ts| ts.trim().parse().ok()),
            processing_method: params
                .get(KEY_GPS_PROCESSING_METHOD)
                .map(str::to_owned),
        })
    }
}

/// EXIF metadata for one still capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ExifData {
    /// Camera manufacturer.
    pub make: String,
    /// Camera model.
    pub model: String,
    /// Software that produced the image.
    pub software: String,
    /// Local capture time.
    pub date_time: NaiveDateTime,
    /// TIFF orientation code (1, 3, 6 or 8).
    pub orientation: u16,
    /// Lens focal length in millimeters.
    pub focal_length: Option<f64>,
    /// Pixel dimensions of the primary image.
    pub image_size: Option<(u32, u32)>,
    /// GPS fix, present when both coordinates are configured.
    pub gps: Option<GpsInfo>,
    thumbnail: Option<Vec<u8>>,
}

impl ExifData {
    /// Build EXIF data from camera parameters, stamped with the current local time.
    #[must_use]
    pub fn from_parameters(params: &CameraParameters) -> Self {
        Self::from_parameters_at(params, Local::now().naive_local())
    }

    /// Build EXIF data from camera parameters with an explicit capture time.
    #[must_use]
    pub fn from_parameters_at(params: &CameraParameters, date_time: NaiveDateTime) -> Self {
        let orientation = match params.get_int(KEY_ROTATION) {
            Some(90) => 6,
            Some(180) => 3,
            Some(270) => 8,
            _ => 1,
        };
        Self {
            make: "Virtual".to_owned(),
            model: "Virtual Camera".to_owned(),
            software: concat!("camera-notifier ", env!("CARGO_PKG_VERSION")).to_owned(),
            date_time,
            orientation,
            focal_length: params
                .get_float(KEY_FOCAL_LENGTH)
                .filter(|f| f.is_finite() && *f > 0.0),
            image_size: None,
            gps: GpsInfo::from_parameters(params),
            thumbnail: None,
        }
    }

    /// Take ownership of a JPEG thumbnail to embed in IFD1.
    pub fn set_thumbnail(&mut self, jpeg: Vec<u8>) -> EncodeResult<()> {
        if jpeg.len() > MAX_THUMBNAIL_BYTES {
            return Err(EncodeError::ExifTooLarge(jpeg.len()));
        }
        self.thumbnail = Some(jpeg);
        Ok(())
    }

    /// The embedded thumbnail, if any.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    /// Serialize into a complete APP1 segment, marker and length included.
    pub fn to_app1(&self) -> EncodeResult<Vec<u8>> {
        let tiff = self.to_tiff()?;
        let payload_len = EXIF_HEADER.len() + tiff.len();
        if payload_len > MAX_APP1_PAYLOAD {
            return Err(EncodeError::ExifTooLarge(payload_len));
        }
        let length = u16::try_from(payload_len + 2)
            .map_err(|_| EncodeError::ExifTooLarge(payload_len))?;

        let mut segment = Vec::with_capacity(payload_len + 4);
        segment.extend_from_slice(&APP1_MARKER);
        segment.extend_from_slice(&length.to_be_bytes());
        segment.extend_from_slice(EXIF_HEADER);
        segment.extend_from_slice(&tiff);
        Ok(segment)
    }

    fn to_tiff(&self) -> EncodeResult<Vec<u8>> {
        let has_gps = self.gps.is_some();
        let exif_ifd = self.exif_entries();
        let gps_ifd = self.gps.as_ref().map(gps_entries);

        // IFD sizes do not depend on the pointer values, so measure first.
        let ifd0_offset = 8;
        let exif_offset = ifd0_offset + ifd_len(&self.ifd0_entries(0, has_gps.then_some(0)));
        let gps_offset = exif_offset + ifd_len(&exif_ifd);
        let ifd1_offset = gps_offset + gps_ifd.as_deref().map_or(0, ifd_len);
        let thumbnail_offset = ifd1_offset
            + self
                .thumbnail
                .as_ref()
                .map_or(0, |_| ifd_len(&thumbnail_entries(0, 0)));

        let thumbnail_len = self.thumbnail.as_ref().map_or(0, Vec::len);
        let mut tiff = Vec::with_capacity(thumbnail_offset + thumbnail_len);
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&offset32(ifd0_offset)?.to_le_bytes());

        let gps_pointer = if has_gps {
            Some(offset32(gps_offset)?)
        } else {
            None
        };
        let next_ifd = if self.thumbnail.is_some() {
            offset32(ifd1_offset)?
        } else {
            0
        };
        write_ifd(
            &mut tiff,
            &self.ifd0_entries(offset32(exif_offset)?, gps_pointer),
            next_ifd,
        )?;
        write_ifd(&mut tiff, &exif_ifd, 0)?;
        if let Some(gps_ifd) = &gps_ifd {
            write_ifd(&mut tiff, gps_ifd, 0)?;
        }
        if let Some(thumbnail) = &self.thumbnail {
            let length = offset32(thumbnail.len())?;
            write_ifd(
                &mut tiff,
                &thumbnail_entries(offset32(thumbnail_offset)?, length),
                0,
            )?;
            tiff.extend_from_slice(thumbnail);
        }
        Ok(tiff)
    }

    fn ifd0_entries(&self, exif_pointer: u32, gps_pointer: Option<u32>) -> Vec<Entry> {
        let mut entries = vec![
            Entry::new(TAG_MAKE, Value::Ascii(self.make.clone())),
            Entry::new(TAG_MODEL, Value::Ascii(self.model.clone())),
            Entry::new(TAG_ORIENTATION, Value::Short(self.orientation)),
            Entry::new(TAG_X_RESOLUTION, Value::Rational(vec![(72, 1)])),
            Entry::new(TAG_Y_RESOLUTION, Value::Rational(vec![(72, 1)])),
            Entry::new(TAG_RESOLUTION_UNIT, Value::Short(2)),
            Entry::new(TAG_SOFTWARE, Value::Ascii(self.software.clone())),
            Entry::new(TAG_DATE_TIME, Value::Ascii(self.date_time_string())),
            Entry::new(TAG_YCBCR_POSITIONING, Value::Short(1)),
            Entry::new(TAG_EXIF_IFD, Value::Long(exif_pointer)),
        ];
        if let Some(pointer) = gps_pointer {
            entries.push(Entry::new(TAG_GPS_IFD, Value::Long(pointer)));
        }
        entries
    }

    fn exif_entries(&self) -> Vec<Entry> {
        let mut entries = vec![
            Entry::new(TAG_EXIF_VERSION, Value::Undefined(b"0220".to_vec())),
            Entry::new(TAG_DATE_TIME_ORIGINAL, Value::Ascii(self.date_time_string())),
            Entry::new(TAG_DATE_TIME_DIGITIZED, Value::Ascii(self.date_time_string())),
            Entry::new(TAG_COMPONENTS_CONFIGURATION, Value::Undefined(vec![1, 2, 3, 0])),
        ];
        if let Some(focal_length) = self.focal_length {
            entries.push(Entry::new(
                TAG_FOCAL_LENGTH,
                Value::Rational(vec![(hundredths(focal_length), 100)]),
            ));
        }
        entries.push(Entry::new(TAG_FLASHPIX_VERSION, Value::Undefined(b"0100".to_vec())));
        entries.push(Entry::new(TAG_COLOR_SPACE, Value::Short(1)));
        if let Some((width, height)) = self.image_size {
            entries.push(Entry::new(TAG_PIXEL_X_DIMENSION, Value::Long(width)));
            entries.push(Entry::new(TAG_PIXEL_Y_DIMENSION, Value::Long(height)));
        }
        entries
    }

    fn date_time_string(&self) -> String {
        self.date_time.format(DATE_TIME_FORMAT).to_string()
    }
}

fn gps_entries(gps: &GpsInfo) -> Vec<Entry> {
    let lat_ref = if gps.latitude < 0.0 { "S" } else { "N" };
    let lon_ref = if gps.longitude < 0.0 { "W" } else { "E" };
    let mut entries = vec![
        Entry::new(TAG_GPS_VERSION_ID, Value::Byte(vec![2, 2, 0, 0])),
        Entry::new(TAG_GPS_LATITUDE_REF, Value::Ascii(lat_ref.to_owned())),
        Entry::new(TAG_GPS_LATITUDE, Value::Rational(to_dms(gps.latitude))),
        Entry::new(TAG_GPS_LONGITUDE_REF, Value::Ascii(lon_ref.to_owned())),
        Entry::new(TAG_GPS_LONGITUDE, Value::Rational(to_dms(gps.longitude))),
    ];
    if let Some(altitude) = gps.altitude {
        let below_sea_level = u8::from(altitude < 0.0);
        entries.push(Entry::new(TAG_GPS_ALTITUDE_REF, Value::Byte(vec![below_sea_level])));
        entries.push(Entry::new(
            TAG_GPS_ALTITUDE,
            Value::Rational(vec![(hundredths(altitude), 100)]),
        ));
    }
    let fix_time = gps
        .timestamp
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    if let Some(fix_time) = fix_time {
        entries.push(Entry::new(
            TAG_GPS_TIME_STAMP,
            Value::Rational(vec![
                (fix_time.hour(), 1),
                (fix_time.minute(), 1),
                (fix_time.second(), 1),
            ]),
        ));
    }
    if let Some(method) = &gps.processing_method {
        let mut bytes = b"ASCII\0\0\0".to_vec();
        bytes.extend_from_slice(truncate_utf8(method, MAX_PROCESSING_METHOD_BYTES).as_bytes());
        entries.push(Entry::new(TAG_GPS_PROCESSING_METHOD, Value::Undefined(bytes)));
    }
    if let Some(fix_time) = fix_time {
        entries.push(Entry::new(
            TAG_GPS_DATE_STAMP,
            Value::Ascii(fix_time.format("%Y:%m:%d").to_string()),
        ));
    }
    entries
}

fn thumbnail_entries(offset: u32, length: u32) -> Vec<Entry> {
    vec![
        Entry::new(TAG_COMPRESSION, Value::Short(6)),
        Entry::new(TAG_X_RESOLUTION, Value::Rational(vec![(72, 1)])),
        Entry::new(TAG_Y_RESOLUTION, Value::Rational(vec![(72, 1)])),
        Entry::new(TAG_RESOLUTION_UNIT, Value::Short(2)),
        Entry::new(TAG_JPEG_OFFSET, Value::Long(offset)),
        Entry::new(TAG_JPEG_LENGTH, Value::Long(length)),
    ]
}

/// Degrees, minutes and seconds (in thousandths) of an absolute coordinate.
///
/// Rounds once on the whole value so seconds never reach 60.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn to_dms(value: f64) -> Vec<(u32, u32)> {
    const MILLIS_PER_MINUTE: u64 = 60 * 1000;
    const MILLIS_PER_DEGREE: u64 = 60 * MILLIS_PER_MINUTE;
    let total = (value.abs() * MILLIS_PER_DEGREE as f64).round() as u64;
    vec![
        ((total / MILLIS_PER_DEGREE) as u32, 1),
        ((total / MILLIS_PER_MINUTE % 60) as u32, 1),
        ((total % MILLIS_PER_MINUTE) as u32, 1000),
    ]
}

/// Longest prefix of `text` within `max` bytes that ends on a char boundary.
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() > max {
        warn!(len = text.len(), max, "Truncating GPS processing method");
    }
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hundredths(value: f64) -> u32 {
    (value.abs() * 100.0).round() as u32
}

fn offset32(offset: usize) -> EncodeResult<u32> {
    u32::try_from(offset).map_err(|_| EncodeError::ExifTooLarge(offset))
}

/// A TIFF field value.
#[derive(Debug, Clone)]
enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(u16),
    Long(u32),
    Rational(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
}

impl Value {
    const fn type_code(&self) -> u16 {
        match self {
            Self::Byte(_) => 1,
            Self::Ascii(_) => 2,
            Self::Short(_) => 3,
            Self::Long(_) => 4,
            Self::Rational(_) => 5,
            Self::Undefined(_) => 7,
        }
    }

    fn count(&self) -> usize {
        match self {
            Self::Byte(bytes) | Self::Undefined(bytes) => bytes.len(),
            Self::Ascii(text) => text.len() + 1,
            Self::Short(_) | Self::Long(_) => 1,
            Self::Rational(values) => values.len(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Byte(bytes) | Self::Undefined(bytes) => bytes.clone(),
            Self::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            Self::Short(value) => value.to_le_bytes().to_vec(),
            Self::Long(value) => value.to_le_bytes().to_vec(),
            Self::Rational(values) => values
                .iter()
                .flat_map(|(num, den)| num.to_le_bytes().into_iter().chain(den.to_le_bytes()))
                .collect(),
        }
    }

    /// Bytes stored outside the entry, padded to a word boundary.
    fn external_len(&self) -> usize {
        let len = self.to_bytes().len();
        if len > 4 {
            len + len % 2
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    value: Value,
}

impl Entry {
    const fn new(tag: u16, value: Value) -> Self {
        Self { tag, value }
    }
}

/// Serialized size of an IFD including its out-of-line values.
fn ifd_len(entries: &[Entry]) -> usize {
    2 + entries.len() * 12 + 4 + entries.iter().map(|e| e.value.external_len()).sum::<usize>()
}

/// Append an IFD at the end of `out`. Offsets are relative to the start of
/// `out`, which must begin with the TIFF header.
fn write_ifd(out: &mut Vec<u8>, entries: &[Entry], next_ifd: u32) -> EncodeResult<()> {
    let entry_count =
        u16::try_from(entries.len()).map_err(|_| EncodeError::ExifTooLarge(entries.len()))?;
    let data_start = out.len() + 2 + entries.len() * 12 + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&entry_count.to_le_bytes());
    for entry in entries {
        let bytes = entry.value.to_bytes();
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.value.type_code().to_le_bytes());
        out.extend_from_slice(&offset32(entry.value.count())?.to_le_bytes());
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            for (slot, byte) in inline.iter_mut().zip(&bytes) {
                *slot = *byte;
            }
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&offset32(data_start + data.len())?.to_le_bytes());
            data.extend_from_slice(&bytes);
            if bytes.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    out.extend_from_slice(&next_ifd.to_le_bytes());
    out.extend_from_slice(&data);
    Ok(())
}
