/**
 * EXIF processing module for JPEG images
 *
 * Only the original capture time is of interest:
 * 1. JPEG header check (JFIF/Exif marker or raw SOI + DQT)
 * 2. kamadak-exif for the `DateTimeOriginal` tag
 */

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use exif::{In, Reader as ExifReader, Tag};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct ExifProcessor;

impl ExifProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Check the first bytes of a file for a JPEG signature
    ///
    /// Accepts a `JFIF` or `Exif` marker at offset 6, or a bare
    /// SOI followed by a quantization table (`FF D8 FF DB`).
    pub fn is_jpeg(&self, file_path: &Path) -> Result<bool> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open image: {}", file_path.display()))?;

        let mut head = Vec::with_capacity(32);
        file.take(32)
            .read_to_end(&mut head)
            .context("Failed to read image header")?;

        Ok(is_jpeg_header(&head))
    }

    /// Read the `DateTimeOriginal` tag
    ///
    /// Returns `Ok(None)` when the image carries no EXIF block or the tag is missing.
    pub fn read_date_time_original(&self, file_path: &Path) -> Result<Option<NaiveDateTime>> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open image: {}", file_path.display()))?;
        let mut bufreader = BufReader::new(&file);

        let exif = match ExifReader::new().read_from_container(&mut bufreader) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => {
                debug!("No EXIF data in {}", file_path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).context("Failed to read EXIF data with kamadak-exif");
            }
        };

        let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
            return Ok(None);
        };

        let value = field.display_value().to_string();
        debug!("DateTimeOriginal for {}: {}", file_path.display(), value);

        parse_exif_timestamp(&value).map(Some)
    }
}

impl Default for ExifProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_jpeg_header(head: &[u8]) -> bool {
    let marker = head.get(6..10);
    marker == Some(b"JFIF".as_slice())
        || marker == Some(b"Exif".as_slice())
        || head.starts_with(&[0xFF, 0xD8, 0xFF, 0xDB])
}

/// Parse `2017:01:12 20:34:21` (raw EXIF) or `2017-01-12 20:34:21`
/// (kamadak-exif display form). Sub-seconds and quotes are dropped.
pub fn parse_exif_timestamp(timestamp_str: &str) -> Result<NaiveDateTime> {
    let timestamp_str = timestamp_str.trim().trim_matches('"');
    let main_part = timestamp_str.split('.').next().unwrap_or(timestamp_str);

    if main_part.contains('-') {
        NaiveDateTime::parse_from_str(main_part, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("Failed to parse ISO timestamp: {}", timestamp_str))
    } else {
        NaiveDateTime::parse_from_str(main_part, "%Y:%m:%d %H:%M:%S")
            .with_context(|| format!("Failed to parse EXIF timestamp: {}", timestamp_str))
    }
}
