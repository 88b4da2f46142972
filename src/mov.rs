/**
 * MOV/MP4 atom walker
 *
 * Reads the creation and modification timestamps from the movie header
 * (`moov` -> `mvhd`) of a QuickTime/ISO-BMFF container. Only atom headers
 * and the first 12 bytes of the `mvhd` body are read; every other atom body
 * is skipped by seeking, so `mdat` payloads never reach memory.
 */

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use log::{debug, trace};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Size of the `size` + `tag` atom header.
pub const ATOM_HEADER_SIZE: u64 = 8;

/// Seconds between the QuickTime epoch (1904-01-01) and the Unix epoch (1970-01-01).
pub const QUICKTIME_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Timestamps converting to a year before this are treated as absent.
/// Zeroed or scrubbed `mvhd` fields land in 1904 or 1970.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1990;

/// version/flags (4) + creation (4) + modification (4)
const MVHD_TIMESTAMPS_LEN: u64 = 12;

const MOOV: [u8; 4] = *b"moov";
const MVHD: [u8; 4] = *b"mvhd";
const CMOV: [u8; 4] = *b"cmov";

#[derive(Debug, Error)]
pub enum MovError {
    #[error("container structure error: {0}")]
    ContainerStructure(String),

    #[error("compressed movie header (cmov) is not supported")]
    CompressedContainer,

    #[error("truncated atom: {field} needs {wanted} bytes, got {got}")]
    TruncatedAtom {
        field: &'static str,
        wanted: u64,
        got: u64,
    },

    #[error("I/O error while reading container: {0}")]
    Io(#[from] io::Error),
}

pub type MovResult<T> = Result<T, MovError>;

/// Fixed 8-byte atom header found at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    pub offset: u64,
    pub size: u32,
    pub tag: [u8; 4],
}

impl AtomHeader {
    pub fn is(&self, tag: &[u8; 4]) -> bool {
        &self.tag == tag
    }

    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    /// Length of the atom body, excluding the header.
    pub fn body_size(&self) -> u64 {
        u64::from(self.size) - ATOM_HEADER_SIZE
    }

    /// Offset of the first byte after this atom.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

/// Calendar in which converted timestamps are expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeBasis {
    #[default]
    Local,
    Utc,
}

impl TimeBasis {
    /// Wall-clock date-time for a Unix timestamp in this basis.
    pub fn to_calendar(self, unix_seconds: i64) -> Option<NaiveDateTime> {
        match self {
            TimeBasis::Local => Local
                .timestamp_opt(unix_seconds, 0)
                .earliest()
                .map(|dt| dt.naive_local()),
            TimeBasis::Utc => DateTime::<Utc>::from_timestamp(unix_seconds, 0).map(|dt| dt.naive_utc()),
        }
    }
}

/// How `mvhd` is located among the children of `moov`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildLookup {
    /// `mvhd` must be the first child of `moov`.
    #[default]
    FirstChild,
    /// Skip siblings inside `moov` until `mvhd` (or `cmov`) shows up.
    ByTag,
}

#[derive(Debug, Clone)]
pub struct MovReaderConfig {
    pub min_plausible_year: i32,
    pub time_basis: TimeBasis,
    pub child_lookup: ChildLookup,
    /// Give up the top-level scan once the cursor passes this offset.
    pub max_scan_bytes: Option<u64>,
}

impl Default for MovReaderConfig {
    fn default() -> Self {
        Self {
            min_plausible_year: MIN_PLAUSIBLE_YEAR,
            time_basis: TimeBasis::default(),
            child_lookup: ChildLookup::default(),
            max_scan_bytes: None,
        }
    }
}

/// Creation and modification times from `mvhd`, each absent when implausible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeaderTimestamps {
    pub creation_time: Option<NaiveDateTime>,
    pub modification_time: Option<NaiveDateTime>,
}

/// Convert a raw QuickTime-epoch value to Unix seconds.
pub fn quicktime_to_unix(raw: u32) -> i64 {
    i64::from(raw) - QUICKTIME_EPOCH_OFFSET
}

/// Read position over a seekable stream. Every fixed-size read goes through
/// `read_exact_or_truncated`, so short reads surface in one place.
pub struct AtomCursor<'a, R> {
    reader: &'a mut R,
    offset: u64,
}

impl<'a, R: Read + Seek> AtomCursor<'a, R> {
    pub fn new(reader: &'a mut R) -> MovResult<Self> {
        let offset = reader.stream_position()?;
        Ok(Self { reader, offset })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fill `buf` completely or fail with `TruncatedAtom`.
    pub fn read_exact_or_truncated(&mut self, buf: &mut [u8], field: &'static str) -> MovResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.offset += filled as u64;

        if filled < buf.len() {
            return Err(MovError::TruncatedAtom {
                field,
                wanted: buf.len() as u64,
                got: filled as u64,
            });
        }
        Ok(())
    }

    pub fn read_u32_be(&mut self, field: &'static str) -> MovResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_or_truncated(&mut buf, field)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read the next atom header. Sizes below 8 (including the 0 and 1
    /// extended-size markers) are rejected.
    pub fn read_header(&mut self) -> MovResult<AtomHeader> {
        let offset = self.offset;
        let mut buf = [0u8; ATOM_HEADER_SIZE as usize];
        self.read_exact_or_truncated(&mut buf, "atom header")?;

        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let header = AtomHeader {
            offset,
            size,
            tag: [buf[4], buf[5], buf[6], buf[7]],
        };

        if u64::from(size) < ATOM_HEADER_SIZE {
            return Err(MovError::ContainerStructure(format!(
                "unsupported size {} for atom '{}' at offset {}",
                size,
                header.tag_str(),
                offset
            )));
        }

        trace!("atom '{}' size {} @ {}", header.tag_str(), size, offset);
        Ok(header)
    }

    /// Move forward without reading. Seeking past the end is allowed; the
    /// next read then comes back short.
    pub fn skip(&mut self, len: u64) -> MovResult<()> {
        let delta = i64::try_from(len)
            .map_err(|_| MovError::ContainerStructure(format!("cannot skip {} bytes", len)))?;
        self.reader.seek(SeekFrom::Current(delta))?;
        self.offset += len;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MovAtomReader {
    config: MovReaderConfig,
}

impl MovAtomReader {
    pub fn new(config: MovReaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MovReaderConfig {
        &self.config
    }

    /// Open `path` and read its movie header timestamps. The file is closed
    /// when this returns, on success or error.
    pub fn read_file_timestamps(&self, path: &Path) -> MovResult<MovieHeaderTimestamps> {
        let mut reader = BufReader::new(File::open(path)?);
        self.read_creation_timestamps(&mut reader)
    }

    /// Walk the atoms of `stream` up to `moov/mvhd` and decode its timestamps.
    ///
    /// The stream is only advanced, never closed.
    pub fn read_creation_timestamps<R: Read + Seek>(&self, stream: &mut R) -> MovResult<MovieHeaderTimestamps> {
        let mut cursor = AtomCursor::new(stream)?;

        let moov = self.find_moov(&mut cursor)?;
        debug!("found moov ({} bytes) at offset {}", moov.size, moov.offset);

        let mvhd = self.find_mvhd(&mut cursor, &moov)?;
        if mvhd.body_size() < MVHD_TIMESTAMPS_LEN {
            return Err(MovError::TruncatedAtom {
                field: "mvhd body",
                wanted: MVHD_TIMESTAMPS_LEN,
                got: mvhd.body_size(),
            });
        }

        let version_flags = cursor.read_u32_be("mvhd version/flags")?;
        if version_flags >> 24 != 0 {
            debug!("mvhd version {} read with the 32-bit layout", version_flags >> 24);
        }
        let raw_creation = cursor.read_u32_be("mvhd creation time")?;
        let raw_modification = cursor.read_u32_be("mvhd modification time")?;
        debug!("mvhd raw creation {} modification {}", raw_creation, raw_modification);

        Ok(MovieHeaderTimestamps {
            creation_time: self.to_plausible_date_time(raw_creation),
            modification_time: self.to_plausible_date_time(raw_modification),
        })
    }

    /// Calendar date-time for a raw QuickTime value, or `None` before the
    /// plausibility year.
    pub fn to_plausible_date_time(&self, raw: u32) -> Option<NaiveDateTime> {
        self.config
            .time_basis
            .to_calendar(quicktime_to_unix(raw))
            .filter(|dt| dt.year() >= self.config.min_plausible_year)
    }

    fn find_moov<R: Read + Seek>(&self, cursor: &mut AtomCursor<'_, R>) -> MovResult<AtomHeader> {
        loop {
            if let Some(limit) = self.config.max_scan_bytes {
                if cursor.offset() > limit {
                    return Err(MovError::ContainerStructure(format!(
                        "moov atom not found within {} bytes",
                        limit
                    )));
                }
            }

            let header = match cursor.read_header() {
                Ok(header) => header,
                Err(MovError::TruncatedAtom { .. }) => {
                    return Err(MovError::ContainerStructure("moov atom not found".to_string()));
                }
                Err(e) => return Err(e),
            };

            if header.is(&MOOV) {
                return Ok(header);
            }
            cursor.skip(header.body_size())?;
        }
    }

    fn find_mvhd<R: Read + Seek>(
        &self,
        cursor: &mut AtomCursor<'_, R>,
        moov: &AtomHeader,
    ) -> MovResult<AtomHeader> {
        match self.config.child_lookup {
            ChildLookup::FirstChild => {
                let child = cursor.read_header()?;
                check_movie_header(&child)?;
                Ok(child)
            }
            ChildLookup::ByTag => {
                while cursor.offset() + ATOM_HEADER_SIZE <= moov.end() {
                    let child = cursor.read_header()?;
                    if child.is(&MVHD) || child.is(&CMOV) {
                        check_movie_header(&child)?;
                        return Ok(child);
                    }
                    debug!("skipping moov child '{}'", child.tag_str());
                    cursor.skip(child.body_size())?;
                }
                Err(MovError::ContainerStructure("expected mvhd header".to_string()))
            }
        }
    }
}

fn check_movie_header(child: &AtomHeader) -> MovResult<()> {
    if child.is(&CMOV) {
        Err(MovError::CompressedContainer)
    } else if !child.is(&MVHD) {
        Err(MovError::ContainerStructure(format!(
            "expected mvhd header, found '{}'",
            child.tag_str()
        )))
    } else {
        Ok(())
    }
}

/// Read timestamps with the default configuration.
pub fn read_creation_timestamps<R: Read + Seek>(stream: &mut R) -> MovResult<MovieHeaderTimestamps> {
    MovAtomReader::default().read_creation_timestamps(stream)
}
