/**
 * File naming module
 *
 * Stamp format: YYYYMMDD_HHMMSS
 */

use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Date-time string found inside an existing file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampMatch {
    /// Everything before the stamp
    pub prefix: String,
    pub stamp: String,
}

impl StampMatch {
    pub fn at_start(&self) -> bool {
        self.prefix.is_empty()
    }
}

pub struct FilenameGenerator {
    verify_re: Regex,
    search_re: Regex,
}

impl FilenameGenerator {
    pub fn new() -> Self {
        Self {
            verify_re: Regex::new(r"^\d{8}_\d{6}$").expect("stamp pattern compiles"),
            // greedy prefix: the last stamp in the name wins
            search_re: Regex::new(r"^(.*)(\d{8}_\d{6}).*").expect("stamp search pattern compiles"),
        }
    }

    pub fn format_stamp(&self, dt: &NaiveDateTime) -> String {
        dt.format(STAMP_FORMAT).to_string()
    }

    pub fn is_valid_stamp(&self, stamp: &str) -> bool {
        self.verify_re.is_match(stamp)
    }

    /// Look for a date-time string already present in `file_name`
    pub fn find_stamp(&self, file_name: &str) -> Option<StampMatch> {
        self.search_re.captures(file_name).map(|caps| StampMatch {
            prefix: caps[1].to_string(),
            stamp: caps[2].to_string(),
        })
    }

    /// Build the new file name for `file_name`
    ///
    /// - `erase`: stamp plus the original extension
    /// - otherwise: stamp + `_` + original name, unless the name already starts with the stamp
    pub fn new_file_name(&self, file_name: &str, stamp: &str, erase: bool) -> String {
        if erase {
            match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
                Some(ext) => format!("{}.{}", stamp, ext),
                None => stamp.to_string(),
            }
        } else if file_name.starts_with(stamp) {
            file_name.to_string()
        } else {
            format!("{}_{}", stamp, file_name)
        }
    }
}

impl Default for FilenameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
