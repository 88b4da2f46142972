pub mod exif;
pub mod file_ops;
pub mod hashing;
pub mod media;
pub mod mov;
pub mod naming;

pub use file_ops::{BatchReport, BatchStats, FileOutcome, FileProcessor, RenameOptions};
pub use mov::{
    read_creation_timestamps, ChildLookup, MovAtomReader, MovError, MovReaderConfig, MovieHeaderTimestamps,
    TimeBasis,
};
