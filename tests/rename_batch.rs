use mediastamp::{
    BatchStats, FileOutcome, FileProcessor, MovError, MovReaderConfig, RenameOptions, TimeBasis,
};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const VIDEO_STAMP: &str = "20180128_160000";
const IMAGE_STAMP: &str = "20170112_203421";

fn atom(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((8 + body.len()) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(body);
    out
}

/// ftyp + mdat + moov(mvhd) with 2018-01-28 16:00:00 UTC as creation time
fn movie_bytes() -> Vec<u8> {
    let mut mvhd = vec![0u8; 4];
    mvhd.extend_from_slice(&3_600_000_000u32.to_be_bytes());
    mvhd.extend_from_slice(&3_600_000_000u32.to_be_bytes());
    mvhd.extend_from_slice(&[0u8; 88]);

    let mut data = atom(b"ftyp", b"qt  \0\0\0\0qt  ");
    data.extend(atom(b"mdat", &[0xAB; 1024]));
    data.extend(atom(b"moov", &atom(b"mvhd", &mvhd)));
    data
}

/// Smallest JPEG kamadak-exif accepts: SOI, APP1/Exif with a DateTimeOriginal, EOI
fn jpeg_bytes() -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II*\0");
    tiff.extend_from_slice(&8u32.to_le_bytes());
    // IFD0: ExifIFDPointer -> 26
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    // Exif IFD: DateTimeOriginal, ASCII[20] at 44
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&44u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(b"2017:01:12 20:34:21\0");
    assert_eq!(tiff.len(), 64);

    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1];
    data.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    data.extend_from_slice(b"Exif\0\0");
    data.extend(tiff);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

fn options() -> RenameOptions {
    RenameOptions {
        mov: MovReaderConfig {
            time_basis: TimeBasis::Utc,
            ..MovReaderConfig::default()
        },
        workers: Some(2),
        ..RenameOptions::default()
    }
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn media_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clip.mov"), movie_bytes()).unwrap();
    fs::write(dir.path().join("IMG_0001.JPG"), jpeg_bytes()).unwrap();
    fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    dir
}

#[test]
fn prefixes_images_and_videos_with_creation_stamp() {
    let dir = media_dir();

    let report = FileProcessor::new(options()).process_directory(dir.path()).unwrap();

    assert_eq!(
        names_in(dir.path()),
        vec![
            format!("{}_IMG_0001.JPG", IMAGE_STAMP),
            format!("{}_clip.mov", VIDEO_STAMP),
            "notes.txt".to_string(),
        ]
    );
    assert_eq!(
        report.stats,
        BatchStats {
            files: 3,
            media_files: 2,
            renamed: 2,
            skipped: 1,
            errors: 0,
        }
    );
}

#[test]
fn dry_run_leaves_files_untouched() {
    let dir = media_dir();
    let before = names_in(dir.path());

    let report = FileProcessor::new(RenameOptions {
        dry_run: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();

    assert_eq!(names_in(dir.path()), before);
    assert_eq!(report.stats.renamed, 2);
    assert!(report
        .outcomes
        .iter()
        .any(|o| matches!(o, FileOutcome::WouldRename { to, .. } if to.ends_with(format!("{}_clip.mov", VIDEO_STAMP)))));
}

#[test]
fn erase_mode_keeps_only_stamp_and_extension() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("MVI_1234.MOV"), movie_bytes()).unwrap();

    FileProcessor::new(RenameOptions {
        erase: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();

    assert_eq!(names_in(dir.path()), vec![format!("{}.MOV", VIDEO_STAMP)]);
}

#[test]
fn existing_stamp_is_kept_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("20000101_000000_clip.mov");
    fs::write(&stale, movie_bytes()).unwrap();

    let report = FileProcessor::new(options()).process_directory(dir.path()).unwrap();
    assert_eq!(report.stats.renamed, 0);
    assert!(stale.exists());

    let report = FileProcessor::new(RenameOptions {
        force: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(
        names_in(dir.path()),
        vec![format!("{}_20000101_000000_clip.mov", VIDEO_STAMP)]
    );
}

#[test]
fn already_prefixed_file_is_not_renamed_again() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clip.mov"), movie_bytes()).unwrap();
    let processor = FileProcessor::new(options());

    processor.process_directory(dir.path()).unwrap();
    let report = processor.process_directory(dir.path()).unwrap();

    assert_eq!(report.stats.renamed, 0);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(names_in(dir.path()), vec![format!("{}_clip.mov", VIDEO_STAMP)]);
}

#[test]
fn collisions_are_checked_by_content() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.mov"), movie_bytes()).unwrap();
    fs::write(dir.path().join(format!("{}.mov", VIDEO_STAMP)), movie_bytes()).unwrap();
    let mut other = movie_bytes();
    other.extend(atom(b"free", b"different"));
    fs::write(dir.path().join("b.mov"), other).unwrap();

    let report = FileProcessor::new(RenameOptions {
        erase: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();

    // a.mov duplicates the existing target, b.mov differs from it
    assert!(report.outcomes.iter().any(|o| matches!(
        o,
        FileOutcome::Skipped { path, reason } if path.ends_with("a.mov") && reason.contains("identical")
    )));
    assert!(report.outcomes.iter().any(|o| matches!(
        o,
        FileOutcome::Failed { path, .. } if path.ends_with("b.mov")
    )));
    assert!(dir.path().join("a.mov").exists());
    assert!(dir.path().join("b.mov").exists());
}

fn is_identical_skip(outcome: &FileOutcome, name: &str) -> bool {
    matches!(outcome, FileOutcome::Skipped { path, reason } if path.ends_with(name) && reason.contains("identical"))
}

#[test]
fn identical_files_claiming_one_name_are_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.mov"), movie_bytes()).unwrap();
    fs::write(dir.path().join("b.mov"), movie_bytes()).unwrap();

    let report = FileProcessor::new(RenameOptions {
        erase: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();

    assert!(report.outcomes.iter().any(|o| is_identical_skip(o, "b.mov")));
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(
        names_in(dir.path()),
        vec![format!("{}.mov", VIDEO_STAMP), "b.mov".to_string()]
    );
}

#[test]
fn identical_files_claiming_one_name_in_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.mov"), movie_bytes()).unwrap();
    fs::write(dir.path().join("b.mov"), movie_bytes()).unwrap();

    let report = FileProcessor::new(RenameOptions {
        erase: true,
        dry_run: true,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();

    assert!(report.outcomes.iter().any(|o| is_identical_skip(o, "b.mov")));
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(report.stats.errors, 0);
}

#[test]
fn different_files_claiming_one_name_fail() {
    for dry_run in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mov"), movie_bytes()).unwrap();
        let mut other = movie_bytes();
        other.extend(atom(b"free", b"different"));
        fs::write(dir.path().join("b.mov"), other).unwrap();

        let report = FileProcessor::new(RenameOptions {
            erase: true,
            dry_run,
            ..options()
        })
        .process_directory(dir.path())
        .unwrap();

        assert_eq!(report.stats.renamed, 1, "dry_run = {}", dry_run);
        assert!(report.outcomes.iter().any(|o| matches!(
            o,
            FileOutcome::Failed { path, error } if path.ends_with("b.mov") && error.contains("in this batch")
        )));
        assert!(dir.path().join("b.mov").exists());
    }
}

#[test]
fn broken_videos_do_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a_broken.mp4"), atom(b"ftyp", b"isom")).unwrap();
    fs::write(dir.path().join("b_compressed.mov"), atom(b"moov", &atom(b"cmov", &[0u8; 16]))).unwrap();
    fs::write(dir.path().join("c_good.mov"), movie_bytes()).unwrap();

    let report = FileProcessor::new(options()).process_directory(dir.path()).unwrap();

    assert_eq!(report.stats.errors, 2);
    assert_eq!(report.stats.renamed, 1);
    assert!(dir.path().join(format!("{}_c_good.mov", VIDEO_STAMP)).exists());
}

#[test]
fn depth_limits_recursion() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("2018").join("january");
    fs::create_dir_all(&nested).unwrap();
    fs::write(dir.path().join("2018").join("top.mov"), movie_bytes()).unwrap();
    fs::write(nested.join("deep.mov"), movie_bytes()).unwrap();

    let report = FileProcessor::new(options()).process_directory(dir.path()).unwrap();
    assert_eq!(report.stats.files, 0);

    let report = FileProcessor::new(RenameOptions {
        max_depth: 1,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();
    assert_eq!(report.stats.files, 1);
    assert!(nested.join("deep.mov").exists());

    let report = FileProcessor::new(RenameOptions {
        max_depth: 2,
        ..options()
    })
    .process_directory(dir.path())
    .unwrap();
    assert_eq!(report.stats.renamed, 1);
    assert!(nested.join(format!("{}_deep.mov", VIDEO_STAMP)).exists());
}

#[test]
fn rejects_a_file_as_working_directory() {
    let dir = media_dir();
    let result = FileProcessor::new(options()).process_directory(&dir.path().join("clip.mov"));
    assert!(result.is_err());
}

#[test]
fn public_reader_reports_typed_errors() {
    let mut stream = Cursor::new(atom(b"moov", &atom(b"cmov", &[])));
    let err = mediastamp::read_creation_timestamps(&mut stream).unwrap_err();
    assert!(matches!(err, MovError::CompressedContainer));
}
