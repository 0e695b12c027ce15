use anyhow::bail;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use crossbeam_channel::Sender;
use exif::{In, Tag, Value};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use walkdir::WalkDir;

use crate::{MediaAsset, TakenAt};

pub const DEFAULT_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif", "avif", "heic", "heif",
];

/// Result of one fetch against the media index. `fetched_at` is captured once
/// per fetch and is the substitution timestamp for every `TakenAt::Unknown`
/// asset of this fetch.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub assets: Vec<MediaAsset>,
    pub fetched_at: DateTime<Utc>,
}

pub fn is_image_ext(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let e = ext.to_lowercase();
            extensions.iter().any(|x| x == &e)
        })
        .unwrap_or(false)
}

// --- EXIF Helpers ---

pub fn read_exif_data(path: &Path) -> Option<exif::Exif> {
    let file = fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

/// Get orientation from EXIF (returns 1 if not found or invalid)
pub fn get_orientation(exif_data: &exif::Exif) -> u8 {
    if let Some(field) = exif_data.get_field(Tag::Orientation, In::PRIMARY)
        && let Some(v @ 1..=8) = field.value.get_uint(0)
    {
        return v as u8;
    }
    1
}

/// Capture timestamp from EXIF. `DateTimeOriginal` wins, `DateTimeDigitized`
/// is the fallback tag; anything else is `Unknown`.
pub fn get_taken_at(exif_data: &exif::Exif) -> TakenAt {
    for tag in [Tag::DateTimeOriginal, Tag::DateTimeDigitized] {
        if let Some(field) = exif_data.get_field(tag, In::PRIMARY)
            && let Value::Ascii(ref vec) = field.value
            && let Some(bytes) = vec.first()
            && let Some(ts) = datetime_from_exif_ascii(bytes)
        {
            return TakenAt::Known(ts);
        }
    }
    TakenAt::Unknown
}

/// Parse an EXIF "YYYY:MM:DD HH:MM:SS" ASCII value. EXIF datetimes carry no
/// zone; the camera's wall-clock time is kept naive so the recorded capture
/// date survives any viewer timezone.
fn datetime_from_exif_ascii(bytes: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(bytes).ok()?;
    let date = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?;
    let time = NaiveTime::from_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    Some(NaiveDateTime::new(date, time))
}

// --- Enumeration ---

/// Walk the given roots and collect every image file, deduplicated via
/// canonical paths. A root that is neither a readable file nor a directory is
/// a fetch failure, not a silent skip.
fn collect_media_paths(paths: &[String], extensions: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen_paths = HashSet::new();
    let mut all_files = Vec::new();

    for path_str in paths {
        let path = Path::new(path_str);
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if entry.path().is_file()
                    && is_image_ext(entry.path(), extensions)
                    && let Ok(canonical) = entry.path().canonicalize()
                    && seen_paths.insert(canonical.clone())
                {
                    all_files.push(canonical);
                }
            }
        } else if path.is_file() {
            if is_image_ext(path, extensions)
                && let Ok(canonical) = path.canonicalize()
                && seen_paths.insert(canonical.clone())
            {
                all_files.push(canonical);
            }
        } else {
            bail!("cannot read {}: no such file or directory", path.display());
        }
    }

    // Natural filename order so numbered bursts stay together
    all_files.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(all_files)
}

// --- Fetch ---

/// Enumerates every image under `paths` and reads its capture timestamp and
/// orientation. Blocking I/O; callers run this on a background thread.
///
/// Progress is reported as `(done, total)` over `progress_tx`; partial
/// results are streamed in batches over `batch_tx` so a UI can fill in while
/// the scan runs. Files that vanish mid-scan are skipped.
pub fn scan_media(
    paths: &[String],
    extensions: &[String],
    progress_tx: Option<Sender<(usize, usize)>>,
    batch_tx: Option<Sender<Vec<MediaAsset>>>,
) -> anyhow::Result<ScanOutcome> {
    let fetched_at = Utc::now();
    let all_files = collect_media_paths(paths, extensions)?;

    let total_files = all_files.len();
    if let Some(tx) = &progress_tx {
        let _ = tx.send((0, total_files));
    }

    let chunk_size = 100;
    let processed_count = AtomicUsize::new(0);
    let mut assets = Vec::with_capacity(total_files);

    for chunk in all_files.chunks(chunk_size) {
        let batch: Vec<MediaAsset> = chunk
            .par_iter()
            .filter_map(|path| {
                if let Some(prog_tx) = &progress_tx {
                    let current = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if current % 50 == 0 || current == total_files {
                        let _ = prog_tx.send((current, total_files));
                    }
                }

                // Skip files deleted between the walk and this read
                fs::metadata(path).ok()?;

                let exif_data = read_exif_data(path);
                let taken_at = exif_data.as_ref().map(get_taken_at).unwrap_or(TakenAt::Unknown);
                let orientation = exif_data.as_ref().map(get_orientation).unwrap_or(1);

                Some(MediaAsset {
                    path: path.clone(),
                    taken_at,
                    orientation,
                })
            })
            .collect();

        if !batch.is_empty() {
            if let Some(tx) = &batch_tx {
                let _ = tx.send(batch.clone());
            }
            assets.extend(batch);
        }
    }

    Ok(ScanOutcome { assets, fetched_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn exts() -> Vec<String> {
        DEFAULT_EXTS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_image_ext() {
        let exts = exts();
        assert!(is_image_ext(Path::new("/a/b/photo.jpg"), &exts));
        assert!(is_image_ext(Path::new("photo.JPEG"), &exts));
        assert!(is_image_ext(Path::new("shot.HeIc"), &exts));
        assert!(!is_image_ext(Path::new("notes.txt"), &exts));
        assert!(!is_image_ext(Path::new("noextension"), &exts));
        assert!(!is_image_ext(Path::new("movie.mp4"), &exts));
    }

    #[test]
    fn test_datetime_from_exif_ascii() {
        let ts = datetime_from_exif_ascii(b"2024:03:14 10:30:05").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(10, 30, 5)
            .unwrap();
        assert_eq!(ts, expected);
        assert!(datetime_from_exif_ascii(b"not a datetime").is_none());
        // Month 13 parses as digits but is not a calendar date
        assert!(datetime_from_exif_ascii(b"2024:13:14 10:30:05").is_none());
    }

    #[test]
    fn test_missing_root_is_a_fetch_failure() {
        let err = collect_media_paths(
            &["/nonexistent/phgrid/test/root".to_string()],
            &exts(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no such file or directory"));
    }

    #[test]
    fn test_taken_at_resolve() {
        let fallback = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let known = NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(TakenAt::Known(known).resolve(fallback, &Utc), known);
        assert_eq!(TakenAt::Unknown.resolve(fallback, &Utc), fallback.naive_utc());
    }
}
