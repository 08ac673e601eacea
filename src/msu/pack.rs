//! Pack directory scanning
//!
//! MSU-1 packs name their tracks `<pack>-<n>.pcm`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use super::types::FileMap;

/// Track number encoded in a PCM file name, if any
pub fn track_number(file_name: &str) -> Option<i32> {
    let stem = file_name.strip_suffix(".pcm")?;
    let (_, number) = stem.rsplit_once('-')?;
    number.parse().ok()
}

/// Build a file map from the PCM files directly inside `dir`.
///
/// Files without a track suffix are ignored. When two files claim the same
/// track, the one with the greater path wins.
pub fn scan_pack(dir: impl AsRef<Path>) -> Result<FileMap> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read pack directory: {}", dir.display()))?;

    let mut files = FileMap::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(track) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(track_number)
        else {
            continue;
        };

        match files.get(&track) {
            Some(existing) if *existing >= path => {}
            _ => {
                files.insert(track, path);
            }
        }
    }

    debug!("Scanned {} tracks in {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_track_number_parsing() {
        assert_eq!(track_number("alttp_msu-12.pcm"), Some(12));
        assert_eq!(track_number("my-pack-name-3.pcm"), Some(3));
        assert_eq!(track_number("alttp_msu.msu"), None);
        assert_eq!(track_number("alttp_msu-x.pcm"), None);
        assert_eq!(track_number("track.pcm"), None);
    }

    #[test]
    fn test_scan_pack() {
        let dir = tempdir().unwrap();
        for name in ["a-1.pcm", "a-2.pcm", "b-2.pcm", "a.msu", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"MSU1").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested-5.pcm")).unwrap();

        let files = scan_pack(dir.path()).unwrap();
        assert_eq!(files.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(files[&2], dir.path().join("b-2.pcm"));
    }

    #[test]
    fn test_scan_missing_dir() {
        assert!(scan_pack("/nonexistent/pack").is_err());
    }
}
