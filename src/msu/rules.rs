//! Structural and loop-based pack matching

use std::path::Path;
use tracing::debug;

use super::types::{FileMap, MsuType};

/// External capability deciding whether an audio file loops
pub trait LoopOracle: Send + Sync {
    fn loops(&self, path: &Path) -> bool;
}

impl<F> LoopOracle for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn loops(&self, path: &Path) -> bool {
        self(path)
    }
}

impl MsuType {
    /// Cheap structural check: track count bounds, required coverage, and no
    /// illegal tracks. Performs no I/O.
    pub fn matches(&self, files: &FileMap) -> bool {
        let count = files.len();
        if count < self.min_track_count || count > self.max_track_count {
            return false;
        }

        if !self.required_tracks.iter().all(|t| files.contains_key(t)) {
            return false;
        }

        match &self.illegal_tracks {
            Some(illegal) => !illegal.iter().any(|t| files.contains_key(t)),
            None => true,
        }
    }

    /// Loop requirements for the tracks present in `files`.
    ///
    /// Run this only after [`MsuType::matches`] succeeds; it consults the
    /// oracle, which typically reads file headers.
    pub fn matches_on_pcm_loops(&self, files: &FileMap, oracle: &dyn LoopOracle) -> bool {
        for track in self.required_loop_tracks.iter().flatten() {
            if let Some(path) = files.get(track) {
                if !oracle.loops(path) {
                    debug!(msu_type = %self.name, track, "track must loop but does not");
                    return false;
                }
            }
        }

        for track in self.required_non_loop_tracks.iter().flatten() {
            if let Some(path) = files.get(track) {
                if oracle.loops(path) {
                    debug!(msu_type = %self.name, track, "track must not loop but does");
                    return false;
                }
            }
        }

        true
    }

    /// Apply this type's own remaps, filling slots from their originals.
    ///
    /// Originals stay in place; a remap marked `only_add_if_missing` never
    /// replaces an existing file.
    pub fn apply_remaps(&self, files: &FileMap) -> FileMap {
        let mut result = files.clone();
        for remap in self.remaps.iter().flatten() {
            for original in remap.original_track_numbers.as_slice() {
                let Some(path) = files.get(original) else {
                    continue;
                };
                let Some(target) = remap.target_for(*original) else {
                    continue;
                };
                if remap.only_add_if_missing && result.contains_key(&target) {
                    continue;
                }
                result.insert(target, path.clone());
            }
        }
        result
    }
}
