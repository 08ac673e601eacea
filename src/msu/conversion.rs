//! Track number conversion between MSU types
//!
//! Resolution order per original track:
//! 1. manual remaps
//! 2. the first ranged modifier (in declared order) containing the track
//! 3. the default modifier, when the track lies in the conversion's range
//!
//! Overlapping ranged modifiers are resolved strictly by declaration order.

use tracing::trace;

use super::types::{Conversion, FileMap, RangedModifier, TrackRemapping};

impl Conversion {
    /// Convert a source file map into the target type's numbering.
    ///
    /// Tracks whose shifted number would overflow are dropped.
    pub fn apply(&self, source: &FileMap) -> FileMap {
        let mut converted = FileMap::new();

        for (&track, path) in source {
            if let Some((remap, target)) = self.manual_remap_for(track) {
                if remap.only_add_if_missing && converted.contains_key(&target) {
                    trace!(track, target, "manual remap skipped, slot filled");
                    continue;
                }
                converted.insert(target, path.clone());
                continue;
            }

            if let Some(range) = self.ranged_modifier_for(track) {
                let Some(target) = track.checked_add(range.modifier) else {
                    continue;
                };

                if !(range.only_add_if_missing && converted.contains_key(&target)) {
                    converted.insert(target, path.clone());
                }

                let skip_original =
                    range.skip_original_if_conversion_exists && converted.contains_key(&target);
                if !skip_original {
                    converted.entry(track).or_insert_with(|| path.clone());
                }
                continue;
            }

            if self.in_default_range(track) {
                if let Some(target) = track.checked_add(self.default_modifier) {
                    converted.insert(target, path.clone());
                }
            }
        }

        converted
    }

    fn manual_remap_for(&self, track: i32) -> Option<(&TrackRemapping, i32)> {
        self.manual_remaps
            .iter()
            .flatten()
            .find_map(|remap| remap.target_for(track).map(|target| (remap, target)))
    }

    fn ranged_modifier_for(&self, track: i32) -> Option<&RangedModifier> {
        self.ranged_modifiers
            .iter()
            .flatten()
            .find(|range| range.contains(track))
    }
}
