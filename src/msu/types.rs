//! MSU type schema records
//!
//! These are deserialized from the type catalog YAML. Track-number lists may
//! be written as delimited strings (`"1, 2,3"`), a single integer, or a YAML
//! sequence; every form is parsed at load time.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Track number to audio file mapping for a single pack
pub type FileMap = BTreeMap<i32, PathBuf>;

/// Ordered list of track numbers parsed from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawTrackList", into = "Vec<i32>")]
pub struct TrackList(Vec<i32>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTrackList {
    Single(i32),
    Many(Vec<i32>),
    Text(String),
}

impl TrackList {
    /// Parse a comma-delimited list, trimming whitespace around each entry.
    ///
    /// An empty or whitespace-only string yields an empty list.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self(Vec::new()));
        }

        text.split(',')
            .map(|entry| {
                let entry = entry.trim();
                entry
                    .parse::<i32>()
                    .map_err(|_| ConfigError::InvalidTrackNumber {
                        list: text.to_string(),
                        entry: entry.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of a track number within the list
    pub fn position(&self, track: i32) -> Option<usize> {
        self.0.iter().position(|t| *t == track)
    }
}

impl TryFrom<RawTrackList> for TrackList {
    type Error = ConfigError;

    fn try_from(raw: RawTrackList) -> Result<Self, Self::Error> {
        match raw {
            RawTrackList::Single(n) => Ok(Self(vec![n])),
            RawTrackList::Many(list) => Ok(Self(list)),
            RawTrackList::Text(text) => Self::parse(&text),
        }
    }
}

impl From<TrackList> for Vec<i32> {
    fn from(list: TrackList) -> Self {
        list.0
    }
}

impl From<Vec<i32>> for TrackList {
    fn from(list: Vec<i32>) -> Self {
        Self(list)
    }
}

fn track_set<'de, D>(deserializer: D) -> Result<BTreeSet<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = TrackList::deserialize(deserializer)?;
    Ok(list.0.into_iter().collect())
}

fn optional_track_set<'de, D>(deserializer: D) -> Result<Option<BTreeSet<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Option::<TrackList>::deserialize(deserializer)?;
    Ok(list.map(|l| l.0.into_iter().collect()))
}

/// Named pack-type schema
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MsuType {
    pub name: String,
    pub min_track_count: usize,
    pub max_track_count: usize,
    #[serde(default, deserialize_with = "track_set")]
    pub required_tracks: BTreeSet<i32>,
    #[serde(
        default,
        deserialize_with = "optional_track_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub illegal_tracks: Option<BTreeSet<i32>>,
    #[serde(
        default,
        deserialize_with = "optional_track_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub required_loop_tracks: Option<BTreeSet<i32>>,
    #[serde(
        default,
        deserialize_with = "optional_track_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub required_non_loop_tracks: Option<BTreeSet<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaps: Option<Vec<TrackRemapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<BTreeMap<i32, i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversions: Option<Vec<Conversion>>,
}

/// Rule set converting one type's numbering into another's
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Conversion {
    #[serde(rename = "target")]
    pub target_type_name: String,
    #[serde(default, rename = "modifier")]
    pub default_modifier: i32,
    #[serde(default = "min_track", rename = "min")]
    pub minimum_track_number: i32,
    #[serde(default = "max_track", rename = "max")]
    pub maximum_track_number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_remaps: Option<Vec<TrackRemapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranged_modifiers: Option<Vec<RangedModifier>>,
}

/// Positional remapping from a list of originals onto a list of targets
///
/// `remapped` either matches `original` in length or holds a single entry
/// that every original maps onto.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackRemapping {
    #[serde(rename = "original")]
    pub original_track_numbers: TrackList,
    #[serde(rename = "remapped")]
    pub remapped_track_numbers: TrackList,
    #[serde(default)]
    pub only_add_if_missing: bool,
}

/// Additive shift applied to an inclusive range of track numbers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangedModifier {
    #[serde(rename = "min")]
    pub minimum_track_number: i32,
    #[serde(rename = "max")]
    pub maximum_track_number: i32,
    pub modifier: i32,
    #[serde(default)]
    pub only_add_if_missing: bool,
    #[serde(default)]
    pub skip_original_if_conversion_exists: bool,
}

fn min_track() -> i32 {
    i32::MIN
}

fn max_track() -> i32 {
    i32::MAX
}

impl TrackRemapping {
    /// Target slot for `track`, if this remapping covers it
    pub fn target_for(&self, track: i32) -> Option<i32> {
        let index = self.original_track_numbers.position(track)?;
        let remapped = self.remapped_track_numbers.as_slice();
        match remapped.len() {
            1 => Some(remapped[0]),
            _ => remapped.get(index).copied(),
        }
    }

    fn validate(&self, msu_type: &str, field: &str) -> Result<(), ConfigError> {
        let original = self.original_track_numbers.len();
        let remapped = self.remapped_track_numbers.len();
        if remapped != original && remapped != 1 {
            return Err(ConfigError::RemapLengthMismatch {
                msu_type: msu_type.to_string(),
                field: field.to_string(),
                original,
                remapped,
            });
        }
        Ok(())
    }
}

impl RangedModifier {
    pub fn contains(&self, track: i32) -> bool {
        (self.minimum_track_number..=self.maximum_track_number).contains(&track)
    }
}

impl Conversion {
    /// Whether the default modifier applies to `track`
    pub fn in_default_range(&self, track: i32) -> bool {
        (self.minimum_track_number..=self.maximum_track_number).contains(&track)
    }
}

impl MsuType {
    /// Check the record for inconsistencies that would otherwise surface
    /// during matching or conversion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyTypeName);
        }

        if self.min_track_count > self.max_track_count {
            return Err(ConfigError::InvertedRange {
                msu_type: name.to_string(),
                field: "track_count".to_string(),
                min: self.min_track_count as i64,
                max: self.max_track_count as i64,
            });
        }

        for remap in self.remaps.iter().flatten() {
            remap.validate(name, "remaps")?;
        }

        for conversion in self.conversions.iter().flatten() {
            let field = format!("conversion to '{}'", conversion.target_type_name);
            if conversion.minimum_track_number > conversion.maximum_track_number {
                return Err(ConfigError::InvertedRange {
                    msu_type: name.to_string(),
                    field,
                    min: conversion.minimum_track_number as i64,
                    max: conversion.maximum_track_number as i64,
                });
            }
            for remap in conversion.manual_remaps.iter().flatten() {
                remap.validate(name, &field)?;
            }
            for range in conversion.ranged_modifiers.iter().flatten() {
                if range.minimum_track_number > range.maximum_track_number {
                    return Err(ConfigError::InvertedRange {
                        msu_type: name.to_string(),
                        field: format!("{} ranged modifier", field),
                        min: range.minimum_track_number as i64,
                        max: range.maximum_track_number as i64,
                    });
                }
            }
        }

        Ok(())
    }

    /// Conversions declared on this type, in declaration order
    pub fn conversions(&self) -> &[Conversion] {
        self.conversions.as_deref().unwrap_or(&[])
    }

    /// Partner of `track` in the pair table, looked up in either direction
    pub fn paired_track(&self, track: i32) -> Option<i32> {
        let pairs = self.pairs.as_ref()?;
        pairs.get(&track).copied().or_else(|| {
            pairs
                .iter()
                .find(|(_, partner)| **partner == track)
                .map(|(key, _)| *key)
        })
    }
}
