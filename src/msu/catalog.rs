//! MSU type catalog loaded from YAML at startup

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::types::{FileMap, MsuType};
use crate::error::ConfigError;

/// Immutable registry of MSU types, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MsuTypeCatalog {
    types: Vec<MsuType>,
    by_name: HashMap<String, usize>,
}

impl MsuTypeCatalog {
    /// Load and validate the catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let types: Vec<MsuType> =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_types(types)?;
        info!("Loaded {} MSU types from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Build a catalog from already-parsed types, validating each and the
    /// references between them.
    pub fn from_types(types: Vec<MsuType>) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(types.len());
        for (index, msu_type) in types.iter().enumerate() {
            msu_type.validate()?;
            if by_name.insert(msu_type.name.clone(), index).is_some() {
                return Err(ConfigError::DuplicateType(msu_type.name.clone()));
            }
        }

        for msu_type in &types {
            for conversion in msu_type.conversions() {
                if !by_name.contains_key(&conversion.target_type_name) {
                    return Err(ConfigError::UnknownConversionTarget {
                        msu_type: msu_type.name.clone(),
                        target: conversion.target_type_name.clone(),
                    });
                }
            }
        }

        Ok(Self { types, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&MsuType> {
        self.by_name.get(name).map(|index| &self.types[*index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MsuType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Every type whose structural check passes, sorted by name
    pub fn matching(&self, files: &FileMap) -> Vec<&MsuType> {
        let mut matches: Vec<&MsuType> = self.types.iter().filter(|t| t.matches(files)).collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("{} of {} MSU types match", matches.len(), self.types.len());
        matches
    }

    /// Convert `files` from one type to another using the first conversion
    /// declared on `from` that targets `to`.
    ///
    /// Returns `None` when either type is unknown or no conversion exists.
    pub fn convert(&self, files: &FileMap, from: &str, to: &str) -> Option<FileMap> {
        let source = self.get(from)?;
        self.get(to)?;
        source
            .conversions()
            .iter()
            .find(|c| c.target_type_name == to)
            .map(|conversion| conversion.apply(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    const CATALOG: &str = r#"
- name: Combo
  min_track_count: 2
  max_track_count: 200
  required_tracks: "1, 101"
  conversions:
    - target: Solo
      modifier: -100
      min: 101
      max: 199
- name: Solo
  min_track_count: 1
  max_track_count: 99
  required_tracks: 1
  illegal_tracks: "101"
"#;

    fn make_files(tracks: &[i32]) -> FileMap {
        tracks
            .iter()
            .map(|t| (*t, PathBuf::from(format!("pack-{t}.pcm"))))
            .collect()
    }

    fn write_catalog(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_match() {
        let file = write_catalog(CATALOG);
        let catalog = MsuTypeCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let names: Vec<_> = catalog
            .matching(&make_files(&[1, 101]))
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["Combo".to_string()]);

        let names: Vec<_> = catalog
            .matching(&make_files(&[1, 2]))
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["Solo".to_string()]);
    }

    #[test]
    fn test_convert_between_types() {
        let catalog = MsuTypeCatalog::load(write_catalog(CATALOG).path()).unwrap();
        let converted = catalog
            .convert(&make_files(&[1, 101, 105]), "Combo", "Solo")
            .unwrap();
        assert_eq!(converted.keys().copied().collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(converted[&1], PathBuf::from("pack-101.pcm"));

        assert!(catalog.convert(&make_files(&[1]), "Solo", "Combo").is_none());
        assert!(catalog.convert(&make_files(&[1]), "Missing", "Solo").is_none());
    }

    #[test]
    fn test_load_fails_fast_on_bad_track_list() {
        let file = write_catalog(
            r#"
- name: Bad
  min_track_count: 1
  max_track_count: 10
  required_tracks: "1,a,3"
"#,
        );
        let err = MsuTypeCatalog::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_unknown_conversion_target() {
        let file = write_catalog(
            r#"
- name: Lonely
  min_track_count: 1
  max_track_count: 10
  conversions:
    - target: Nowhere
"#,
        );
        assert!(matches!(
            MsuTypeCatalog::load(file.path()),
            Err(ConfigError::UnknownConversionTarget { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let file = write_catalog(
            r#"
- { name: Twice, min_track_count: 1, max_track_count: 2 }
- { name: Twice, min_track_count: 1, max_track_count: 2 }
"#,
        );
        assert!(matches!(
            MsuTypeCatalog::load(file.path()),
            Err(ConfigError::DuplicateType(name)) if name == "Twice"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MsuTypeCatalog::load("/nonexistent/msu_types.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_bundled_catalog_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("msu_types.yaml");
        let catalog = MsuTypeCatalog::load(path).unwrap();
        assert_eq!(catalog.len(), 3);

        let alttp = catalog.get("A Link to the Past").unwrap();
        assert_eq!(alttp.paired_track(59), Some(9));

        let converted = catalog
            .convert(&make_files(&[1, 2, 4]), "Super Metroid", "SMZ3 Combo Randomizer")
            .unwrap();
        assert!(converted.contains_key(&101));
        assert!(converted.contains_key(&104));
    }
}
