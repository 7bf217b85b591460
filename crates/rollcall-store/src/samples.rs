//! Enrollment samples: detector output dumped as JSON.
//!
//! ```json
//! {"landmarks": [[0.51, 0.42, -0.03], ...]}
//! ```
//!
//! `"landmarks": null` (or a missing field) records that the detector found
//! no face in that image.

use crate::error::StoreError;
use rollcall_core::{Landmark, LandmarkSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFile {
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
}

impl SampleFile {
    pub fn into_detection(self) -> Option<LandmarkSet> {
        self.landmarks.map(LandmarkSet::new)
    }
}

/// Read one sample. `Ok(None)` means no face was detected.
pub fn read_sample(path: &Path) -> Result<Option<LandmarkSet>, StoreError> {
    let bytes = std::fs::read(path).map_err(StoreError::io(path))?;
    let sample: SampleFile = serde_json::from_slice(&bytes).map_err(StoreError::json(path))?;
    Ok(sample.into_detection())
}

/// Sample files in `dir`, sorted by name. Hidden files and non-JSON files
/// are skipped.
pub fn sample_paths(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(StoreError::io(dir))? {
        let entry = entry.map_err(StoreError::io(dir))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if !hidden && is_json && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Person subdirectories of a samples root: `(name, dir)`, sorted by name.
pub fn person_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut people = Vec::new();
    for entry in std::fs::read_dir(root).map_err(StoreError::io(root))? {
        let entry = entry.map_err(StoreError::io(root))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 directory name");
            continue;
        };
        if !name.starts_with('.') {
            people.push((name, path));
        }
    }
    people.sort();
    Ok(people)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_face_and_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let face = dir.path().join("a.json");
        std::fs::write(&face, r#"{"landmarks": [[0.1, 0.2, 0.3], [0.4, 0.5, -0.6]]}"#).unwrap();
        let none = dir.path().join("b.json");
        std::fs::write(&none, r#"{"landmarks": null}"#).unwrap();
        let missing_field = dir.path().join("c.json");
        std::fs::write(&missing_field, "{}").unwrap();

        let set = read_sample(&face).unwrap().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.points()[1], Landmark::new(0.4, 0.5, -0.6));
        assert_eq!(read_sample(&none).unwrap(), None);
        assert_eq!(read_sample(&missing_field).unwrap(), None);
    }

    #[test]
    fn test_malformed_landmark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"landmarks": [[0.1, 0.2]]}"#).unwrap();
        assert!(matches!(read_sample(&path), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_sample_paths_filtering() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2.json", "1.json", ".DS_Store", ".3.json", "photo.jpg"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();
        let names: Vec<_> = sample_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["1.json", "2.json"]);
    }

    #[test]
    fn test_person_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zoe")).unwrap();
        std::fs::create_dir(dir.path().join("Aditya")).unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        let people: Vec<_> = person_dirs(dir.path()).unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(people, ["Aditya", "zoe"]);
    }
}
