// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Byte-level persistence backends for the assets directory
//!
//! A [`Registry`] stores the logical tree
//! `project/lineage/generation/{tag.json, <state-uuid>.bin}`. State blobs
//! are write-once; a generation becomes visible only once its tag is written
//! (the tag commit is last). Two reference backends are provided: the
//! in-memory [`Volatile`] registry for tests and short-lived runs, and the
//! filesystem [`Posix`] registry.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::asset::directory::{GenerationKey, LineageKey, ProjectKey};
use crate::asset::tag::Tag;
use crate::error::{Error, Result};

/// Packaged project artifact published into a lineage.
#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    /// Lineage version of the package
    pub lineage: LineageKey,
    /// Opaque package content
    pub content: Vec<u8>,
}

/// Byte-level persistence contract consumed by the assets directory.
pub trait Registry: Send + Sync {
    /// Enumerate the stored projects.
    fn projects(&self) -> Result<Vec<ProjectKey>>;

    /// Enumerate the lineages of a project.
    fn lineages(&self, project: &str) -> Result<Vec<LineageKey>>;

    /// Enumerate the (committed) generations of a lineage.
    fn generations(&self, project: &str, lineage: LineageKey) -> Result<Vec<GenerationKey>>;

    /// Publish a lineage package into a project.
    fn put(&self, project: &str, package: &Package) -> Result<()>;

    /// Fetch a generation tag.
    fn open(&self, project: &str, lineage: LineageKey, generation: GenerationKey) -> Result<Tag>;

    /// Fetch a single state blob.
    fn read(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
    ) -> Result<Vec<u8>>;

    /// Store a state blob (write-once per id).
    fn write(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
        state: &[u8],
    ) -> Result<()>;

    /// Commit a generation by writing its tag (making it visible).
    fn close(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        tag: &Tag,
    ) -> Result<()>;
}

#[derive(Default)]
struct Snapshot {
    tag: Option<Tag>,
    states: BTreeMap<Uuid, Vec<u8>>,
}

#[derive(Default)]
struct LineageStore {
    package: Vec<u8>,
    generations: BTreeMap<GenerationKey, Snapshot>,
}

/// In-memory registry.
///
/// Useful for tests and short-lived workflows; nothing survives the
/// process.
#[derive(Default)]
pub struct Volatile {
    projects: RwLock<BTreeMap<ProjectKey, BTreeMap<LineageKey, LineageStore>>>,
}

impl Volatile {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for Volatile {
    fn projects(&self) -> Result<Vec<ProjectKey>> {
        Ok(self.projects.read().keys().cloned().collect())
    }

    fn lineages(&self, project: &str) -> Result<Vec<LineageKey>> {
        let projects = self.projects.read();
        let lineages = projects
            .get(project)
            .ok_or_else(|| Error::Level(format!("Unknown project: {project}")))?;
        Ok(lineages.keys().copied().collect())
    }

    fn generations(&self, project: &str, lineage: LineageKey) -> Result<Vec<GenerationKey>> {
        let projects = self.projects.read();
        let store = projects
            .get(project)
            .and_then(|lineages| lineages.get(&lineage))
            .ok_or_else(|| Error::Level(format!("Unknown lineage: {project}/{lineage}")))?;
        Ok(store
            .generations
            .iter()
            .filter(|(_, snapshot)| snapshot.tag.is_some())
            .map(|(key, _)| *key)
            .collect())
    }

    fn put(&self, project: &str, package: &Package) -> Result<()> {
        let mut projects = self.projects.write();
        let lineages = projects.entry(project.to_string()).or_default();
        if lineages.contains_key(&package.lineage) {
            return Err(Error::Level(format!(
                "Lineage already published: {project}/{}",
                package.lineage
            )));
        }
        lineages.insert(
            package.lineage,
            LineageStore {
                package: package.content.clone(),
                generations: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn open(&self, project: &str, lineage: LineageKey, generation: GenerationKey) -> Result<Tag> {
        let projects = self.projects.read();
        projects
            .get(project)
            .and_then(|lineages| lineages.get(&lineage))
            .and_then(|store| store.generations.get(&generation))
            .and_then(|snapshot| snapshot.tag.clone())
            .ok_or_else(|| {
                Error::Level(format!(
                    "Unknown generation: {project}/{lineage}/{generation}"
                ))
            })
    }

    fn read(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
    ) -> Result<Vec<u8>> {
        let projects = self.projects.read();
        projects
            .get(project)
            .and_then(|lineages| lineages.get(&lineage))
            .and_then(|store| store.generations.get(&generation))
            .and_then(|snapshot| snapshot.states.get(&sid).cloned())
            .ok_or_else(|| {
                Error::Level(format!(
                    "Unknown state: {project}/{lineage}/{generation}/{sid}"
                ))
            })
    }

    fn write(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
        state: &[u8],
    ) -> Result<()> {
        let mut projects = self.projects.write();
        let store = projects
            .get_mut(project)
            .and_then(|lineages| lineages.get_mut(&lineage))
            .ok_or_else(|| Error::Level(format!("Unknown lineage: {project}/{lineage}")))?;
        let snapshot = store.generations.entry(generation).or_default();
        if snapshot.states.contains_key(&sid) {
            return Err(Error::Level(format!("State already written: {sid}")));
        }
        snapshot.states.insert(sid, state.to_vec());
        Ok(())
    }

    fn close(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        tag: &Tag,
    ) -> Result<()> {
        let mut projects = self.projects.write();
        let store = projects
            .get_mut(project)
            .and_then(|lineages| lineages.get_mut(&lineage))
            .ok_or_else(|| Error::Level(format!("Unknown lineage: {project}/{lineage}")))?;
        let snapshot = store.generations.entry(generation).or_default();
        if snapshot.tag.is_some() {
            return Err(Error::Level(format!(
                "Generation already committed: {project}/{lineage}/{generation}"
            )));
        }
        snapshot.tag = Some(tag.clone());
        Ok(())
    }
}

const TAG_FILE: &str = "tag.json";
const STATE_SUFFIX: &str = ".bin";

/// Filesystem registry over the logical tree layout.
///
/// Tags are committed by writing to a temporary sibling first and renaming
/// it into place, so a crash mid-write never yields a visible but corrupt
/// generation.
pub struct Posix {
    root: PathBuf,
}

impl Posix {
    /// Open a registry rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn lineage_path(&self, project: &str, lineage: LineageKey) -> PathBuf {
        self.root.join(project).join(lineage.to_string())
    }

    fn generation_path(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
    ) -> PathBuf {
        self.lineage_path(project, lineage).join(generation.to_string())
    }

    fn entries<T, F: Fn(&str) -> Option<T>>(path: &FsPath, parse: F) -> Result<Vec<T>> {
        if !path.exists() {
            return Err(Error::Level(format!("Unknown level: {}", path.display())));
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(|name| parse(name)) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    // Write-then-rename so the content appears atomically.
    fn write_atomic(path: &FsPath, data: &[u8]) -> Result<()> {
        let temp = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

impl Registry for Posix {
    fn projects(&self) -> Result<Vec<ProjectKey>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        Self::entries(&self.root, |name| Some(name.to_string()))
    }

    fn lineages(&self, project: &str) -> Result<Vec<LineageKey>> {
        Self::entries(&self.root.join(project), |name| name.parse().ok())
    }

    fn generations(&self, project: &str, lineage: LineageKey) -> Result<Vec<GenerationKey>> {
        let path = self.lineage_path(project, lineage);
        let keys = Self::entries(&path, |name| name.parse::<GenerationKey>().ok())?;
        // Only generations with a committed tag are visible.
        Ok(keys
            .into_iter()
            .filter(|key| path.join(key.to_string()).join(TAG_FILE).exists())
            .collect())
    }

    fn put(&self, project: &str, package: &Package) -> Result<()> {
        let path = self.lineage_path(project, package.lineage);
        if path.exists() {
            return Err(Error::Level(format!(
                "Lineage already published: {project}/{}",
                package.lineage
            )));
        }
        std::fs::create_dir_all(&path)?;
        Self::write_atomic(&path.join("package.bin"), &package.content)
    }

    fn open(&self, project: &str, lineage: LineageKey, generation: GenerationKey) -> Result<Tag> {
        let path = self
            .generation_path(project, lineage, generation)
            .join(TAG_FILE);
        let raw = std::fs::read(&path).map_err(|error| {
            tracing::warn!(path = %path.display(), error = %error, "Failed to read tag");
            Error::Level(format!(
                "Unknown generation: {project}/{lineage}/{generation}"
            ))
        })?;
        Tag::loads(&raw)
    }

    fn read(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
    ) -> Result<Vec<u8>> {
        let path = self
            .generation_path(project, lineage, generation)
            .join(format!("{sid}{STATE_SUFFIX}"));
        std::fs::read(&path).map_err(|_| {
            Error::Level(format!(
                "Unknown state: {project}/{lineage}/{generation}/{sid}"
            ))
        })
    }

    fn write(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
        state: &[u8],
    ) -> Result<()> {
        let dir = self.generation_path(project, lineage, generation);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{sid}{STATE_SUFFIX}"));
        if path.exists() {
            return Err(Error::Level(format!("State already written: {sid}")));
        }
        Self::write_atomic(&path, state)
    }

    fn close(
        &self,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        tag: &Tag,
    ) -> Result<()> {
        let dir = self.generation_path(project, lineage, generation);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(TAG_FILE);
        if path.exists() {
            return Err(Error::Level(format!(
                "Generation already committed: {project}/{lineage}/{generation}"
            )));
        }
        Self::write_atomic(&path, &tag.dumps()?)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::tag::Training;

    fn package() -> Package {
        Package {
            lineage: LineageKey::new(1, 0, 0),
            content: b"artifact".to_vec(),
        }
    }

    fn committed_tag(sid: Uuid) -> Tag {
        Tag::default()
            .with_training(Training {
                timestamp: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                    .and_then(|date| date.and_hms_opt(0, 0, 0)),
                ordinal: None,
            })
            .with_states(vec![sid])
    }

    fn exercise(registry: &dyn Registry) {
        let lineage = LineageKey::new(1, 0, 0);
        let generation = GenerationKey::MIN;
        registry.put("forecast", &package()).unwrap();
        assert_eq!(registry.lineages("forecast").unwrap(), vec![lineage]);

        // Uncommitted generations stay invisible.
        let sid = Uuid::new_v4();
        registry
            .write("forecast", lineage, generation, sid, b"weights")
            .unwrap();
        assert!(registry
            .generations("forecast", lineage)
            .unwrap()
            .is_empty());

        // Write-once states.
        assert!(registry
            .write("forecast", lineage, generation, sid, b"other")
            .is_err());

        // Commit makes the generation visible, tag last.
        registry
            .close("forecast", lineage, generation, &committed_tag(sid))
            .unwrap();
        assert_eq!(
            registry.generations("forecast", lineage).unwrap(),
            vec![generation]
        );
        assert_eq!(
            registry.open("forecast", lineage, generation).unwrap().states,
            vec![sid]
        );
        assert_eq!(
            registry.read("forecast", lineage, generation, sid).unwrap(),
            b"weights".to_vec()
        );
        assert!(registry
            .read("forecast", lineage, generation, Uuid::new_v4())
            .is_err());

        // Double publication and double commit are rejected.
        assert!(registry.put("forecast", &package()).is_err());
        assert!(registry
            .close("forecast", lineage, generation, &committed_tag(sid))
            .is_err());
    }

    #[test]
    fn test_volatile_registry() {
        exercise(&Volatile::new());
    }

    #[test]
    fn test_posix_registry() {
        let root = tempfile::tempdir().unwrap();
        exercise(&Posix::new(root.path()));
    }

    #[test]
    fn test_posix_layout() {
        let root = tempfile::tempdir().unwrap();
        let registry = Posix::new(root.path());
        let lineage = LineageKey::new(2, 1, 0);
        registry
            .put(
                "forecast",
                &Package {
                    lineage,
                    content: Vec::new(),
                },
            )
            .unwrap();
        let sid = Uuid::new_v4();
        registry
            .write("forecast", lineage, GenerationKey::MIN, sid, b"x")
            .unwrap();
        registry
            .close("forecast", lineage, GenerationKey::MIN, &committed_tag(sid))
            .unwrap();
        assert!(root.path().join("forecast/2.1.0/1/tag.json").exists());
        assert!(root
            .path()
            .join(format!("forecast/2.1.0/1/{sid}.bin"))
            .exists());
    }
}
