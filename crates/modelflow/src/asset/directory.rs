// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Assets directory - the project/lineage/generation hierarchy
//!
//! The directory is a typed view over a [`Registry`] backend: projects hold
//! lineages (semantic versions of the packaged project), lineages hold
//! generations (training snapshots). Listings are ascending; asking a level
//! without entries for its key raises the catchable empty-listing error,
//! which the generation tag lookup converts into the null tag.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::asset::registry::{Package, Registry};
use crate::asset::tag::Tag;
use crate::error::{Error, Result};

/// Project identifier.
pub type ProjectKey = String;

/// Lineage key: an orderable semantic version triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineageKey {
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version
    pub patch: u64,
}

impl LineageKey {
    /// Assemble a lineage key from its version components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for LineageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for LineageKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || Error::Level(format!("Invalid lineage key: {raw}"));
        let mut parts = raw.split('.');
        let mut component = || {
            parts
                .next()
                .and_then(|part| part.parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        let key = Self::new(component()?, component()?, component()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(key)
    }
}

/// Generation key: a positive integer with `+1` succession.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationKey(u64);

impl GenerationKey {
    /// Smallest valid generation key.
    pub const MIN: GenerationKey = GenerationKey(1);

    /// Validate a raw key value.
    pub fn new(key: u64) -> Result<Self> {
        if key < Self::MIN.0 {
            return Err(Error::Level(format!("Invalid key {key} (not natural)")));
        }
        Ok(Self(key))
    }

    /// Successor key.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw key value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenerationKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw
            .parse::<u64>()
            .map_err(|_| Error::Level(format!("Invalid key {raw} (not an integer)")))?;
        Self::new(key)
    }
}

/// Memoization of registry reads keyed on the full asset coordinates.
///
/// Values are immutable once published, so entries never invalidate; the
/// capacity bound is plain LRU. The cache is shared by value (`Arc`) between
/// the directory levels and any state handles derived from them.
pub struct Cache {
    tags: Mutex<LruCache<(ProjectKey, LineageKey, GenerationKey), Tag>>,
    states: Mutex<LruCache<(ProjectKey, LineageKey, GenerationKey, Uuid), Arc<Vec<u8>>>>,
}

impl Cache {
    /// Create a cache bounded to the given number of entries per table.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            tags: Mutex::new(LruCache::new(capacity)),
            states: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub(crate) fn tag(
        &self,
        registry: &dyn Registry,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
    ) -> Result<Tag> {
        let key = (project.to_string(), lineage, generation);
        if let Some(tag) = self.tags.lock().get(&key) {
            return Ok(tag.clone());
        }
        tracing::debug!(project, %lineage, %generation, "Tag cache miss");
        let tag = registry.open(project, lineage, generation)?;
        self.tags.lock().put(key, tag.clone());
        Ok(tag)
    }

    pub(crate) fn state(
        &self,
        registry: &dyn Registry,
        project: &str,
        lineage: LineageKey,
        generation: GenerationKey,
        sid: Uuid,
    ) -> Result<Arc<Vec<u8>>> {
        let key = (project.to_string(), lineage, generation, sid);
        if let Some(state) = self.states.lock().get(&key) {
            return Ok(Arc::clone(state));
        }
        tracing::debug!(project, %lineage, %generation, %sid, "State cache miss");
        let state = Arc::new(registry.read(project, lineage, generation, sid)?);
        self.states.lock().put(key, Arc::clone(&state));
        Ok(state)
    }
}

impl Default for Cache {
    fn default() -> Self {
        // SAFETY: expect on a non-zero literal
        #[allow(clippy::expect_used)]
        Self::new(NonZeroUsize::new(256).expect("non-zero capacity"))
    }
}

/// Root level of the assets directory.
#[derive(Clone)]
pub struct Directory {
    registry: Arc<dyn Registry>,
    cache: Arc<Cache>,
}

impl Directory {
    /// Open a directory over the given registry with the given cache.
    pub fn new(registry: Arc<dyn Registry>, cache: Arc<Cache>) -> Self {
        Self { registry, cache }
    }

    /// Enumerate the project keys, ascending.
    pub fn list(&self) -> Result<Vec<ProjectKey>> {
        let mut projects = self.registry.projects()?;
        projects.sort();
        Ok(projects)
    }

    /// Project level handle.
    pub fn project(&self, key: impl Into<ProjectKey>) -> Project {
        Project {
            directory: self.clone(),
            key: key.into(),
        }
    }

    pub(crate) fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub(crate) fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

/// Project level of the assets directory.
#[derive(Clone)]
pub struct Project {
    directory: Directory,
    key: ProjectKey,
}

impl Project {
    /// Project key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Enumerate the lineage keys, ascending.
    pub fn list(&self) -> Result<Vec<LineageKey>> {
        let mut lineages = self.directory.registry.lineages(&self.key)?;
        lineages.sort();
        Ok(lineages)
    }

    /// Publish a lineage package into this project.
    pub fn put(&self, package: &Package) -> Result<()> {
        tracing::debug!(project = %self.key, lineage = %package.lineage, "Publishing package");
        self.directory.registry.put(&self.key, package)
    }

    /// Lineage level handle (`None` selects the latest lineage).
    pub fn lineage(&self, key: Option<LineageKey>) -> Lineage {
        Lineage {
            project: self.clone(),
            key,
        }
    }
}

/// Lineage level of the assets directory.
#[derive(Clone)]
pub struct Lineage {
    project: Project,
    key: Option<LineageKey>,
}

impl Lineage {
    /// Lineage key: the explicit one, or the latest in the project.
    ///
    /// Fails with the empty-listing error when the project has no lineages.
    pub fn key(&self) -> Result<LineageKey> {
        match self.key {
            Some(key) => Ok(key),
            None => self
                .project
                .list()?
                .last()
                .copied()
                .ok_or_else(|| Error::EmptyListing(format!("lineage of {}", self.project.key))),
        }
    }

    /// Enumerate the generation keys, ascending.
    pub fn list(&self) -> Result<Vec<GenerationKey>> {
        let mut generations = self
            .project
            .directory
            .registry
            .generations(&self.project.key, self.key()?)?;
        generations.sort();
        Ok(generations)
    }

    /// Generation level handle (`None` selects the latest generation).
    pub fn generation(&self, key: Option<GenerationKey>) -> Generation {
        Generation {
            lineage: self.clone(),
            key,
        }
    }
}

/// Generation level of the assets directory - one training snapshot.
#[derive(Clone)]
pub struct Generation {
    lineage: Lineage,
    key: Option<GenerationKey>,
}

impl Generation {
    /// Generation key: the explicit one, or the latest in the lineage.
    ///
    /// Fails with the empty-listing error when the lineage has no
    /// generations yet.
    pub fn key(&self) -> Result<GenerationKey> {
        match self.key {
            Some(key) => Ok(key),
            None => self.lineage.list()?.last().copied().ok_or_else(|| {
                Error::EmptyListing(format!("generation of {}", self.lineage.project.key))
            }),
        }
    }

    /// Owning lineage.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Generation metadata.
    ///
    /// A missing generation (empty lineage) yields the null tag instead of
    /// an error; missing project or lineage levels still propagate.
    pub fn tag(&self) -> Result<Tag> {
        let project = self.lineage.project.key.clone();
        let lineage = self.lineage.key()?;
        let generation = match self.key() {
            Ok(key) => key,
            Err(Error::EmptyListing(_)) => {
                tracing::debug!(%project, "No previous generations found - using a null tag");
                return Ok(Tag::default());
            }
            Err(error) => return Err(error),
        };
        self.lineage.project.directory.cache.tag(
            self.lineage.project.directory.registry.as_ref(),
            &project,
            lineage,
            generation,
        )
    }

    /// Enumerate this generation's state ids.
    pub fn list(&self) -> Result<Vec<Uuid>> {
        Ok(self.tag()?.states)
    }

    /// Load a state blob by absolute id.
    ///
    /// An untrained generation yields empty bytes; an id outside the tag's
    /// states is an invalid reference.
    pub fn get(&self, sid: Uuid) -> Result<Arc<Vec<u8>>> {
        let tag = self.tag()?;
        if !tag.training.triggered() {
            return Ok(Arc::new(Vec::new()));
        }
        if !tag.states.contains(&sid) {
            return Err(Error::Level(format!(
                "Unknown state reference for {}: {sid}",
                self.lineage.project.key
            )));
        }
        tracing::debug!(project = %self.lineage.project.key, %sid, "Getting state");
        self.lineage.project.directory.cache.state(
            self.lineage.project.directory.registry.as_ref(),
            &self.lineage.project.key,
            self.lineage.key()?,
            self.key()?,
            sid,
        )
    }

    /// Load a state blob by its position within the generation.
    pub fn get_at(&self, index: usize) -> Result<Arc<Vec<u8>>> {
        let tag = self.tag()?;
        if !tag.training.triggered() {
            return Ok(Arc::new(Vec::new()));
        }
        let sid = *tag.states.get(index).ok_or_else(|| {
            Error::Level(format!(
                "Unknown state reference for {}: #{index}",
                self.lineage.project.key
            ))
        })?;
        self.get(sid)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_key_succession() {
        assert_eq!(GenerationKey::new(1).unwrap().next(), GenerationKey::new(2).unwrap());
        assert!(GenerationKey::new(0).is_err());
        assert!("0".parse::<GenerationKey>().is_err());
        assert!("-1".parse::<GenerationKey>().is_err());
        assert!("x".parse::<GenerationKey>().is_err());
        assert_eq!("7".parse::<GenerationKey>().unwrap().get(), 7);
    }

    #[test]
    fn test_lineage_key_ordering() {
        let older: LineageKey = "1.2.3".parse().unwrap();
        let newer: LineageKey = "1.10.0".parse().unwrap();
        assert!(older < newer);
        assert_eq!(older.to_string(), "1.2.3");
        assert!("1.2".parse::<LineageKey>().is_err());
        assert!("1.2.3.4".parse::<LineageKey>().is_err());
        assert!("1.2.x".parse::<LineageKey>().is_err());
    }
}
