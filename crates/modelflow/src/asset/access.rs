// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Runtime access to the assets of one project generation
//!
//! [`Assets`] is the runner-facing facade addressing a particular
//! project/lineage/generation; a [`State`] handle narrows it down to the
//! shared worker groups of one composition. A state handle created with a
//! replacement tag is in *write mode*: dumped blobs land in the successor
//! generation which becomes visible on [`State::commit`] (tag written
//! last).

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::asset::directory::{Cache, Directory, Generation, GenerationKey, LineageKey, ProjectKey};
use crate::asset::registry::Registry;
use crate::asset::tag::Tag;
use crate::dsl::kind::Value;
use crate::error::{Error, Result};
use crate::flow::node::GroupId;

/// Assets of one project generation.
#[derive(Clone)]
pub struct Assets {
    directory: Directory,
    project: ProjectKey,
    lineage: Option<LineageKey>,
    generation: Option<GenerationKey>,
}

impl Assets {
    /// Address a project's assets; `None` keys select the latest lineage
    /// and generation.
    pub fn new(
        directory: Directory,
        project: impl Into<ProjectKey>,
        lineage: Option<LineageKey>,
        generation: Option<GenerationKey>,
    ) -> Self {
        Self {
            directory,
            project: project.into(),
            lineage,
            generation,
        }
    }

    /// Project key.
    pub fn project(&self) -> &str {
        &self.project
    }

    fn generation_handle(&self) -> Generation {
        self.directory
            .project(self.project.clone())
            .lineage(self.lineage)
            .generation(self.generation)
    }

    /// Tag of the addressed generation (the null tag when the lineage has
    /// no generations yet).
    pub fn tag(&self) -> Result<Tag> {
        self.generation_handle().tag()
    }

    /// State handle for the given shared worker groups.
    ///
    /// With a replacement `tag` the handle is writable and addresses the
    /// successor generation; without one it reads the addressed generation.
    pub fn state(&self, shared: &[GroupId], tag: Option<Tag>) -> Result<State> {
        let handle = self.generation_handle();
        let lineage = handle.lineage().key()?;
        let generation = match handle.key() {
            Ok(key) => Some(key),
            Err(Error::EmptyListing(_)) => None,
            Err(error) => return Err(error),
        };
        let current = handle.tag()?;
        let write = tag.map(|replacement| Write {
            target: generation.map_or(GenerationKey::MIN, GenerationKey::next),
            replacement,
            dumped: Mutex::new(vec![None; shared.len()]),
        });
        Ok(State {
            registry: Arc::clone(self.directory.registry()),
            cache: Arc::clone(self.directory.cache()),
            project: self.project.clone(),
            lineage,
            generation,
            tag: current,
            shared: shared.to_vec(),
            write,
        })
    }
}

struct Write {
    target: GenerationKey,
    replacement: Tag,
    dumped: Mutex<Vec<Option<Uuid>>>,
}

/// Persisted states of one composition's shared worker set.
pub struct State {
    registry: Arc<dyn Registry>,
    cache: Arc<Cache>,
    project: ProjectKey,
    lineage: LineageKey,
    generation: Option<GenerationKey>,
    tag: Tag,
    shared: Vec<GroupId>,
    write: Option<Write>,
}

impl State {
    /// Shared worker groups addressed by this handle, in state order.
    pub fn shared(&self) -> &[GroupId] {
        &self.shared
    }

    /// True when the group belongs to this handle's shared set.
    pub fn contains(&self, group: GroupId) -> bool {
        self.shared.contains(&group)
    }

    /// Positional offset of the group within the state order.
    pub fn offset(&self, group: GroupId) -> Result<usize> {
        self.shared
            .iter()
            .position(|candidate| *candidate == group)
            .ok_or_else(|| Error::Level(format!("Unknown group reference: {group}")))
    }

    /// Persisted state id of the group within the addressed generation.
    pub fn sid(&self, group: GroupId) -> Result<Uuid> {
        let offset = self.offset(group)?;
        self.tag.states.get(offset).copied().ok_or_else(|| {
            Error::Missing(format!(
                "No trained state for group {group} in {}",
                self.project
            ))
        })
    }

    /// Load the persisted state blob of the group (empty bytes for an
    /// untrained generation).
    pub fn load(&self, group: GroupId) -> Result<Arc<Vec<u8>>> {
        if !self.tag.training.triggered() {
            return Ok(Arc::new(Vec::new()));
        }
        let sid = self.sid(group)?;
        let generation = self.generation.ok_or_else(|| {
            Error::Missing(format!("No generation to load from in {}", self.project))
        })?;
        self.cache.state(
            self.registry.as_ref(),
            &self.project,
            self.lineage,
            generation,
            sid,
        )
    }

    /// Successor generation this handle writes into (write mode only).
    pub fn target(&self) -> Option<GenerationKey> {
        self.write.as_ref().map(|write| write.target)
    }

    /// Store a freshly trained state blob for the group under a new state
    /// id (write mode only, once per group).
    pub fn dump(&self, group: GroupId, state: &[u8]) -> Result<Uuid> {
        let write = self
            .write
            .as_ref()
            .ok_or_else(|| Error::Missing("State handle is not writable".to_string()))?;
        let offset = self.offset(group)?;
        let mut dumped = write.dumped.lock();
        if dumped[offset].is_some() {
            return Err(Error::Level(format!("State already dumped: {group}")));
        }
        let sid = Uuid::new_v4();
        self.registry
            .write(&self.project, self.lineage, write.target, sid, state)?;
        dumped[offset] = Some(sid);
        tracing::debug!(project = %self.project, %group, %sid, "Dumped state");
        Ok(sid)
    }

    /// Publish the successor generation: every shared group must have been
    /// dumped; the replacement tag (with the new states, and the given
    /// ordinal if any) is written last.
    pub fn commit(&self, ordinal: Option<Value>) -> Result<()> {
        let write = self
            .write
            .as_ref()
            .ok_or_else(|| Error::Missing("State handle is not writable".to_string()))?;
        let dumped = write.dumped.lock();
        let states = self
            .shared
            .iter()
            .zip(dumped.iter())
            .map(|(group, sid)| {
                sid.ok_or_else(|| Error::Missing(format!("State not dumped: {group}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut tag = write.replacement.clone().with_states(states);
        if ordinal.is_some() {
            tag.training.ordinal = ordinal;
        }
        tracing::debug!(project = %self.project, generation = %write.target, "Committing generation");
        self.registry
            .close(&self.project, self.lineage, write.target, &tag)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::asset::registry::{Package, Volatile};
    use crate::flow::node::{Node, Spec};

    fn group() -> GroupId {
        Node::worker(Spec::new("actor", serde_json::Value::Null), 1, 1)
            .group()
            .unwrap()
    }

    fn assets() -> Assets {
        let registry = Arc::new(Volatile::new());
        let directory = Directory::new(registry, Arc::new(Cache::default()));
        directory
            .project("forecast")
            .put(&Package {
                lineage: LineageKey::new(1, 0, 0),
                content: Vec::new(),
            })
            .unwrap();
        Assets::new(directory, "forecast", None, None)
    }

    fn timestamp() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_lineage_yields_null_tag() {
        let assets = assets();
        let tag = assets.tag().unwrap();
        assert!(tag.is_empty());
        assert!(tag.states.is_empty());
    }

    #[test]
    fn test_training_cycle() {
        let assets = assets();
        let groups = [group(), group()];

        // First generation: write mode against an empty lineage.
        let replacement = assets.tag().unwrap().trigger_training(timestamp());
        let state = assets.state(&groups, Some(replacement)).unwrap();
        assert_eq!(state.target(), Some(GenerationKey::MIN));
        state.dump(groups[0], b"alpha").unwrap();
        state.dump(groups[1], b"beta").unwrap();
        state.commit(Some(Value::Integer(42))).unwrap();

        let tag = assets.tag().unwrap();
        assert_eq!(tag.states.len(), 2);
        assert_eq!(tag.training.timestamp, Some(timestamp()));
        assert_eq!(tag.training.ordinal, Some(Value::Integer(42)));

        // Read mode resolves the committed blobs in shared order.
        let state = assets.state(&groups, None).unwrap();
        assert_eq!(*state.load(groups[0]).unwrap(), b"alpha".to_vec());
        assert_eq!(*state.load(groups[1]).unwrap(), b"beta".to_vec());
        assert_eq!(state.sid(groups[0]).unwrap(), tag.states[0]);

        // Second training run advances the generation key.
        let replacement = assets.tag().unwrap().trigger_training(timestamp());
        let state = assets.state(&groups, Some(replacement)).unwrap();
        assert_eq!(state.target().unwrap().get(), 2);
    }

    #[test]
    fn test_commit_requires_all_groups() {
        let assets = assets();
        let groups = [group(), group()];
        let state = assets
            .state(&groups, Some(assets.tag().unwrap().trigger_training(timestamp())))
            .unwrap();
        state.dump(groups[0], b"alpha").unwrap();
        assert!(matches!(state.commit(None), Err(Error::Missing(_))));
    }

    #[test]
    fn test_read_mode_is_not_writable() {
        let assets = assets();
        let groups = [group()];
        let state = assets.state(&groups, None).unwrap();
        assert!(state.dump(groups[0], b"x").is_err());
        assert!(state.commit(None).is_err());
        // Untrained generation loads as empty bytes.
        assert!(state.load(groups[0]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_group_rejected() {
        let assets = assets();
        let state = assets.state(&[group()], None).unwrap();
        assert!(matches!(state.offset(group()), Err(Error::Level(_))));
    }
}
