// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Pipeline segments and their composition
//!
//! A [`Segment`] carries the three parallel tracks of a pipeline fragment:
//! the `apply` data path plus the `train` and `label` paths feeding the
//! training sinks. A [`Composition`] is the fully assembled pipeline - ETL
//! head, expanded operator segments and sink tail - ready for compilation,
//! with the shared worker set enumerated for state addressing.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::flow::node::{GroupId, Node};
use crate::flow::path::{Mode, Path, PreOrder};

/// Three parallel tracks of a pipeline fragment.
#[derive(Clone, Debug)]
pub struct Segment {
    apply: Path,
    train: Path,
    label: Path,
}

impl Segment {
    /// Create a fresh segment with future-headed trivial tracks.
    pub fn new() -> Result<Self> {
        Ok(Self {
            apply: Path::new(Node::future())?,
            train: Path::new(Node::future())?,
            label: Path::new(Node::future())?,
        })
    }

    /// Assemble a segment from explicit tracks.
    pub fn with(apply: Path, train: Path, label: Path) -> Self {
        Self {
            apply,
            train,
            label,
        }
    }

    /// Apply track.
    pub fn apply(&self) -> &Path {
        &self.apply
    }

    /// Train track.
    pub fn train(&self) -> &Path {
        &self.train
    }

    /// Label track.
    pub fn label(&self) -> &Path {
        &self.label
    }

    /// Create a new segment by extending each track with the given path
    /// (tracks without an extension are retraced to their physical tail).
    pub fn extend(
        &self,
        apply: Option<Path>,
        train: Option<Path>,
        label: Option<Path>,
    ) -> Result<Segment> {
        Ok(Self {
            apply: match apply {
                Some(path) => self.apply.extend(&path)?,
                None => self.apply.retrace()?,
            },
            train: match train {
                Some(path) => self.train.extend(&path)?,
                None => self.train.retrace()?,
            },
            label: match label {
                Some(path) => self.label.extend(&path)?,
                None => self.label.retrace()?,
            },
        })
    }
}

// Node collector preserving discovery order.
struct Collect(Vec<Node>);

impl PreOrder for Collect {
    fn visit_node(&mut self, node: &Node) -> Result<()> {
        if !self.0.contains(node) {
            self.0.push(node.clone());
        }
        Ok(())
    }
}

/// All nodes of a path in discovery order.
pub(crate) fn nodes(path: &Path) -> Result<Vec<Node>> {
    let mut collector = Collect(Vec::new());
    path.accept(&mut collector)?;
    Ok(collector.0)
}

// A track that is still the untouched future placeholder.
fn trivial(path: &Path) -> bool {
    path.head() == path.tail()
        && path.head().is_future()
        && path.head().outputs().iter().all(Vec::is_empty)
}

// Append the right track; a closure absorbs trivial (empty) continuations.
fn extend_track(current: Path, right: Path) -> Result<Path> {
    if current.mode() == Mode::Closure && trivial(&right) {
        return Ok(current);
    }
    current.extend(&right)
}

/// Fully assembled pipeline: ETL head, operator segments and sink tail.
#[derive(Clone, Debug)]
pub struct Composition {
    apply: Path,
    train: Path,
    label: Path,
    shared: Vec<GroupId>,
}

impl Composition {
    /// Compose the given segments left to right.
    ///
    /// The apply tracks must chain into a single channel; training closures
    /// contributed by any segment are preserved on the train track. The
    /// shared worker set - groups appearing on both the apply and train
    /// tracks - is enumerated in apply-track discovery order.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Result<Self> {
        let mut segments = segments.into_iter();
        let first = segments
            .next()
            .ok_or_else(|| Error::Missing("Composition without segments".to_string()))?;
        let mut apply = first.apply;
        let mut train = first.train;
        let mut label = first.label;
        for segment in segments {
            apply = apply.extend(&segment.apply)?;
            train = extend_track(train, segment.train)?;
            label = extend_track(label, segment.label)?;
        }
        if apply.mode() != Mode::Channel {
            return Err(Error::Topology(
                "Composed apply track is not a channel".to_string(),
            ));
        }

        let train_groups: HashSet<GroupId> =
            nodes(&train)?.iter().filter_map(Node::group).collect();
        let mut shared = Vec::new();
        for node in nodes(&apply)? {
            if let Some(group) = node.group() {
                if train_groups.contains(&group) && !shared.contains(&group) {
                    shared.push(group);
                }
            }
        }
        tracing::debug!(shared = shared.len(), "Composed pipeline");

        Ok(Self {
            apply,
            train,
            label,
            shared,
        })
    }

    /// Apply track of the composition.
    pub fn apply(&self) -> &Path {
        &self.apply
    }

    /// Train track of the composition.
    pub fn train(&self) -> &Path {
        &self.train
    }

    /// Label track of the composition.
    pub fn label(&self) -> &Path {
        &self.label
    }

    /// Groups of the workers appearing on both the apply and train tracks -
    /// the actors whose state must be persisted per generation.
    pub fn shared(&self) -> &[GroupId] {
        &self.shared
    }
}
