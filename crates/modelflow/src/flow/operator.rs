// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Operators - composable pipeline units
//!
//! An [`Operator`] expands into a pipeline [`Segment`] given its left-hand
//! composition; a [`Composable`] is anything that can produce a segment on
//! its own. Composition is right-to-left: chaining `left` with `right`
//! means `right.compose(left)`. Operators are pure with respect to their
//! input - they expand `left` into fresh nodes instead of mutating it.
//!
//! The module ships the two elementary operators every pipeline is made of
//! ([`Mapper`] transformers and terminal [`Consumer`] estimators) and the
//! [`Crossvalidated`] folding base for compound crossvalidation operators.

use crate::error::Result;
use crate::flow::node::{Node, Spec};
use crate::flow::path::Path;
use crate::flow::pipeline::Segment;
use crate::flow::port::Port;

/// Anything that can expand itself into a pipeline segment.
pub trait Composable: Send + Sync {
    /// Expand into a fresh segment.
    fn expand(&self) -> Result<Segment>;
}

/// Composable pipeline unit taking a left-hand composition.
pub trait Operator: Send + Sync {
    /// Compose this operator with the left-hand side, returning a fully
    /// resolved segment. Must not mutate `left` - expansions only.
    fn compose(&self, left: &dyn Composable) -> Result<Segment>;
}

/// Leftmost composition unit expanding into an empty segment.
#[derive(Clone, Copy, Debug, Default)]
pub struct Origin;

impl Composable for Origin {
    fn expand(&self) -> Result<Segment> {
        Segment::new()
    }
}

/// Right-to-left chaining of a composable with an operator.
pub struct Chain {
    left: Box<dyn Composable>,
    right: Box<dyn Operator>,
}

impl Chain {
    /// Chain `left` into `right` (expansion runs `right.compose(left)`).
    pub fn new(left: impl Composable + 'static, right: impl Operator + 'static) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl Composable for Chain {
    fn expand(&self) -> Result<Segment> {
        self.right.compose(self.left.as_ref())
    }
}

/// Transformer operator: the same actor appears on the apply and train
/// tracks (as forks sharing one group), with a third fork trained from the
/// incoming train/label data when the actor is stateful.
#[derive(Clone, Debug)]
pub struct Mapper {
    spec: Spec,
    stateful: bool,
}

impl Mapper {
    /// Stateful transformer (fitted on the train data before transforming).
    pub fn new(spec: Spec) -> Self {
        Self {
            spec,
            stateful: true,
        }
    }

    /// Stateless transformer (no training appearance).
    pub fn stateless(spec: Spec) -> Self {
        Self {
            spec,
            stateful: false,
        }
    }
}

impl Operator for Mapper {
    fn compose(&self, left: &dyn Composable) -> Result<Segment> {
        let left = left.expand()?;
        let apply = Node::worker(self.spec.clone(), 1, 1);
        let train = apply.fork()?;
        if self.stateful {
            let trainer = apply.fork()?;
            trainer.train(&left.train().publisher()?, &left.label().publisher()?)?;
        }
        left.extend(Some(Path::new(apply)?), Some(Path::new(train)?), None)
    }
}

/// Terminal estimator operator: a trainer consuming the train/label tracks
/// and an applier (same group) producing the apply output.
#[derive(Clone, Debug)]
pub struct Consumer {
    spec: Spec,
}

impl Consumer {
    /// Estimator bound to the given actor spec.
    pub fn new(spec: Spec) -> Self {
        Self { spec }
    }
}

impl Operator for Consumer {
    fn compose(&self, left: &dyn Composable) -> Result<Segment> {
        let left = left.expand()?;
        let apply = Node::worker(self.spec.clone(), 1, 1);
        let trainer = apply.fork()?;
        trainer.train(&left.train().publisher()?, &left.label().publisher()?)?;
        left.extend(Some(Path::new(apply)?), None, None)
    }
}

/// Finalization context handed to a [`Crossvalidated`] implementation.
pub trait Builder {
    /// Finalize the folding composition into a segment.
    fn build(self) -> Result<Segment>;
}

/// Generic crossvalidating operator base.
///
/// The provided [`compose`](Crossvalidated::compose) binds a train/test
/// splitter actor with one output pair per fold, trains it from the head
/// segment and forks it twice for the features and labels streams; each
/// fold receives a fresh inner expansion wired by the implementation's
/// [`fold`](Crossvalidated::fold) hook, and the implementation's
/// [`Builder`] finalizes the segment. Implementations typically forward
/// their [`Operator::compose`] here.
pub trait Crossvalidated: Send + Sync {
    /// Folding context type.
    type Builder: Builder;

    /// Actor spec of the train/test splitter.
    fn splitter(&self) -> Spec;

    /// Number of folds.
    fn nsplits(&self) -> usize;

    /// Create the folding context for the head segment and an exclusive
    /// inner expansion.
    fn builder(&self, head: Segment, inner: Segment) -> Result<Self::Builder>;

    /// Wire a single fold: subscribe the fold's features/labels outputs into
    /// the inner segment and register its output with the builder.
    fn fold(
        &self,
        index: usize,
        builder: &mut Self::Builder,
        inner: Segment,
        features: &Node,
        labels: &Node,
    ) -> Result<()>;

    /// Folding composition algorithm (see the trait documentation).
    fn compose(&self, left: &dyn Composable) -> Result<Segment> {
        let nsplits = self.nsplits();
        let head = Segment::new()?;
        let splitter = Node::worker(self.splitter(), 1, 2 * nsplits);
        splitter.train(&head.train().publisher()?, &head.label().publisher()?)?;
        let features = splitter.fork()?;
        features.subscribe(Port::Apply(0), &head.train().publisher()?)?;
        let labels = splitter.fork()?;
        labels.subscribe(Port::Apply(0), &head.label().publisher()?)?;

        let mut builder = self.builder(head, left.expand()?)?;
        for index in 0..nsplits {
            let inner = left.expand()?;
            self.fold(index, &mut builder, inner, &features, &labels)?;
        }
        builder.build()
    }
}
