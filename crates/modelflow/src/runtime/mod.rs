// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Runtime layer - runners orchestrating compiled pipelines
//!
//! A [`Runner`] ties the pieces together: it assembles a
//! [`Composition`](crate::flow::pipeline::Composition) from the feed's ETL
//! segment, the project pipeline and the sink, resolves a state handle for
//! the shared worker set, lowers the relevant tracks into a symbol program
//! and hands it to the implementation's [`run`](Runner::run) hook. Whether
//! symbols execute sequentially or concurrently is the implementation's
//! business - the program order already respects every data dependency.

pub mod code;
pub mod compiler;

use chrono::{DurationRound, TimeDelta};

use crate::asset::access::{Assets, State};
use crate::dsl::frame::Query;
use crate::dsl::kind::Value;
use crate::error::{Error, Result};
use crate::flow::operator::{Composable, Operator};
use crate::flow::pipeline::{Composition, Segment};
use crate::io::{Feed, Sink};
use crate::runtime::compiler::compile;

pub use code::{Instruction, Symbol};

// Microsecond-truncated current time (tags serialize with microsecond
// precision).
fn now() -> chrono::NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    now.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(now)
}

/// Pipeline orchestration contract.
///
/// Implementations provide the wiring accessors and the actual [`run`]
/// hook; the lifecycle entry points ([`train`], [`apply`], [`cvscore`])
/// are provided.
///
/// [`run`]: Runner::run
/// [`train`]: Runner::train
/// [`apply`]: Runner::apply
/// [`cvscore`]: Runner::cvscore
pub trait Runner {
    /// Assets of the addressed project generation.
    fn assets(&self) -> &Assets;

    /// Input data provider.
    fn feed(&self) -> &dyn Feed;

    /// Output data consumer.
    fn sink(&self) -> &dyn Sink;

    /// Project source descriptor (the DSL query the feed materializes).
    fn source(&self) -> &Query;

    /// Project pipeline.
    fn pipeline(&self) -> &dyn Composable;

    /// Optional evaluation operator composed around the pipeline by
    /// [`Runner::cvscore`].
    fn evaluation(&self) -> Option<&dyn Operator> {
        None
    }

    /// Execute a compiled symbol program against the optional state handle.
    fn run(&self, symbols: Vec<Symbol>, state: Option<State>) -> Result<()>;

    /// Run the training code.
    ///
    /// A missing lower bound is inherited from the previous generation's
    /// training ordinal. The successor generation is stamped with a fresh
    /// training timestamp (and the upper bound as its ordinal when given).
    fn train(&self, lower: Option<Value>, upper: Option<Value>) -> Result<()> {
        let tag = self.assets().tag()?;
        let lower = lower.or_else(|| tag.training.ordinal.clone());
        let composition =
            self.build(lower.as_ref(), upper.as_ref(), self.pipeline().expand()?)?;
        let mut replacement = tag.trigger_training(now());
        if upper.is_some() {
            replacement.training.ordinal = upper;
        }
        let state = self
            .assets()
            .state(composition.shared(), Some(replacement))?;
        let symbols = compile([composition.train(), composition.label()], Some(&state))?;
        self.run(symbols, Some(state))
    }

    /// Run the applying code. Bounds are forwarded to the feed unchanged.
    fn apply(&self, lower: Option<Value>, upper: Option<Value>) -> Result<()> {
        let composition =
            self.build(lower.as_ref(), upper.as_ref(), self.pipeline().expand()?)?;
        let state = self.assets().state(composition.shared(), None)?;
        let symbols = compile([composition.apply()], Some(&state))?;
        self.run(symbols, Some(state))
    }

    /// Run the crossvalidating evaluation: the train track of the
    /// evaluation-augmented pipeline, without touching persistent state.
    fn cvscore(&self, lower: Option<Value>, upper: Option<Value>) -> Result<()> {
        let evaluation = self
            .evaluation()
            .ok_or_else(|| Error::Missing("Project not evaluable".to_string()))?;
        let segment = evaluation.compose(self.pipeline())?;
        let composition = self.build(lower.as_ref(), upper.as_ref(), segment)?;
        let symbols = compile([composition.train(), composition.label()], None)?;
        self.run(symbols, None)
    }

    /// Assemble the composition: ETL cycle, pipeline blocks, sink.
    fn build(
        &self,
        lower: Option<&Value>,
        upper: Option<&Value>,
        segment: Segment,
    ) -> Result<Composition> {
        Composition::new([
            self.feed().load(self.source(), lower, upper)?,
            segment,
            self.sink().save()?,
        ])
    }
}
