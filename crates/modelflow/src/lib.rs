// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! ModelFlow - lifecycle management for datascience pipelines
//!
//! ModelFlow models a machine-learning project as a typed dataflow graph of
//! stateful train/apply actors and manages its whole lifecycle: graph
//! construction and composition, compilation into a linear task program,
//! and execution against a generation-versioned asset store.
//!
//! The crate is organized around four subsystems:
//!
//! - [`flow`] - the graph: actor nodes wired through named ports, the
//!   channel/closure path algebra, composable operators and pipeline
//!   assembly
//! - [`dsl`] - the relational algebra describing the data feed, rendered
//!   into a target query language (ANSI SQL reference)
//! - [`runtime`] - the compiler lowering compositions into symbol programs
//!   and the runner orchestration contract
//! - [`asset`] - the project/lineage/generation store snapshotting actor
//!   states per training generation
//!
//! # Example
//!
//! ```rust,ignore
//! use modelflow::flow::{Chain, Consumer, Mapper, Origin, Spec};
//! use modelflow::runtime::Runner;
//!
//! // A pipeline is composed right-to-left from operators.
//! let pipeline = Chain::new(
//!     Chain::new(Origin, Mapper::new(Spec::new("impute", params))),
//!     Consumer::new(Spec::new("model", params)),
//! );
//!
//! // A concrete runner trains a new generation and applies it.
//! runner.train(None, None)?;
//! runner.apply(None, None)?;
//! ```
//!
//! The core is single-threaded and synchronous; concrete feeds, sinks,
//! registries and runners are external providers implementing the seam
//! traits ([`io::Feed`], [`io::Sink`], [`asset::Registry`],
//! [`runtime::Runner`]).

pub mod asset;
pub mod dsl;
pub mod error;
pub mod flow;
pub mod io;
pub mod runtime;

pub use error::{Error, Result};
