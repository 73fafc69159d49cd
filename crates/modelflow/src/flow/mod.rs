// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Typed dataflow graph of train/apply actors
//!
//! The flow layer models pipelines as graphs of actor [`node`]s wired
//! through named [`port`]s, viewed through the [`path`] algebra, built up by
//! composable [`operator`]s and assembled into executable [`pipeline`]
//! compositions.

pub mod node;
pub mod operator;
pub mod path;
pub mod pipeline;
pub mod port;

pub use node::{GroupId, Node, Spec};
pub use operator::{Builder, Chain, Composable, Consumer, Crossvalidated, Mapper, Operator, Origin};
pub use path::{Mode, Path, PreOrder};
pub use pipeline::{Composition, Segment};
pub use port::{Port, Publishable, Subscription};
