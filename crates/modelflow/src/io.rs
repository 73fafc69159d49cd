// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Input/output seams of the runtime
//!
//! Concrete data backends live outside the core: a [`Feed`] understands the
//! project's DSL query (typically by rendering it through
//! [`crate::dsl::parser`]) and expands into the ETL segment producing the
//! apply/train/label streams; a [`Sink`] expands into the segment consuming
//! the pipeline output.

use crate::dsl::frame::Query;
use crate::dsl::kind::Value;
use crate::error::Result;
use crate::flow::pipeline::Segment;

/// Provider of the pipeline input data.
pub trait Feed: Send + Sync {
    /// ETL segment materializing the given query between the optional
    /// ordinal bounds (missing bounds mean an unbounded cycle).
    fn load(
        &self,
        source: &Query,
        lower: Option<&Value>,
        upper: Option<&Value>,
    ) -> Result<Segment>;
}

/// Consumer of the pipeline output data.
pub trait Sink: Send + Sync {
    /// Segment consuming the apply output.
    fn save(&self) -> Result<Segment>;
}
