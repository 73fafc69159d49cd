// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Compiled task program representation
//!
//! A compiled path is a linear sequence of [`Symbol`]s. Each symbol names an
//! [`Instruction`] and the indices of the earlier symbols whose outputs it
//! consumes; any schedule respecting those data dependencies is a legal
//! execution.

use uuid::Uuid;

use crate::flow::node::{GroupId, Spec};

/// Single instruction of a compiled program.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Load the persisted state blob of a worker group
    Loader {
        /// Worker group whose state is loaded
        group: GroupId,
        /// Bound state id within the addressed generation
        sid: Uuid,
    },
    /// Invoke an actor's apply operation
    Applier {
        /// Actor specification
        spec: Spec,
        /// Worker group of the invocation
        group: GroupId,
    },
    /// Invoke an actor's train operation
    Trainer {
        /// Actor specification
        spec: Spec,
        /// Worker group of the invocation
        group: GroupId,
    },
    /// Persist a freshly trained state blob
    Dumper {
        /// Worker group whose state is persisted
        group: GroupId,
    },
    /// Publish the generation once all dumps completed (tag written last)
    Committer,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loader { group, .. } => write!(f, "load({group})"),
            Self::Applier { spec, .. } => write!(f, "apply({spec})"),
            Self::Trainer { spec, .. } => write!(f, "train({spec})"),
            Self::Dumper { group } => write!(f, "dump({group})"),
            Self::Committer => write!(f, "commit"),
        }
    }
}

/// Instruction plus the symbol indices of its operands.
#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    /// The instruction to execute
    pub instruction: Instruction,
    /// Indices of the symbols producing this instruction's operands
    pub arguments: Vec<usize>,
}

impl Symbol {
    /// Assemble a symbol.
    pub fn new(instruction: Instruction, arguments: Vec<usize>) -> Self {
        Self {
            instruction,
            arguments,
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:?}", self.instruction, self.arguments)
    }
}
