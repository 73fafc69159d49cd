// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Versioned on-disk asset store
//!
//! Assets live in a three-level hierarchy: project, lineage (a packaged
//! project version) and generation (one training snapshot). Each generation
//! carries a [`tag::Tag`] with its mode metadata and state snapshot ids.
//! Byte-level persistence is pluggable through the [`registry::Registry`]
//! trait; [`access`] provides the runner-facing facade.

pub mod access;
pub mod directory;
pub mod registry;
pub mod tag;

pub use access::{Assets, State};
pub use directory::{Cache, Directory, GenerationKey, LineageKey, ProjectKey};
pub use registry::{Package, Posix, Registry, Volatile};
pub use tag::{Tag, Training, Tuning};
