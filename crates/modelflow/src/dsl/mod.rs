// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Relational DSL describing the data feed
//!
//! The DSL is a typed expression algebra over table schemas: [`series`]
//! provides the column algebra, [`frame`] the tabular sources and query
//! composition, [`kind`] the type system and [`parser`] the rendering into a
//! target query language (ANSI SQL reference).

pub mod frame;
pub mod kind;
pub mod parser;
pub mod series;

pub use frame::{Direction, JoinKind, Ordering, Query, Rows, SetKind, Source, Table};
pub use kind::{Kind, Value};
pub use parser::{render, Ansi, Bundle, Dialect};
pub use series::{Aliased, Column, Element, Expression, Field, Literal, Operation, Visitor};
