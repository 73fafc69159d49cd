// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Frame algebra of the relational DSL
//!
//! Frames describe tabular sources: physical [`Table`] schemas, [`Query`]
//! projections with predicates/grouping/ordering, [`Join`] and [`Set`]
//! combinations and aliased [`Reference`]s. Like columns, frames are
//! immutable value objects; builder methods return new frames.

use std::sync::Arc;

use crate::dsl::kind::Kind;
use crate::dsl::series::{Column, Element, Field};
use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq, Hash)]
struct Schema {
    name: String,
    fields: Vec<(String, Kind)>,
}

/// Physical table schema.
///
/// Cheap to clone; all clones refer to the same schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Table(Arc<Schema>);

impl Table {
    /// Define a table schema with its typed fields.
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (impl Into<String>, Kind)>,
    ) -> Self {
        Self(Arc::new(Schema {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, kind)| (name.into(), kind))
                .collect(),
        }))
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Declared fields in schema order.
    pub fn fields(&self) -> &[(String, Kind)] {
        &self.0.fields
    }

    /// Column element for the named field.
    pub fn field(&self, name: &str) -> Result<Element> {
        let (name, kind) = self
            .0
            .fields
            .iter()
            .find(|(field, _)| field == name)
            .ok_or_else(|| {
                Error::Invalid(format!("No field {name} in table {}", self.0.name))
            })?;
        Ok(Element::Field(Field {
            table: self.0.name.clone(),
            name: name.clone(),
            kind: kind.clone(),
        }))
    }

    /// Start a query projecting the given columns off this table.
    pub fn select(&self, columns: impl IntoIterator<Item = impl Into<Column>>) -> Query {
        Source::from(self.clone()).select(columns)
    }
}

/// Join type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Left outer join
    Left,
    /// Right outer join
    Right,
    /// Inner join
    Inner,
    /// Full outer join
    Full,
    /// Cross join (no condition)
    Cross,
}

/// Set operation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetKind {
    /// Distinct union
    Union,
    /// Intersection
    Intersection,
    /// Difference
    Difference,
}

/// Ordering direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending order
    Ascending,
    /// Descending order
    Descending,
}

/// Single ordering specifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ordering {
    /// Element to order by
    pub element: Element,
    /// Ordering direction
    pub direction: Direction,
}

/// Row limit specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rows {
    /// Number of rows to take
    pub count: i64,
    /// Number of rows to skip first
    pub offset: i64,
}

/// Join of two frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Join {
    /// Left side of the join pair
    pub left: Source,
    /// Right side of the join pair
    pub right: Source,
    /// Join condition (absent for cross joins)
    pub condition: Option<Element>,
    /// Join type
    pub kind: JoinKind,
}

/// Set combination of two frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Set {
    /// Left side of the set pair
    pub left: Source,
    /// Right side of the set pair
    pub right: Source,
    /// Set operation type
    pub kind: SetKind,
}

/// Aliased subframe.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The wrapped frame
    pub source: Source,
    /// Alias the frame is referred to as
    pub alias: String,
}

/// Any tabular source a query can draw from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// Physical table
    Table(Table),
    /// Nested query
    Query(Box<Query>),
    /// Join of two frames
    Join(Box<Join>),
    /// Set combination of two frames
    Set(Box<Set>),
    /// Aliased subframe
    Reference(Box<Reference>),
}

impl Source {
    /// Start a query projecting the given columns off this source.
    pub fn select(self, columns: impl IntoIterator<Item = impl Into<Column>>) -> Query {
        Query {
            source: self,
            columns: columns.into_iter().map(Into::into).collect(),
            predicate: None,
            grouping: Vec::new(),
            condition: None,
            ordering: Vec::new(),
            rows: None,
        }
    }

    /// Join this frame with another under the given condition.
    ///
    /// Fails unless the condition is boolean-kinded. Use [`Source::cross_join`]
    /// for the condition-free cross product.
    pub fn join(self, right: impl Into<Source>, condition: Element, kind: JoinKind) -> Result<Source> {
        if kind == JoinKind::Cross {
            return Err(Error::Invalid(
                "Cross join does not take a condition".to_string(),
            ));
        }
        ensure_logical(&condition)?;
        Ok(Source::Join(Box::new(Join {
            left: self,
            right: right.into(),
            condition: Some(condition),
            kind,
        })))
    }

    /// Cross product of this frame with another.
    pub fn cross_join(self, right: impl Into<Source>) -> Source {
        Source::Join(Box::new(Join {
            left: self,
            right: right.into(),
            condition: None,
            kind: JoinKind::Cross,
        }))
    }

    /// Union of this frame with another.
    pub fn union(self, right: impl Into<Source>) -> Source {
        self.combine(right, SetKind::Union)
    }

    /// Intersection of this frame with another.
    pub fn intersection(self, right: impl Into<Source>) -> Source {
        self.combine(right, SetKind::Intersection)
    }

    /// Difference of this frame with another.
    pub fn difference(self, right: impl Into<Source>) -> Source {
        self.combine(right, SetKind::Difference)
    }

    fn combine(self, right: impl Into<Source>, kind: SetKind) -> Source {
        Source::Set(Box::new(Set {
            left: self,
            right: right.into(),
            kind,
        }))
    }

    /// Refer to this frame under an alias.
    pub fn reference(self, alias: impl Into<String>) -> Source {
        Source::Reference(Box::new(Reference {
            source: self,
            alias: alias.into(),
        }))
    }
}

impl From<Table> for Source {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<Query> for Source {
    fn from(query: Query) -> Self {
        Self::Query(Box::new(query))
    }
}

fn ensure_logical(element: &Element) -> Result<()> {
    let kind = element.kind();
    if kind != Kind::Boolean {
        return Err(Error::Invalid(format!("{kind} not a valid Boolean")));
    }
    Ok(())
}

/// Query specification: select list plus the optional predicates, grouping,
/// ordering and row limit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    /// Source frame the query draws from
    pub source: Source,
    /// Selected columns
    pub columns: Vec<Column>,
    /// Filtering predicate (`WHERE`)
    pub predicate: Option<Element>,
    /// Grouping specifiers
    pub grouping: Vec<Element>,
    /// Aggregate filtering predicate (`HAVING`)
    pub condition: Option<Element>,
    /// Ordering specifiers
    pub ordering: Vec<Ordering>,
    /// Row limit
    pub rows: Option<Rows>,
}

impl Query {
    /// Add a filtering predicate. The predicate must be boolean-kinded.
    pub fn filter(mut self, predicate: Element) -> Result<Query> {
        ensure_logical(&predicate)?;
        self.predicate = Some(predicate);
        Ok(self)
    }

    /// Add grouping specifiers.
    pub fn group_by(mut self, elements: impl IntoIterator<Item = impl Into<Element>>) -> Query {
        self.grouping = elements.into_iter().map(Into::into).collect();
        self
    }

    /// Add an aggregate filtering predicate. Must be boolean-kinded.
    pub fn having(mut self, condition: Element) -> Result<Query> {
        ensure_logical(&condition)?;
        self.condition = Some(condition);
        Ok(self)
    }

    /// Add ordering specifiers.
    pub fn order_by(
        mut self,
        ordering: impl IntoIterator<Item = (impl Into<Element>, Direction)>,
    ) -> Query {
        self.ordering = ordering
            .into_iter()
            .map(|(element, direction)| Ordering {
                element: element.into(),
                direction,
            })
            .collect();
        self
    }

    /// Limit the query to the given number of rows.
    pub fn limit(mut self, count: i64) -> Query {
        self.rows = Some(Rows { count, offset: 0 });
        self
    }

    /// Limit the query to `count` rows starting at `offset`.
    pub fn limit_from(mut self, offset: i64, count: i64) -> Query {
        self.rows = Some(Rows { count, offset });
        self
    }
}
