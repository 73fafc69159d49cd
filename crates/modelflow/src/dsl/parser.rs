// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! DSL rendering to a target query language
//!
//! The [`Bundle`] walks a query bottom-up, maintaining a stack of rendered
//! fragments: each column visit pops its operand fragments and pushes one
//! rendered string. The per-node emitters are supplied by a [`Dialect`];
//! [`Ansi`] is the reference ANSI SQL target.
//!
//! Operand fragments are parenthesized unless they are atomic (a single
//! identifier, a call or already-parenthesized form, or a typed literal) or
//! the operand is an arithmetic subexpression binding strictly tighter than
//! its arithmetic parent. The result is minimally parenthesized output that
//! parses back to the same tree under ANSI precedence: `a + b * 2` stays
//! flat while `(a + b) * c` keeps its parentheses.

use std::sync::OnceLock;

use regex::Regex;

use crate::dsl::frame::{Direction, JoinKind, Query, Rows, SetKind, Source, Table};
use crate::dsl::kind::{Kind, Value};
use crate::dsl::series::{Aliased, Column, Element, Expression, Field, Literal, Operation, Visitor};
use crate::error::{Error, Result};

/// Rendered fragment together with the operation that produced it (`None`
/// for fields, literals and aliased columns).
#[derive(Clone, Debug)]
pub struct Operand {
    /// Rendered text of the fragment
    pub text: String,
    /// Operation of the expression the fragment renders, if any
    pub operation: Option<Operation>,
}

/// Target-language emitter table.
///
/// One method per node type; the [`Bundle`] drives the traversal and hands
/// each emitter its already-rendered operands.
pub trait Dialect {
    /// Field reference code.
    fn field(&self, field: &Field) -> String;

    /// Literal value code.
    fn literal(&self, literal: &Literal) -> Result<String>;

    /// Expression code from rendered operands.
    fn expression(&self, operation: &Operation, operands: &[Operand]) -> Result<String>;

    /// Aliased column code.
    fn alias(&self, column: &str, alias: &str) -> String;

    /// Table reference code.
    fn table(&self, table: &Table) -> String;

    /// Aliased subframe code.
    fn reference(&self, source: &str, alias: &str) -> String;

    /// Join operation code.
    fn join(&self, left: &str, right: &str, condition: Option<&str>, kind: JoinKind) -> String;

    /// Set operation code.
    fn set(&self, left: &str, right: &str, kind: SetKind) -> String;

    /// Ordering specifier code.
    fn ordering(&self, column: &str, direction: Direction) -> String;

    /// Query statement code.
    #[allow(clippy::too_many_arguments)]
    fn query(
        &self,
        source: &str,
        columns: &[String],
        predicate: Option<&str>,
        grouping: &[String],
        condition: Option<&str>,
        ordering: &[String],
        rows: Option<Rows>,
    ) -> Result<String>;
}

/// Stack-based bottom-up renderer of queries against a [`Dialect`].
pub struct Bundle<'a, D: Dialect + ?Sized> {
    dialect: &'a D,
    stack: Vec<Operand>,
}

impl<'a, D: Dialect + ?Sized> Bundle<'a, D> {
    /// Create a renderer for the given dialect.
    pub fn new(dialect: &'a D) -> Self {
        Self {
            dialect,
            stack: Vec::new(),
        }
    }

    fn push(&mut self, text: String, operation: Option<Operation>) {
        self.stack.push(Operand { text, operation });
    }

    fn pop(&mut self, count: usize) -> Result<Vec<Operand>> {
        if self.stack.len() < count {
            return Err(Error::Invalid(format!(
                "Fragment stack underflow: {} < {count}",
                self.stack.len()
            )));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Render a single column.
    pub fn column(&mut self, column: &Column) -> Result<String> {
        column.accept(self)?;
        Ok(self.pop(1)?.remove(0).text)
    }

    /// Render a single element.
    pub fn element(&mut self, element: &Element) -> Result<String> {
        element.accept(self)?;
        Ok(self.pop(1)?.remove(0).text)
    }

    /// Render a frame source. Nested query frames are parenthesized.
    pub fn source(&mut self, source: &Source) -> Result<String> {
        Ok(match source {
            Source::Table(table) => self.dialect.table(table),
            Source::Query(query) => format!("({})", self.query(query)?),
            Source::Join(join) => {
                let left = self.source(&join.left)?;
                let right = self.source(&join.right)?;
                let condition = join
                    .condition
                    .as_ref()
                    .map(|condition| self.element(condition))
                    .transpose()?;
                self.dialect
                    .join(&left, &right, condition.as_deref(), join.kind)
            }
            Source::Set(set) => {
                let left = self.source(&set.left)?;
                let right = self.source(&set.right)?;
                self.dialect.set(&left, &right, set.kind)
            }
            Source::Reference(reference) => {
                let source = self.source(&reference.source)?;
                self.dialect.reference(&source, &reference.alias)
            }
        })
    }

    /// Render a full query statement.
    pub fn query(&mut self, query: &Query) -> Result<String> {
        let source = self.source(&query.source)?;
        let columns = query
            .columns
            .iter()
            .map(|column| self.column(column))
            .collect::<Result<Vec<_>>>()?;
        let predicate = query
            .predicate
            .as_ref()
            .map(|predicate| self.element(predicate))
            .transpose()?;
        let grouping = query
            .grouping
            .iter()
            .map(|element| self.element(element))
            .collect::<Result<Vec<_>>>()?;
        let condition = query
            .condition
            .as_ref()
            .map(|condition| self.element(condition))
            .transpose()?;
        let ordering = query
            .ordering
            .iter()
            .map(|ordering| {
                let column = self.element(&ordering.element)?;
                Ok(self.dialect.ordering(&column, ordering.direction))
            })
            .collect::<Result<Vec<_>>>()?;
        self.dialect.query(
            &source,
            &columns,
            predicate.as_deref(),
            &grouping,
            condition.as_deref(),
            &ordering,
            query.rows,
        )
    }
}

impl<D: Dialect + ?Sized> Visitor for Bundle<'_, D> {
    fn visit_field(&mut self, field: &Field) -> Result<()> {
        let text = self.dialect.field(field);
        self.push(text, None);
        Ok(())
    }

    fn visit_literal(&mut self, literal: &Literal) -> Result<()> {
        let text = self.dialect.literal(literal)?;
        self.push(text, None);
        Ok(())
    }

    fn visit_expression(&mut self, expression: &Expression) -> Result<()> {
        let operands = self.pop(expression.terms.len())?;
        let text = self.dialect.expression(&expression.operation, &operands)?;
        self.push(text, Some(expression.operation.clone()));
        Ok(())
    }

    fn visit_aliased(&mut self, aliased: &Aliased) -> Result<()> {
        let column = self.pop(1)?.remove(0);
        let text = self.dialect.alias(&column.text, &aliased.alias);
        self.push(text, None);
        Ok(())
    }
}

/// Render a query as an ANSI SQL select statement.
pub fn render(query: &Query) -> Result<String> {
    Bundle::new(&Ansi).query(query)
}

/// ANSI SQL reference dialect.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ansi;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// Atomic or already-parenthesized fragments: a single operator-free token,
// a call or parenthesized form, or a typed literal.
fn associative() -> &'static Regex {
    static ASSOCIATIVE: OnceLock<Regex> = OnceLock::new();
    // SAFETY: expect on a literal pattern that is known to compile
    #[allow(clippy::expect_used)]
    ASSOCIATIVE.get_or_init(|| {
        Regex::new(r"^\s*(?:\S*\(\s*[^-+*/%\s]+\s*.*\)|[^-+*/%\s]+|TIMESTAMP *'.+'|DATE *'.+')\s*$")
            .expect("valid associativity pattern")
    })
}

// Binding weight of arithmetic operators; everything else does not take part
// in precedence-based parenthesis elision.
fn weight(operation: &Operation) -> u8 {
    match operation {
        Operation::Multiplication | Operation::Division | Operation::Modulus => 2,
        Operation::Addition | Operation::Subtraction => 1,
        _ => 0,
    }
}

impl Ansi {
    fn clean(parent: &Operation, operand: &Operand) -> String {
        if associative().is_match(&operand.text) {
            return operand.text.clone();
        }
        if let Some(child) = &operand.operation {
            if parent.is_arithmetic() && child.is_arithmetic() && weight(child) > weight(parent) {
                return operand.text.clone();
            }
        }
        format!("({})", operand.text)
    }

    fn binary(operation: &Operation, symbol: &str, operands: &[Operand]) -> Result<String> {
        match operands {
            [left, right] => Ok(format!(
                "{} {symbol} {}",
                Self::clean(operation, left),
                Self::clean(operation, right)
            )),
            _ => Err(Error::Unsupported(format!(
                "Expecting two operands for {symbol}, got {}",
                operands.len()
            ))),
        }
    }

    fn unary(operation: &Operation, template: &str, operands: &[Operand]) -> Result<String> {
        match operands {
            [term] => Ok(template.replace("{}", &Self::clean(operation, term))),
            _ => Err(Error::Unsupported(format!(
                "Expecting one operand, got {}",
                operands.len()
            ))),
        }
    }

    fn kind(kind: &Kind) -> Result<&'static str> {
        Ok(match kind {
            Kind::Boolean => "BOOLEAN",
            Kind::Integer => "BIGINT",
            Kind::Float => "DOUBLE",
            Kind::Decimal => "DECIMAL",
            Kind::String => "VARCHAR",
            Kind::Date => "DATE",
            Kind::Timestamp => "TIMESTAMP",
            Kind::Array(_) => {
                return Err(Error::Unsupported(format!("Unsupported cast kind: {kind}")))
            }
        })
    }

    fn value(value: &Value) -> Result<String> {
        Ok(match value {
            Value::String(text) => format!("'{text}'"),
            Value::Integer(number) => format!("{number}"),
            Value::Float(number) => format!("{number:?}"),
            Value::Timestamp(timestamp) => {
                format!("TIMESTAMP '{}'", timestamp.format(TIMESTAMP_FORMAT))
            }
            Value::Date(date) => format!("DATE '{}'", date.format(DATE_FORMAT)),
            Value::Array(values) => {
                let rendered = values
                    .iter()
                    .map(Self::value)
                    .collect::<Result<Vec<_>>>()?;
                format!("ARRAY[{}]", rendered.join(", "))
            }
            Value::Boolean(_) => {
                return Err(Error::Unsupported(format!(
                    "Unsupported literal kind: {}",
                    value.kind()
                )))
            }
        })
    }
}

impl Dialect for Ansi {
    fn field(&self, field: &Field) -> String {
        field.name.clone()
    }

    fn literal(&self, literal: &Literal) -> Result<String> {
        Self::value(&literal.value)
    }

    fn expression(&self, operation: &Operation, operands: &[Operand]) -> Result<String> {
        match operation {
            Operation::Addition => Self::binary(operation, "+", operands),
            Operation::Subtraction => Self::binary(operation, "-", operands),
            Operation::Multiplication => Self::binary(operation, "*", operands),
            Operation::Division => Self::binary(operation, "/", operands),
            Operation::Modulus => Self::binary(operation, "%", operands),
            Operation::LessThan => Self::binary(operation, "<", operands),
            Operation::LessEqual => Self::binary(operation, "<=", operands),
            Operation::GreaterThan => Self::binary(operation, ">", operands),
            Operation::GreaterEqual => Self::binary(operation, ">=", operands),
            Operation::Equal => Self::binary(operation, "=", operands),
            Operation::NotEqual => Self::binary(operation, "!=", operands),
            Operation::And => Self::binary(operation, "AND", operands),
            Operation::Or => Self::binary(operation, "OR", operands),
            Operation::Not => Self::unary(operation, "NOT {}", operands),
            Operation::IsNull => Self::unary(operation, "{} IS NULL", operands),
            Operation::NotNull => Self::unary(operation, "{} IS NOT NULL", operands),
            Operation::Cast(kind) => match operands {
                [term] => Ok(format!(
                    "cast({} AS {})",
                    Self::clean(operation, term),
                    Self::kind(kind)?
                )),
                _ => Err(Error::Unsupported(format!(
                    "Expecting one cast operand, got {}",
                    operands.len()
                ))),
            },
            Operation::Count => match operands {
                [] => Ok("count(*)".to_string()),
                [term] => Ok(format!("count({})", Self::clean(operation, term))),
                _ => Err(Error::Unsupported(format!(
                    "Expecting at most one count operand, got {}",
                    operands.len()
                ))),
            },
        }
    }

    fn alias(&self, column: &str, alias: &str) -> String {
        format!("{column} AS {alias}")
    }

    fn table(&self, table: &Table) -> String {
        table.name().to_string()
    }

    fn reference(&self, source: &str, alias: &str) -> String {
        format!("{source} AS {alias}")
    }

    fn join(&self, left: &str, right: &str, condition: Option<&str>, kind: JoinKind) -> String {
        let kind = match kind {
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Inner => "INNER",
            JoinKind::Full => "FULL",
            JoinKind::Cross => "CROSS",
        };
        match condition {
            Some(condition) => format!("{left} {kind} JOIN {right} ON {condition}"),
            None => format!("{left} {kind} JOIN {right}"),
        }
    }

    fn set(&self, left: &str, right: &str, kind: SetKind) -> String {
        let kind = match kind {
            SetKind::Union => "UNION",
            SetKind::Intersection => "INTERSECT",
            SetKind::Difference => "EXCEPT",
        };
        format!("{left} {kind} {right}")
    }

    fn ordering(&self, column: &str, direction: Direction) -> String {
        let direction = match direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        format!("{column} {direction}")
    }

    fn query(
        &self,
        source: &str,
        columns: &[String],
        predicate: Option<&str>,
        grouping: &[String],
        condition: Option<&str>,
        ordering: &[String],
        rows: Option<Rows>,
    ) -> Result<String> {
        if columns.is_empty() {
            return Err(Error::Invalid("Expecting columns".to_string()));
        }
        let mut query = format!("SELECT {}\nFROM {source}", columns.join(", "));
        if let Some(predicate) = predicate {
            query.push_str(&format!("\nWHERE {predicate}"));
        }
        if !grouping.is_empty() {
            query.push_str(&format!("\nGROUP BY {}", grouping.join(", ")));
        }
        if let Some(condition) = condition {
            query.push_str(&format!("\nHAVING {condition}"));
        }
        if !ordering.is_empty() {
            query.push_str(&format!("\nORDER BY {}", ordering.join(", ")));
        }
        if let Some(rows) = rows {
            query.push_str("\nLIMIT");
            if rows.offset > 0 {
                query.push_str(&format!(" {},", rows.offset));
            }
            query.push_str(&format!(" {}", rows.count));
        }
        Ok(query)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::dsl::series::Element;

    fn table() -> Table {
        Table::new("T", [("a", Kind::Integer), ("b", Kind::Integer)])
    }

    fn literal(value: impl Into<Value>) -> Element {
        Element::Literal(Literal::new(value))
    }

    #[test]
    fn test_simple_select() {
        let t = table();
        let a = t.field("a").unwrap();
        let b = t.field("b").unwrap();
        let query = t
            .select([a.clone() + b * 2])
            .filter(a.gt(1) & t.field("b").unwrap().lt(3))
            .unwrap();
        assert_eq!(
            render(&query).unwrap(),
            "SELECT a + b * 2\nFROM T\nWHERE (a > 1) AND (b < 3)"
        );
    }

    #[test]
    fn test_precedence_parenthesization() {
        let t = table();
        let a = t.field("a").unwrap();
        let b = t.field("b").unwrap();
        let c = t.field("a").unwrap();

        // Lower-binding subexpression under a tighter parent keeps parentheses.
        let grouped = t.select([(a.clone() + b.clone()) * c.clone()]);
        assert_eq!(
            render(&grouped).unwrap(),
            "SELECT (a + b) * a\nFROM T"
        );

        // Flat addition needs none.
        let flat = t.select([a + b]);
        assert_eq!(render(&flat).unwrap(), "SELECT a + b\nFROM T");
    }

    #[test]
    fn test_literal_forms() {
        let t = table();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let query = t.select([
            literal(date),
            literal("x"),
            literal(vec![1i64, 2]),
        ]);
        assert_eq!(
            render(&query).unwrap(),
            "SELECT DATE '2024-06-01', 'x', ARRAY[1, 2]\nFROM T"
        );
    }

    #[test]
    fn test_timestamp_literal() {
        let t = table();
        let timestamp: NaiveDateTime = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let query = t.select([literal(timestamp)]);
        assert_eq!(
            render(&query).unwrap(),
            "SELECT TIMESTAMP '2021-01-01 00:00:00.000000'\nFROM T"
        );
    }

    #[test]
    fn test_boolean_literal_unsupported() {
        let t = table();
        let query = t.select([literal(true)]);
        assert!(matches!(render(&query), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_cast_and_count() {
        let t = table();
        let a = t.field("a").unwrap();
        let query = t.select([
            a.clone().cast(Kind::String),
            a.count(),
            Element::count_all(),
        ]);
        assert_eq!(
            render(&query).unwrap(),
            "SELECT cast(a AS VARCHAR), count(a), count(*)\nFROM T"
        );
    }

    #[test]
    fn test_null_tests_and_not() {
        let t = table();
        let a = t.field("a").unwrap();
        let predicate = !(a.clone().is_null()) & a.not_null();
        let query = t
            .select([t.field("a").unwrap()])
            .filter(predicate)
            .unwrap();
        assert_eq!(
            render(&query).unwrap(),
            "SELECT a\nFROM T\nWHERE (NOT (a IS NULL)) AND (a IS NOT NULL)"
        );
    }

    #[test]
    fn test_grouping_ordering_limit() {
        let t = table();
        let a = t.field("a").unwrap();
        let query = t
            .select([a.clone().into(), Element::count_all().alias("n")])
            .group_by([a.clone()])
            .having(t.field("a").unwrap().count().gt(1))
            .unwrap()
            .order_by([(a, Direction::Descending)])
            .limit_from(5, 10);
        assert_eq!(
            render(&query).unwrap(),
            "SELECT a, count(*) AS n\nFROM T\nGROUP BY a\nHAVING count(a) > 1\nORDER BY a DESC\nLIMIT 5, 10"
        );
    }

    #[test]
    fn test_join_and_set() {
        let t = table();
        let u = Table::new("U", [("a", Kind::Integer)]);
        let on = t.field("a").unwrap().eq(u.field("a").unwrap());
        let joined = Source::from(t.clone())
            .join(u.clone(), on, JoinKind::Left)
            .unwrap()
            .select([t.field("a").unwrap()]);
        assert_eq!(
            render(&joined).unwrap(),
            "SELECT a\nFROM T LEFT JOIN U ON a = a"
        );

        let set = Source::from(t.clone())
            .union(u)
            .select([t.field("a").unwrap()]);
        assert_eq!(render(&set).unwrap(), "SELECT a\nFROM T UNION U");
    }

    #[test]
    fn test_reference_and_nested_query() {
        let t = table();
        let inner = t.select([t.field("a").unwrap()]);
        let outer = Source::from(inner)
            .reference("x")
            .select([t.field("a").unwrap()]);
        assert_eq!(
            render(&outer).unwrap(),
            "SELECT a\nFROM (SELECT a\nFROM T) AS x"
        );
    }

    #[test]
    fn test_empty_select_rejected() {
        let t = table();
        let query = t.select(Vec::<Column>::new());
        assert!(matches!(render(&query), Err(Error::Invalid(_))));
    }
}
