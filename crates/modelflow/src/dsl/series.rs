// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Column algebra of the relational DSL
//!
//! Columns are immutable expression trees: schema [`Field`]s, [`Literal`]
//! values and [`Expression`] nodes composed of an [`Operation`] over element
//! operands. An [`Aliased`] wrapper names any element for the select list.
//!
//! Operators build trees, they never evaluate anything. Arithmetic is
//! available through the standard operator traits (`a + b * 2`), logical
//! conjunction through `&`/`|`/`!`, and comparisons through the explicit
//! constructors (`a.gt(1)`). Equality of elements is *identity* equality
//! (structural, floats by bit pattern) so expressions can key hash maps;
//! the data-level equality predicate is the [`Element::eq`] constructor and
//! only materializes at rendering time.

use std::collections::HashSet;

use crate::dsl::kind::{Kind, Value};
use crate::error::Result;

/// Operator or function forming an [`Expression`] node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `+`
    Addition,
    /// `-`
    Subtraction,
    /// `*`
    Multiplication,
    /// `/`
    Division,
    /// `%`
    Modulus,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    NotNull,
    /// Logical conjunction
    And,
    /// Logical disjunction
    Or,
    /// Logical negation
    Not,
    /// Type conversion to the carried kind
    Cast(Kind),
    /// Row count aggregation (`count(*)` when the term list is empty)
    Count,
}

impl Operation {
    /// True for operators subject to numeric kind promotion.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Addition
                | Self::Subtraction
                | Self::Multiplication
                | Self::Division
                | Self::Modulus
        )
    }

    /// True for operators producing a boolean result.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::LessThan
                | Self::LessEqual
                | Self::GreaterThan
                | Self::GreaterEqual
                | Self::Equal
                | Self::NotEqual
                | Self::IsNull
                | Self::NotNull
                | Self::And
                | Self::Or
                | Self::Not
        )
    }
}

/// Schema field bound to its table by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    /// Name of the owning table
    pub table: String,
    /// Field name within the table schema
    pub name: String,
    /// Declared field kind
    pub kind: Kind,
}

impl Field {
    /// Extract the set of fields referenced anywhere inside the given columns.
    pub fn disect<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Result<HashSet<Field>> {
        struct Collect(HashSet<Field>);

        impl Visitor for Collect {
            fn visit_field(&mut self, field: &Field) -> Result<()> {
                self.0.insert(field.clone());
                Ok(())
            }
        }

        let mut collector = Collect(HashSet::new());
        for column in columns {
            column.accept(&mut collector)?;
        }
        Ok(collector.0)
    }
}

/// Literal value with its reflected kind.
///
/// String literals are rendered verbatim by the SQL dialect; the caller
/// guarantees they contain no single quotes (escaping is the feed driver's
/// responsibility).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    /// Native payload
    pub value: Value,
    /// Kind reflected from the payload
    pub kind: Kind,
}

impl Literal {
    /// Create a literal, reflecting its kind from the value.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = value.kind();
        tracing::debug!(kind = %kind, "Reflected literal kind");
        Self { value, kind }
    }

    /// Extract the set of literals used anywhere inside the given columns.
    pub fn disect<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Result<HashSet<Literal>> {
        struct Collect(HashSet<Literal>);

        impl Visitor for Collect {
            fn visit_literal(&mut self, literal: &Literal) -> Result<()> {
                self.0.insert(literal.clone());
                Ok(())
            }
        }

        let mut collector = Collect(HashSet::new());
        for column in columns {
            column.accept(&mut collector)?;
        }
        Ok(collector.0)
    }
}

/// Expression node: an [`Operation`] applied to element operands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expression {
    /// Operator or function implementing the expression
    pub operation: Operation,
    /// Operand subtrees, in operator order
    pub terms: Vec<Element>,
}

impl Expression {
    /// Extract the set of expression nodes inside the given columns.
    pub fn disect<'a>(
        columns: impl IntoIterator<Item = &'a Column>,
    ) -> Result<HashSet<Expression>> {
        struct Collect(HashSet<Expression>);

        impl Visitor for Collect {
            fn visit_expression(&mut self, expression: &Expression) -> Result<()> {
                self.0.insert(expression.clone());
                Ok(())
            }
        }

        let mut collector = Collect(HashSet::new());
        for column in columns {
            column.accept(&mut collector)?;
        }
        Ok(collector.0)
    }
}

/// Any non-aliased column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    /// Schema field reference
    Field(Field),
    /// Literal value
    Literal(Literal),
    /// Composite expression
    Expression(Expression),
}

impl Element {
    fn binary(operation: Operation, left: Element, right: Element) -> Element {
        Element::Expression(Expression {
            operation,
            terms: vec![left, right],
        })
    }

    fn unary(operation: Operation, term: Element) -> Element {
        Element::Expression(Expression {
            operation,
            terms: vec![term],
        })
    }

    /// Kind of the value this element produces.
    ///
    /// Logical operators yield [`Kind::Boolean`]; arithmetic promotes to the
    /// highest-cardinality operand kind; `cast` yields its target kind and
    /// `count` yields [`Kind::Integer`].
    pub fn kind(&self) -> Kind {
        match self {
            Self::Field(field) => field.kind.clone(),
            Self::Literal(literal) => literal.kind.clone(),
            Self::Expression(expression) => match &expression.operation {
                Operation::Cast(kind) => kind.clone(),
                Operation::Count => Kind::Integer,
                operation if operation.is_logical() => Kind::Boolean,
                _ => expression
                    .terms
                    .iter()
                    .map(Element::kind)
                    .max_by_key(Kind::cardinality)
                    .unwrap_or(Kind::Integer),
            },
        }
    }

    /// Name of the element (fields only; expressions and literals are
    /// nameless without explicit aliasing).
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Field(field) => Some(&field.name),
            _ => None,
        }
    }

    /// Use an alias for this element.
    pub fn alias(self, alias: impl Into<String>) -> Column {
        Column::Aliased(Aliased {
            element: self,
            alias: alias.into(),
        })
    }

    /// Type conversion expression.
    pub fn cast(self, kind: Kind) -> Element {
        Element::Expression(Expression {
            operation: Operation::Cast(kind),
            terms: vec![self],
        })
    }

    /// Count aggregation over this element.
    pub fn count(self) -> Element {
        Element::Expression(Expression {
            operation: Operation::Count,
            terms: vec![self],
        })
    }

    /// Row count aggregation (`count(*)`).
    pub fn count_all() -> Element {
        Element::Expression(Expression {
            operation: Operation::Count,
            terms: Vec::new(),
        })
    }

    /// Null test expression.
    pub fn is_null(self) -> Element {
        Self::unary(Operation::IsNull, self)
    }

    /// Non-null test expression.
    pub fn not_null(self) -> Element {
        Self::unary(Operation::NotNull, self)
    }

    /// Logical conjunction (also available as the `&` operator).
    pub fn and(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::And, self, other.into())
    }

    /// Logical disjunction (also available as the `|` operator).
    pub fn or(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::Or, self, other.into())
    }
}

// Comparison constructors. These intentionally shadow the `PartialEq` method
// names: `a.eq(b)` builds the data-level predicate tree while `a == b` stays
// the structural identity equality used for keying.
#[allow(clippy::should_implement_trait)]
impl Element {
    /// Equality predicate expression.
    pub fn eq(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::Equal, self, other.into())
    }

    /// Inequality predicate expression.
    pub fn ne(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::NotEqual, self, other.into())
    }

    /// Less-than predicate expression.
    pub fn lt(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::LessThan, self, other.into())
    }

    /// Less-or-equal predicate expression.
    pub fn le(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::LessEqual, self, other.into())
    }

    /// Greater-than predicate expression.
    pub fn gt(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::GreaterThan, self, other.into())
    }

    /// Greater-or-equal predicate expression.
    pub fn ge(self, other: impl Into<Element>) -> Element {
        Self::binary(Operation::GreaterEqual, self, other.into())
    }
}

impl<R: Into<Element>> std::ops::Add<R> for Element {
    type Output = Element;

    fn add(self, rhs: R) -> Element {
        Self::binary(Operation::Addition, self, rhs.into())
    }
}

impl<R: Into<Element>> std::ops::Sub<R> for Element {
    type Output = Element;

    fn sub(self, rhs: R) -> Element {
        Self::binary(Operation::Subtraction, self, rhs.into())
    }
}

impl<R: Into<Element>> std::ops::Mul<R> for Element {
    type Output = Element;

    fn mul(self, rhs: R) -> Element {
        Self::binary(Operation::Multiplication, self, rhs.into())
    }
}

impl<R: Into<Element>> std::ops::Div<R> for Element {
    type Output = Element;

    fn div(self, rhs: R) -> Element {
        Self::binary(Operation::Division, self, rhs.into())
    }
}

impl<R: Into<Element>> std::ops::Rem<R> for Element {
    type Output = Element;

    fn rem(self, rhs: R) -> Element {
        Self::binary(Operation::Modulus, self, rhs.into())
    }
}

impl<R: Into<Element>> std::ops::BitAnd<R> for Element {
    type Output = Element;

    fn bitand(self, rhs: R) -> Element {
        self.and(rhs)
    }
}

impl<R: Into<Element>> std::ops::BitOr<R> for Element {
    type Output = Element;

    fn bitor(self, rhs: R) -> Element {
        self.or(rhs)
    }
}

impl std::ops::Not for Element {
    type Output = Element;

    fn not(self) -> Element {
        Self::unary(Operation::Not, self)
    }
}

impl From<Field> for Element {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<Literal> for Element {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<Expression> for Element {
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

impl From<Value> for Element {
    fn from(value: Value) -> Self {
        Self::Literal(Literal::new(value))
    }
}

macro_rules! literal_from {
    ($($native:ty),*) => {
        $(impl From<$native> for Element {
            fn from(value: $native) -> Self {
                Self::Literal(Literal::new(value))
            }
        })*
    };
}

literal_from!(
    bool,
    i32,
    i64,
    f64,
    &str,
    String,
    chrono::NaiveDate,
    chrono::NaiveDateTime
);

/// Aliased column for the select list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Aliased {
    /// The wrapped element
    pub element: Element,
    /// Name to expose the element under
    pub alias: String,
}

/// Any column usable in a select list: a plain element or an aliased one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// Non-aliased element
    Element(Element),
    /// Aliased element
    Aliased(Aliased),
}

impl Column {
    /// The underlying element (aliases are transparent).
    pub fn element(&self) -> &Element {
        match self {
            Self::Element(element) => element,
            Self::Aliased(aliased) => &aliased.element,
        }
    }

    /// Kind of the column value.
    pub fn kind(&self) -> Kind {
        self.element().kind()
    }

    /// Column name: the alias, or the field name for plain fields.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Element(element) => element.name(),
            Self::Aliased(aliased) => Some(&aliased.alias),
        }
    }
}

impl From<Element> for Column {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<Aliased> for Column {
    fn from(aliased: Aliased) -> Self {
        Self::Aliased(aliased)
    }
}

/// Column tree visitor with post-order delivery: operand subtrees are always
/// visited before the composite that contains them.
pub trait Visitor {
    /// Field hook.
    fn visit_field(&mut self, field: &Field) -> Result<()> {
        let _ = field;
        Ok(())
    }

    /// Literal hook.
    fn visit_literal(&mut self, literal: &Literal) -> Result<()> {
        let _ = literal;
        Ok(())
    }

    /// Expression hook, called after all its terms.
    fn visit_expression(&mut self, expression: &Expression) -> Result<()> {
        let _ = expression;
        Ok(())
    }

    /// Alias hook, called after the wrapped element.
    fn visit_aliased(&mut self, aliased: &Aliased) -> Result<()> {
        let _ = aliased;
        Ok(())
    }
}

impl Element {
    /// Visitor acceptor (post-order).
    pub fn accept(&self, visitor: &mut dyn Visitor) -> Result<()> {
        match self {
            Self::Field(field) => visitor.visit_field(field),
            Self::Literal(literal) => visitor.visit_literal(literal),
            Self::Expression(expression) => {
                for term in &expression.terms {
                    term.accept(visitor)?;
                }
                visitor.visit_expression(expression)
            }
        }
    }
}

impl Column {
    /// Visitor acceptor (post-order).
    pub fn accept(&self, visitor: &mut dyn Visitor) -> Result<()> {
        match self {
            Self::Element(element) => element.accept(visitor),
            Self::Aliased(aliased) => {
                aliased.element.accept(visitor)?;
                visitor.visit_aliased(aliased)
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: Kind) -> Element {
        Element::Field(Field {
            table: "t".to_string(),
            name: name.to_string(),
            kind,
        })
    }

    #[test]
    fn test_arithmetic_promotion() {
        let int = field("a", Kind::Integer);
        let float = field("b", Kind::Float);
        assert_eq!((int.clone() + float).kind(), Kind::Float);
        assert_eq!((int.clone() * 2).kind(), Kind::Integer);
        assert_eq!(int.cast(Kind::Decimal).kind(), Kind::Decimal);
    }

    #[test]
    fn test_logical_kind() {
        let a = field("a", Kind::Integer);
        let b = field("b", Kind::Integer);
        let predicate = a.gt(1) & b.lt(3);
        assert_eq!(predicate.kind(), Kind::Boolean);
        assert_eq!((!predicate).kind(), Kind::Boolean);
    }

    #[test]
    fn test_identity_equality() {
        // `==` is structural identity, usable for keying; `.eq()` builds the
        // data-level predicate instead.
        let a = field("a", Kind::Integer);
        assert_eq!(a.clone(), a.clone());
        let predicate = a.clone().eq(a);
        assert!(matches!(
            predicate,
            Element::Expression(Expression {
                operation: Operation::Equal,
                ..
            })
        ));
    }

    #[test]
    fn test_post_order_visit() {
        struct Trace(Vec<String>);

        impl Visitor for Trace {
            fn visit_field(&mut self, field: &Field) -> Result<()> {
                self.0.push(field.name.clone());
                Ok(())
            }

            fn visit_literal(&mut self, _: &Literal) -> Result<()> {
                self.0.push("lit".to_string());
                Ok(())
            }

            fn visit_expression(&mut self, _: &Expression) -> Result<()> {
                self.0.push("expr".to_string());
                Ok(())
            }
        }

        let a = field("a", Kind::Integer);
        let b = field("b", Kind::Integer);
        let column: Column = (a + b * 2).into();
        let mut trace = Trace(Vec::new());
        column.accept(&mut trace).unwrap();
        // Terms strictly before their composite, depth first.
        assert_eq!(trace.0, vec!["a", "b", "lit", "expr", "expr"]);
    }

    #[test]
    fn test_disect() {
        let a = field("a", Kind::Integer);
        let b = field("b", Kind::Integer);
        let columns: Vec<Column> = vec![(a.clone() + b.clone()).into(), a.clone().gt(1).into()];
        let fields = Field::disect(&columns).unwrap();
        assert_eq!(fields.len(), 2);
        let literals = Literal::disect(&columns).unwrap();
        assert_eq!(literals.len(), 1);
    }

    #[test]
    fn test_aliasing() {
        let a = field("a", Kind::Integer);
        let column = (a + 1).alias("b");
        assert_eq!(column.name(), Some("b"));
        assert_eq!(column.kind(), Kind::Integer);
    }

    #[test]
    fn test_count_shapes() {
        let star = Element::count_all();
        assert_eq!(star.kind(), Kind::Integer);
        let counted = field("a", Kind::String).count();
        assert_eq!(counted.kind(), Kind::Integer);
    }
}
