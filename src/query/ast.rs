//! Predicate tree produced by the filter-query parser.

// crates.io
use bigdecimal::BigDecimal;

/// Parsed query form.
#[derive(Clone, Debug)]
pub(crate) enum Form {
	/// The `@.*` wildcard: matches any document with at least one member.
	MatchAny,
	/// A `[?( ... )]` filter expression.
	Filter(Composed),
}

/// Non-empty sequence of connector-joined expressions.
#[derive(Clone, Debug)]
pub(crate) struct Composed {
	pub(crate) exprs: Vec<Expression>,
}

/// One element of a composed predicate with its joining connector.
#[derive(Clone, Debug)]
pub(crate) struct Expression {
	/// Connector to the running value; [`Connector::Lead`] for the first element.
	pub(crate) connector: Connector,
	pub(crate) node: Node,
}

/// Logical connector joining an expression to the expressions before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Connector {
	/// First expression of a group; its result seeds the running value.
	Lead,
	And,
	Or,
}

/// Either a parenthesized group or a leaf predicate.
#[derive(Clone, Debug)]
pub(crate) enum Node {
	Group(Composed),
	Leaf(Predicate),
}

/// A single `lval op rval` comparison.
#[derive(Clone, Debug)]
pub(crate) struct Predicate {
	pub(crate) lval: Operand,
	pub(crate) op: Op,
	pub(crate) rval: Operand,
}

/// Comparison operators supported by the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	Nin,
	AnyOf,
	NoneOf,
}

/// Leaf operand kinds.
#[derive(Clone, Debug)]
pub(crate) enum Operand {
	Path(PathName),
	Str(String),
	Number(BigDecimal),
	Null,
	List(Vec<Operand>),
}

/// Ordered attribute path rooted at the document (`@`).
#[derive(Clone, Debug)]
pub(crate) struct PathName {
	pub(crate) segments: Vec<Segment>,
}
impl PathName {
	/// Dotted rendering for log and error messages.
	pub(crate) fn render(&self) -> String {
		let mut out = String::from("@");

		for segment in &self.segments {
			out.push_str(if segment.deep { ".." } else { "." });
			out.push_str(&segment.name);
		}

		out
	}
}

/// One path step, shallow (`.name`) or deep (`..name`).
#[derive(Clone, Debug)]
pub(crate) struct Segment {
	pub(crate) name: String,
	pub(crate) deep: bool,
}
