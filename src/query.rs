//! JSONPath filter queries used to validate JWT payloads during authentication.
//!
//! The accepted grammar, informally:
//!
//! ```text
//! Query     := '@.*' | '$[?(' Composed ')]' | '[?(' Composed ')]'
//! Composed  := Expr ( ('and' | 'or') Expr )*
//! Expr      := Predicate | '(' Composed ')'
//! Predicate := Operand Op Operand
//! Op        := '==' | '!=' | '<' | '<=' | '>' | '>=' | 'in' | 'nin' | 'anyof' | 'noneof'
//! Operand   := PathName | String | Number | 'null' | List
//! ```
//!
//! Whitespace between tokens is insignificant. The reserved `=~` operator is
//! recognized by the tokenizer and rejected with a positioned parse error.
//! Parsed queries are immutable and evaluation keeps all state on the stack,
//! so one query can serve concurrent authorization checks.

mod ast;
mod eval;
mod lexer;
mod parser;

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::QueryError, query::ast::Form};

/// A parsed, immutable filter query.
#[derive(Clone, Debug)]
pub struct JsonPathFilterQuery {
	source: String,
	form: Form,
}
impl JsonPathFilterQuery {
	/// Parses a query string.
	///
	/// Fails with a [`QueryError`] carrying the byte offset and reason on any
	/// grammar violation; parse failures are never absorbed internally.
	pub fn parse(query: &str) -> Result<Self, QueryError> {
		let form = parser::parse(query)?;

		Ok(Self { source: query.trim().to_owned(), form })
	}

	/// Evaluates the query against a JSON document.
	///
	/// Deterministic and pure: repeated invocation against the same document
	/// yields the same boolean. Structural failures inside a single leaf
	/// predicate are treated as false under the enclosing connector.
	pub fn matches(&self, json: &Value) -> bool {
		eval::matches(&self.form, json)
	}
}
impl Display for JsonPathFilterQuery {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.source)
	}
}
impl FromStr for JsonPathFilterQuery {
	type Err = QueryError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
