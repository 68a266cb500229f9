//! Thread-safe evaluator for parsed filter queries.
//!
//! Evaluation walks the immutable predicate tree with stack-local state only.
//! Structural failures inside a leaf predicate (unsupported comparison, absent
//! required operand, deep path segment) are caught, logged at debug, and
//! treated as false under the enclosing connector so a malformed or partially
//! present token can never short-circuit an authorization decision open.

// std
use std::{cmp::Ordering, str::FromStr};
// crates.io
use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	query::ast::{Composed, Connector, Form, Node, Op, Operand, PathName, Predicate},
};

/// Structural failure confined to a single leaf predicate.
#[derive(Debug, ThisError)]
enum EvalError {
	/// Deep (`..`) segments are parsed but rejected during evaluation.
	#[error("Deep path segments are not supported: {path}.")]
	DeepSegment {
		/// Rendered path containing the deep segment.
		path: String,
	},
	/// The operand requires a present attribute but the path resolved to nothing.
	#[error("Attribute {path} is absent.")]
	Absent {
		/// Rendered path that failed to resolve.
		path: String,
	},
	/// The operand combination is not defined for this operator.
	#[error("Operand combination is not supported for this operator.")]
	Unsupported,
	/// The operator requires an array attribute.
	#[error("Attribute {path} is not an array.")]
	NotAnArray {
		/// Rendered path of the non-array attribute.
		path: String,
	},
}

/// Evaluates a parsed query form against a JSON document.
pub(crate) fn matches(form: &Form, json: &Value) -> bool {
	match form {
		Form::MatchAny => match json {
			Value::Object(map) => !map.is_empty(),
			Value::Array(items) => !items.is_empty(),
			_ => false,
		},
		Form::Filter(composed) => eval_composed(composed, json),
	}
}

fn eval_composed(composed: &Composed, json: &Value) -> bool {
	let mut running = false;

	for expr in &composed.exprs {
		match expr.connector {
			Connector::Lead => running = eval_node(&expr.node, json),
			Connector::And => {
				if !running {
					return false;
				}

				running = eval_node(&expr.node, json);
			},
			Connector::Or => {
				if running {
					return true;
				}

				running = eval_node(&expr.node, json);
			},
		}
	}

	running
}

fn eval_node(node: &Node, json: &Value) -> bool {
	match node {
		Node::Group(group) => eval_composed(group, json),
		Node::Leaf(predicate) => eval_predicate(predicate, json).unwrap_or_else(|error| {
			tracing::debug!(%error, "Treating unevaluable filter predicate as false.");

			false
		}),
	}
}

fn eval_predicate(predicate: &Predicate, json: &Value) -> Result<bool, EvalError> {
	let Predicate { lval, op, rval } = predicate;

	match op {
		Op::Eq => eval_eq(lval, rval, json),
		Op::Ne => Ok(!eval_eq(lval, rval, json)?),
		Op::Gt => eval_ordered(lval, rval, json, Ordering::Greater),
		Op::Lt => eval_ordered(lval, rval, json, Ordering::Less),
		Op::Le => Ok(!eval_ordered(lval, rval, json, Ordering::Greater)?),
		Op::Ge => Ok(!eval_ordered(lval, rval, json, Ordering::Less)?),
		Op::In => eval_in(lval, rval, json),
		Op::Nin => Ok(!eval_in(lval, rval, json)?),
		Op::AnyOf => eval_anyof(lval, rval, json),
		Op::NoneOf => Ok(!eval_anyof(lval, rval, json)?),
	}
}

/// Descends shallow segments; a missing segment yields an absent attribute.
fn resolve<'a>(path: &PathName, json: &'a Value) -> Result<Option<&'a Value>, EvalError> {
	let mut current = json;

	for segment in &path.segments {
		if segment.deep {
			return Err(EvalError::DeepSegment { path: path.render() });
		}

		match current.get(&segment.name) {
			Some(next) => current = next,
			None => return Ok(None),
		}
	}

	Ok(Some(current))
}

fn eval_eq(lval: &Operand, rval: &Operand, json: &Value) -> Result<bool, EvalError> {
	let Operand::Path(lpath) = lval else {
		return Err(EvalError::Unsupported);
	};
	let attr = resolve(lpath, json)?;

	match rval {
		Operand::Path(rpath) => {
			let other = resolve(rpath, json)?;

			Ok(match (attr, other) {
				// Two absent attributes carry no value to compare.
				(None, None) => false,
				(None, Some(Value::Null)) | (Some(Value::Null), None) => true,
				(None, Some(_)) | (Some(_), None) => false,
				(Some(a), Some(b)) => json_equal(a, b),
			})
		},
		Operand::Str(expected) =>
			Ok(matches!(attr, Some(Value::String(actual)) if actual == expected)),
		Operand::Number(expected) => Ok(match attr {
			Some(Value::Number(actual)) => decimal(actual)? == *expected,
			_ => false,
		}),
		Operand::Null => Ok(matches!(attr, None | Some(Value::Null))),
		Operand::List(_) => Err(EvalError::Unsupported),
	}
}

enum Rhs<'a> {
	Text(&'a str),
	Num(f64),
}

/// Ordered compare, defined for text/text (lexicographic) and number/number
/// (double compare; callers accept the precision loss of narrowing).
fn eval_ordered(
	lval: &Operand,
	rval: &Operand,
	json: &Value,
	want: Ordering,
) -> Result<bool, EvalError> {
	let Operand::Path(lpath) = lval else {
		return Err(EvalError::Unsupported);
	};
	let attr = resolve(lpath, json)?.ok_or_else(|| EvalError::Absent { path: lpath.render() })?;
	let rhs = match rval {
		Operand::Str(value) => Rhs::Text(value),
		Operand::Number(value) => Rhs::Num(value.to_f64().ok_or(EvalError::Unsupported)?),
		Operand::Path(rpath) => {
			let value =
				resolve(rpath, json)?.ok_or_else(|| EvalError::Absent { path: rpath.render() })?;

			match value {
				Value::String(text) => Rhs::Text(text),
				Value::Number(number) =>
					Rhs::Num(number.as_f64().ok_or(EvalError::Unsupported)?),
				_ => return Err(EvalError::Unsupported),
			}
		},
		_ => return Err(EvalError::Unsupported),
	};

	match (attr, rhs) {
		(Value::String(left), Rhs::Text(right)) => Ok(left.as_str().cmp(right) == want),
		(Value::Number(left), Rhs::Num(right)) => {
			let left = left.as_f64().ok_or(EvalError::Unsupported)?;

			Ok(left.partial_cmp(&right) == Some(want))
		},
		_ => Err(EvalError::Unsupported),
	}
}

/// The left side of a containment check, normalized for element comparison.
enum Needle<'a> {
	Value(&'a Value),
	Str(&'a str),
	Number(&'a BigDecimal),
	Null,
}

fn eval_in(lval: &Operand, rval: &Operand, json: &Value) -> Result<bool, EvalError> {
	let needle = match lval {
		Operand::Path(path) => match resolve(path, json)? {
			Some(value) => Needle::Value(value),
			// An absent attribute carries no value and behaves as null.
			None => Needle::Null,
		},
		Operand::Str(value) => Needle::Str(value),
		Operand::Number(value) => Needle::Number(value),
		Operand::Null => Needle::Null,
		Operand::List(_) => return Err(EvalError::Unsupported),
	};

	match rval {
		Operand::Path(rpath) => match resolve(rpath, json)? {
			Some(Value::Array(items)) =>
				Ok(items.iter().any(|item| needle_matches_value(&needle, item))),
			// A non-array (or absent) right side never contains anything.
			_ => Ok(false),
		},
		Operand::List(elements) =>
			Ok(elements.iter().any(|element| needle_matches_operand(&needle, element, json))),
		_ => Err(EvalError::Unsupported),
	}
}

fn eval_anyof(lval: &Operand, rval: &Operand, json: &Value) -> Result<bool, EvalError> {
	let Operand::Path(lpath) = lval else {
		return Err(EvalError::Unsupported);
	};
	let items = match resolve(lpath, json)? {
		Some(Value::Array(items)) => items,
		Some(_) => return Err(EvalError::NotAnArray { path: lpath.render() }),
		None => return Err(EvalError::Absent { path: lpath.render() }),
	};
	let Operand::List(elements) = rval else {
		return Err(EvalError::Unsupported);
	};

	Ok(items.iter().any(|item| {
		elements.iter().any(|element| needle_matches_operand(&Needle::Value(item), element, json))
	}))
}

fn needle_matches_value(needle: &Needle, item: &Value) -> bool {
	match needle {
		Needle::Value(value) => json_equal(value, item),
		Needle::Str(text) => matches!(item, Value::String(other) if other == text),
		Needle::Number(number) => matches!(
			item,
			Value::Number(other) if decimal(other).is_ok_and(|other| other == **number)
		),
		Needle::Null => item.is_null(),
	}
}

fn needle_matches_operand(needle: &Needle, element: &Operand, json: &Value) -> bool {
	match element {
		Operand::Str(text) => match needle {
			Needle::Value(Value::String(other)) => other == text,
			Needle::Str(other) => other == text,
			_ => false,
		},
		Operand::Number(number) => match needle {
			Needle::Value(Value::Number(other)) =>
				decimal(other).is_ok_and(|other| other == *number),
			Needle::Number(other) => *other == number,
			_ => false,
		},
		Operand::Null => matches!(needle, Needle::Null | Needle::Value(Value::Null)),
		Operand::Path(path) => match resolve(path, json) {
			Ok(Some(value)) => needle_matches_value(needle, value),
			_ => false,
		},
		Operand::List(_) => false,
	}
}

/// Natural equality: numbers compare as decimals, everything else structurally.
fn json_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Number(x), Value::Number(y)) =>
			matches!((decimal(x), decimal(y)), (Ok(x), Ok(y)) if x == y),
		_ => a == b,
	}
}

/// Lifts a JSON number into an arbitrary-precision decimal.
fn decimal(number: &serde_json::Number) -> Result<BigDecimal, EvalError> {
	BigDecimal::from_str(&number.to_string()).map_err(|_| EvalError::Unsupported)
}
