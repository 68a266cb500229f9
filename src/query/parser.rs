//! Recursive-descent parser producing the filter predicate tree.

// self
use crate::{
	error::QueryError,
	query::{
		ast::{Composed, Connector, Expression, Form, Node, Op, Operand, Predicate},
		lexer::{self, Token, TokenKind},
	},
};

/// Parses a full query string into its immutable form.
pub(crate) fn parse(input: &str) -> Result<Form, QueryError> {
	let trimmed = input.trim();

	if trimmed.is_empty() {
		return Err(QueryError::Empty);
	}
	if trimmed == "@.*" {
		return Ok(Form::MatchAny);
	}

	let mut cursor = Cursor { tokens: lexer::lex(input)?, index: 0 };

	if matches!(cursor.peek_kind(), Some(TokenKind::Dollar)) {
		cursor.advance();
	}
	if !(cursor.eat(|kind| matches!(kind, TokenKind::LBracket))
		&& cursor.eat(|kind| matches!(kind, TokenKind::Question))
		&& cursor.eat(|kind| matches!(kind, TokenKind::LParen)))
	{
		return Err(QueryError::UnrecognizedForm {
			found: trimmed.chars().take(8).collect::<String>(),
		});
	}

	let composed = parse_composed(&mut cursor)?;

	cursor.expect(|kind| matches!(kind, TokenKind::RParen), "`)`")?;
	cursor.expect(|kind| matches!(kind, TokenKind::RBracket), "`]`")?;

	if let Some(token) = cursor.peek() {
		return Err(QueryError::TrailingInput { position: token.pos });
	}

	Ok(Form::Filter(composed))
}

struct Cursor {
	tokens: Vec<Token>,
	index: usize,
}
impl Cursor {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.index)
	}

	fn peek_kind(&self) -> Option<&TokenKind> {
		self.peek().map(|token| &token.kind)
	}

	fn advance(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.index).cloned();

		if token.is_some() {
			self.index += 1;
		}

		token
	}

	fn eat(&mut self, want: impl Fn(&TokenKind) -> bool) -> bool {
		if self.peek_kind().is_some_and(&want) {
			self.index += 1;

			true
		} else {
			false
		}
	}

	fn expect(
		&mut self,
		want: impl Fn(&TokenKind) -> bool,
		expected: &'static str,
	) -> Result<(), QueryError> {
		match self.tokens.get(self.index) {
			Some(token) if want(&token.kind) => {
				self.index += 1;

				Ok(())
			},
			Some(token) => Err(QueryError::UnexpectedToken {
				position: token.pos,
				expected,
				found: token.kind.describe(),
			}),
			None => Err(QueryError::UnexpectedEnd { expected }),
		}
	}
}

fn parse_composed(cursor: &mut Cursor) -> Result<Composed, QueryError> {
	let mut exprs =
		vec![Expression { connector: Connector::Lead, node: parse_expr(cursor)? }];

	loop {
		let connector = match cursor.peek_kind() {
			Some(TokenKind::And) => Connector::And,
			Some(TokenKind::Or) => Connector::Or,
			_ => break,
		};

		cursor.advance();
		exprs.push(Expression { connector, node: parse_expr(cursor)? });
	}

	Ok(Composed { exprs })
}

fn parse_expr(cursor: &mut Cursor) -> Result<Node, QueryError> {
	if cursor.eat(|kind| matches!(kind, TokenKind::LParen)) {
		let group = parse_composed(cursor)?;

		cursor.expect(|kind| matches!(kind, TokenKind::RParen), "`)`")?;

		return Ok(Node::Group(group));
	}

	let (lval, lval_pos) = parse_operand(cursor)?;
	let op = parse_op(cursor)?;
	let (rval, rval_pos) = parse_operand(cursor)?;

	validate_predicate(&lval, lval_pos, op, &rval, rval_pos)?;

	Ok(Node::Leaf(Predicate { lval, op, rval }))
}

fn parse_operand(cursor: &mut Cursor) -> Result<(Operand, usize), QueryError> {
	let token = match cursor.advance() {
		Some(token) => token,
		None => return Err(QueryError::UnexpectedEnd { expected: "operand" }),
	};
	let operand = match token.kind {
		TokenKind::Path(path) => Operand::Path(path),
		TokenKind::Str(value) => Operand::Str(value),
		TokenKind::Number(value) => Operand::Number(value),
		TokenKind::Null => Operand::Null,
		TokenKind::LBracket => {
			let mut elements = vec![parse_list_element(cursor)?];

			while cursor.eat(|kind| matches!(kind, TokenKind::Comma)) {
				elements.push(parse_list_element(cursor)?);
			}

			cursor.expect(|kind| matches!(kind, TokenKind::RBracket), "`]`")?;

			Operand::List(elements)
		},
		other =>
			return Err(QueryError::UnexpectedToken {
				position: token.pos,
				expected: "operand",
				found: other.describe(),
			}),
	};

	Ok((operand, token.pos))
}

fn parse_list_element(cursor: &mut Cursor) -> Result<Operand, QueryError> {
	let (element, position) = parse_operand(cursor)?;

	if matches!(element, Operand::List(_)) {
		return Err(QueryError::UnexpectedToken {
			position,
			expected: "scalar list element",
			found: "`[`".into(),
		});
	}

	Ok(element)
}

fn parse_op(cursor: &mut Cursor) -> Result<Op, QueryError> {
	let token = match cursor.advance() {
		Some(token) => token,
		None => return Err(QueryError::UnexpectedEnd { expected: "comparison operator" }),
	};

	match token.kind {
		TokenKind::Eq => Ok(Op::Eq),
		TokenKind::Ne => Ok(Op::Ne),
		TokenKind::Lt => Ok(Op::Lt),
		TokenKind::Le => Ok(Op::Le),
		TokenKind::Gt => Ok(Op::Gt),
		TokenKind::Ge => Ok(Op::Ge),
		TokenKind::In => Ok(Op::In),
		TokenKind::Nin => Ok(Op::Nin),
		TokenKind::AnyOf => Ok(Op::AnyOf),
		TokenKind::NoneOf => Ok(Op::NoneOf),
		TokenKind::Regex =>
			Err(QueryError::UnsupportedOperator { position: token.pos, op: "=~" }),
		other => Err(QueryError::UnexpectedToken {
			position: token.pos,
			expected: "comparison operator",
			found: other.describe(),
		}),
	}
}

fn validate_predicate(
	lval: &Operand,
	lval_pos: usize,
	op: Op,
	rval: &Operand,
	rval_pos: usize,
) -> Result<(), QueryError> {
	match op {
		Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => {
			if !matches!(lval, Operand::Path(_)) {
				return Err(QueryError::UnexpectedToken {
					position: lval_pos,
					expected: "attribute path on the left of a comparison",
					found: describe_operand(lval),
				});
			}
			if matches!(rval, Operand::List(_)) {
				return Err(QueryError::UnexpectedToken {
					position: rval_pos,
					expected: "scalar operand",
					found: "list".into(),
				});
			}
		},
		Op::In | Op::Nin =>
			if !matches!(rval, Operand::Path(_) | Operand::List(_)) {
				return Err(QueryError::UnexpectedToken {
					position: rval_pos,
					expected: "list or attribute path",
					found: describe_operand(rval),
				});
			},
		Op::AnyOf | Op::NoneOf => {
			if !matches!(lval, Operand::Path(_)) {
				return Err(QueryError::UnexpectedToken {
					position: lval_pos,
					expected: "attribute path",
					found: describe_operand(lval),
				});
			}
			if !matches!(rval, Operand::List(_)) {
				return Err(QueryError::UnexpectedToken {
					position: rval_pos,
					expected: "list literal",
					found: describe_operand(rval),
				});
			}
		},
	}

	Ok(())
}

fn describe_operand(operand: &Operand) -> String {
	match operand {
		Operand::Path(path) => path.render(),
		Operand::Str(value) => format!("{value:?}"),
		Operand::Number(value) => value.to_string(),
		Operand::Null => "`null`".into(),
		Operand::List(_) => "list".into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn filter(input: &str) -> Composed {
		match parse(input).expect("Query fixture should parse.") {
			Form::Filter(composed) => composed,
			Form::MatchAny => panic!("Fixture should be a filter query."),
		}
	}

	#[test]
	fn parses_connector_sequences_and_groups() {
		let composed = filter("$[?(@.a == 1 and (@.b == 2 or @.c == 3))]");

		assert_eq!(composed.exprs.len(), 2);
		assert_eq!(composed.exprs[0].connector, Connector::Lead);
		assert_eq!(composed.exprs[1].connector, Connector::And);
		assert!(matches!(&composed.exprs[1].node, Node::Group(group) if group.exprs.len() == 2));
	}

	#[test]
	fn accepts_both_envelope_forms() {
		assert!(matches!(parse("[?(@.a == 1)]"), Ok(Form::Filter(_))));
		assert!(matches!(parse("$[?(@.a == 1)]"), Ok(Form::Filter(_))));
		assert!(matches!(parse(" @.* "), Ok(Form::MatchAny)));
	}

	#[test]
	fn rejects_unrecognized_forms() {
		assert!(matches!(parse("@.a == 1"), Err(QueryError::UnrecognizedForm { .. })));
		assert!(matches!(parse("$(@.a == 1)"), Err(QueryError::UnrecognizedForm { .. })));
		assert!(matches!(parse("   "), Err(QueryError::Empty)));
	}

	#[test]
	fn rejects_reserved_regex_operator_at_parse_time() {
		assert!(matches!(
			parse("[?(@.iss =~ 'http.*')]"),
			Err(QueryError::UnsupportedOperator { op: "=~", .. })
		));
	}

	#[test]
	fn rejects_non_path_left_operands_for_comparisons() {
		assert!(matches!(
			parse("[?('a' == @.a)]"),
			Err(QueryError::UnexpectedToken { expected: "attribute path on the left of a comparison", .. })
		));
		assert!(matches!(
			parse("[?(1 < @.a)]"),
			Err(QueryError::UnexpectedToken { .. })
		));
	}

	#[test]
	fn containment_allows_scalar_left_operands() {
		assert!(parse("[?('admin' in @.roles)]").is_ok());
		assert!(parse("[?(@.role in ['admin', 'ops'])]").is_ok());
		assert!(matches!(
			parse("[?(@.roles anyof @.other)]"),
			Err(QueryError::UnexpectedToken { expected: "list literal", .. })
		));
	}

	#[test]
	fn rejects_trailing_input_and_nested_lists() {
		assert!(matches!(parse("[?(@.a == 1)])"), Err(QueryError::TrailingInput { .. })));
		assert!(matches!(
			parse("[?(@.a in [1, [2]])]"),
			Err(QueryError::UnexpectedToken { expected: "scalar list element", .. })
		));
	}
}
