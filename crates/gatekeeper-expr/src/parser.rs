// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recursive-descent parser.
//!
//! Grammar:
//!
//! ```text
//! expression := call | operand
//! call       := IDENT operand+
//! operand    := STRING | FIELD | "true" | "false" | "(" expression ")"
//! ```
//!
//! A function name appearing as an operand must be parenthesized, so
//! `and eq .A "x"` is rejected while `and (eq .A "x")` is accepted.

use crate::ast::{Expr, FieldRef};
use crate::error::{ExprError, Result};
use crate::lexer::{tokenize, Token, TokenKind};

/// Maximum parenthesis nesting accepted by the parser.
pub const MAX_DEPTH: usize = 64;

const PRINCIPAL_SEGMENT: &str = "Principal";

pub(crate) fn parse(input: &str) -> Result<Expr> {
	let tokens = tokenize(input)?;
	if tokens.is_empty() {
		return Err(ExprError::Empty);
	}

	let mut parser = Parser { tokens, pos: 0 };
	let expr = parser.expression(0)?;
	if let Some(token) = parser.peek() {
		return Err(ExprError::UnexpectedToken {
			found: token.kind.describe(),
			offset: token.offset,
		});
	}
	Ok(expr)
}

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).cloned();
		if token.is_some() {
			self.pos += 1;
		}
		token
	}

	fn expression(&mut self, depth: usize) -> Result<Expr> {
		if depth > MAX_DEPTH {
			return Err(ExprError::TooDeep { max: MAX_DEPTH });
		}

		let starts_call = match self.peek() {
			Some(Token {
				kind: TokenKind::Ident(name),
				..
			}) => is_function(name),
			Some(_) => false,
			None => return Err(ExprError::UnexpectedEnd),
		};

		if starts_call {
			self.call(depth)
		} else {
			self.operand(depth)
		}
	}

	fn call(&mut self, depth: usize) -> Result<Expr> {
		let Some(Token {
			kind: TokenKind::Ident(name),
			..
		}) = self.next()
		else {
			return Err(ExprError::UnexpectedEnd);
		};

		let mut operands = Vec::new();
		while let Some(token) = self.peek() {
			if token.kind == TokenKind::RParen {
				break;
			}
			operands.push(self.operand(depth)?);
		}

		build_call(&name, operands)
	}

	fn operand(&mut self, depth: usize) -> Result<Expr> {
		let token = self.next().ok_or(ExprError::UnexpectedEnd)?;
		match token.kind {
			TokenKind::Str(value) => Ok(Expr::Literal(value)),
			TokenKind::Field(path) => field(path, token.offset),
			TokenKind::Ident(name) => match name.as_str() {
				"true" => Ok(Expr::Bool(true)),
				"false" => Ok(Expr::Bool(false)),
				_ if is_function(&name) => Err(ExprError::UnparenthesizedCall {
					name,
					offset: token.offset,
				}),
				_ => Err(ExprError::UnknownFunction {
					name,
					offset: token.offset,
				}),
			},
			TokenKind::LParen => {
				let inner = self.expression(depth + 1)?;
				match self.next() {
					Some(Token {
						kind: TokenKind::RParen,
						..
					}) => Ok(inner),
					Some(other) => Err(ExprError::UnexpectedToken {
						found: other.kind.describe(),
						offset: other.offset,
					}),
					None => Err(ExprError::UnexpectedEnd),
				}
			}
			TokenKind::RParen => Err(ExprError::UnexpectedToken {
				found: token.kind.describe(),
				offset: token.offset,
			}),
		}
	}
}

fn is_function(name: &str) -> bool {
	matches!(name, "eq" | "and" | "or" | "not")
}

fn build_call(name: &str, mut operands: Vec<Expr>) -> Result<Expr> {
	let found = operands.len();
	match name {
		"eq" if found >= 2 => Ok(Expr::Eq(operands)),
		"eq" => Err(ExprError::Arity {
			name: "eq",
			expected: "at least 2",
			found,
		}),
		"and" if found >= 1 => Ok(Expr::And(operands)),
		"and" => Err(ExprError::Arity {
			name: "and",
			expected: "at least 1",
			found,
		}),
		"or" if found >= 1 => Ok(Expr::Or(operands)),
		"or" => Err(ExprError::Arity {
			name: "or",
			expected: "at least 1",
			found,
		}),
		"not" if found == 1 => Ok(Expr::Not(Box::new(operands.remove(0)))),
		"not" => Err(ExprError::Arity {
			name: "not",
			expected: "exactly 1",
			found,
		}),
		other => Err(ExprError::UnknownFunction {
			name: other.to_string(),
			offset: 0,
		}),
	}
}

fn field(path: Vec<String>, offset: usize) -> Result<Expr> {
	match path.as_slice() {
		[key] => Ok(Expr::Field(FieldRef::Context(key.clone()))),
		[scope, key] if scope == PRINCIPAL_SEGMENT => {
			Ok(Expr::Field(FieldRef::Principal(key.clone())))
		}
		_ => Err(ExprError::InvalidField {
			field: format!(".{}", path.join(".")),
			offset,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_teller_constraint() {
		let expr = parse(r#"and (eq .Principal.Region "Midwest") (eq .CurrentLocation "Chicago")"#)
			.unwrap();
		assert_eq!(
			expr,
			Expr::And(vec![
				Expr::Eq(vec![
					Expr::Field(FieldRef::Principal("Region".into())),
					Expr::Literal("Midwest".into()),
				]),
				Expr::Eq(vec![
					Expr::Field(FieldRef::Context("CurrentLocation".into())),
					Expr::Literal("Chicago".into()),
				]),
			])
		);
	}

	#[test]
	fn parses_bare_operand_and_parenthesized_top_level() {
		assert_eq!(
			parse(".Enabled").unwrap(),
			Expr::Field(FieldRef::Context("Enabled".into()))
		);
		assert_eq!(
			parse(r#"(not (eq .A "x"))"#).unwrap(),
			Expr::Not(Box::new(Expr::Eq(vec![
				Expr::Field(FieldRef::Context("A".into())),
				Expr::Literal("x".into()),
			])))
		);
	}

	#[test]
	fn whitespace_only_is_empty() {
		assert_eq!(parse("   "), Err(ExprError::Empty));
	}

	#[test]
	fn arity_is_checked() {
		assert!(matches!(
			parse(r#"eq .A"#),
			Err(ExprError::Arity { name: "eq", .. })
		));
		assert!(matches!(
			parse(r#"not .A .B"#),
			Err(ExprError::Arity { name: "not", .. })
		));
		assert!(matches!(
			parse("(and)"),
			Err(ExprError::Arity { name: "and", .. })
		));
	}

	#[test]
	fn nested_call_needs_parentheses() {
		assert!(matches!(
			parse(r#"and eq .A "x""#),
			Err(ExprError::UnparenthesizedCall { .. })
		));
	}

	#[test]
	fn unknown_identifiers_are_rejected() {
		assert!(matches!(
			parse(r#"contains .A "x""#),
			Err(ExprError::UnknownFunction { .. })
		));
		assert!(matches!(
			parse(r#"eq .A yes"#),
			Err(ExprError::UnknownFunction { .. })
		));
	}

	#[test]
	fn unbalanced_parentheses() {
		assert_eq!(parse(r#"and (eq .A "x""#), Err(ExprError::UnexpectedEnd));
		assert!(matches!(
			parse(r#"eq .A "x")"#),
			Err(ExprError::UnexpectedToken { .. })
		));
	}

	#[test]
	fn deep_field_paths_are_invalid() {
		assert!(matches!(
			parse(r#"eq .Principal.Home.City "x""#),
			Err(ExprError::InvalidField { .. })
		));
		assert!(matches!(
			parse(r#"eq .Request.City "x""#),
			Err(ExprError::InvalidField { .. })
		));
	}

	#[test]
	fn nesting_is_bounded() {
		let deep = format!("{}true{}", "(".repeat(MAX_DEPTH + 2), ")".repeat(MAX_DEPTH + 2));
		assert_eq!(parse(&deep), Err(ExprError::TooDeep { max: MAX_DEPTH }));

		let shallow = format!("{}true{}", "(".repeat(8), ")".repeat(8));
		assert_eq!(parse(&shallow), Ok(Expr::Bool(true)));
	}
}
