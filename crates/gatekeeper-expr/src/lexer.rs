// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tokenizer for constraint expressions.

use crate::error::{ExprError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
	LParen,
	RParen,
	/// A quoted string literal with escapes already resolved.
	Str(String),
	/// A dotted field path such as `.Region` or `.Principal.Region`,
	/// stored without the leading dot.
	Field(Vec<String>),
	Ident(String),
}

impl TokenKind {
	pub(crate) fn describe(&self) -> String {
		match self {
			TokenKind::LParen => "'('".to_string(),
			TokenKind::RParen => "')'".to_string(),
			TokenKind::Str(s) => format!("string \"{s}\""),
			TokenKind::Field(path) => format!("field .{}", path.join(".")),
			TokenKind::Ident(name) => format!("identifier '{name}'"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
	pub kind: TokenKind,
	pub offset: usize,
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
	let mut tokens = Vec::new();
	let mut chars = input.char_indices().peekable();

	while let Some(&(offset, c)) = chars.peek() {
		match c {
			c if c.is_whitespace() => {
				chars.next();
			}
			'(' => {
				chars.next();
				tokens.push(Token {
					kind: TokenKind::LParen,
					offset,
				});
			}
			')' => {
				chars.next();
				tokens.push(Token {
					kind: TokenKind::RParen,
					offset,
				});
			}
			'"' => {
				chars.next();
				let mut value = String::new();
				let mut closed = false;
				while let Some((pos, c)) = chars.next() {
					match c {
						'"' => {
							closed = true;
							break;
						}
						'\\' => {
							let Some((_, escaped)) = chars.next() else {
								return Err(ExprError::UnterminatedString { offset });
							};
							value.push(match escaped {
								'"' => '"',
								'\\' => '\\',
								'n' => '\n',
								't' => '\t',
								other => {
									return Err(ExprError::InvalidEscape {
										ch: other,
										offset: pos,
									})
								}
							});
						}
						other => value.push(other),
					}
				}
				if !closed {
					return Err(ExprError::UnterminatedString { offset });
				}
				tokens.push(Token {
					kind: TokenKind::Str(value),
					offset,
				});
			}
			'.' => {
				let mut raw = String::new();
				while let Some(&(_, c)) = chars.peek() {
					if c == '.' || is_ident_char(c) {
						raw.push(c);
						chars.next();
					} else {
						break;
					}
				}
				let path: Vec<String> = raw[1..].split('.').map(str::to_string).collect();
				if path.iter().any(String::is_empty) {
					return Err(ExprError::InvalidField { field: raw, offset });
				}
				tokens.push(Token {
					kind: TokenKind::Field(path),
					offset,
				});
			}
			c if is_ident_char(c) => {
				let mut name = String::new();
				while let Some(&(_, c)) = chars.peek() {
					if is_ident_char(c) {
						name.push(c);
						chars.next();
					} else {
						break;
					}
				}
				tokens.push(Token {
					kind: TokenKind::Ident(name),
					offset,
				});
			}
			other => return Err(ExprError::UnexpectedChar { ch: other, offset }),
		}
	}

	Ok(tokens)
}
