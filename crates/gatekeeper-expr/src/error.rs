// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for constraint expressions.

use thiserror::Error;

/// Result type for expression parsing.
pub type Result<T> = std::result::Result<T, ExprError>;

/// Syntax errors raised while parsing a constraint expression.
///
/// Evaluation of a well-formed expression never fails, so every variant here
/// describes malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
	#[error("expression is empty")]
	Empty,

	#[error("unterminated string literal starting at offset {offset}")]
	UnterminatedString { offset: usize },

	#[error("invalid escape '\\{ch}' at offset {offset}")]
	InvalidEscape { ch: char, offset: usize },

	#[error("unexpected character '{ch}' at offset {offset}")]
	UnexpectedChar { ch: char, offset: usize },

	#[error("invalid field reference '{field}' at offset {offset}")]
	InvalidField { field: String, offset: usize },

	#[error("unknown function '{name}' at offset {offset}")]
	UnknownFunction { name: String, offset: usize },

	#[error("function '{name}' must be parenthesized when used as an argument (offset {offset})")]
	UnparenthesizedCall { name: String, offset: usize },

	#[error("'{name}' expects {expected} argument(s), got {found}")]
	Arity {
		name: &'static str,
		expected: &'static str,
		found: usize,
	},

	#[error("unexpected {found} at offset {offset}")]
	UnexpectedToken { found: String, offset: usize },

	#[error("unexpected end of expression")]
	UnexpectedEnd,

	#[error("expression nested deeper than {max} levels")]
	TooDeep { max: usize },
}
