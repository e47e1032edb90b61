// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Constraint expression language for Gatekeeper.
//!
//! Constraints are small boolean predicates written in a prefix syntax:
//!
//! ```text
//! and (eq .Principal.Region "Midwest") (eq .CurrentLocation "Chicago")
//! ```
//!
//! - `eq A B...` is true when `A` equals any of the following operands
//! - `and`, `or`, `not` combine operands by truthiness
//! - `.Key` reads the request context, `.Principal.Key` reads subject attributes
//! - quoted strings are literals; `true` and `false` are booleans
//!
//! Unknown fields resolve to the empty string, so `eq .Missing ""` holds.
//! Only malformed syntax is an error; a well-formed expression always
//! evaluates to a [`Evaluation`].
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use gatekeeper_expr::evaluate;
//!
//! let context = HashMap::from([("CurrentLocation".to_string(), "Chicago".to_string())]);
//! let subject = HashMap::from([("Region".to_string(), "Midwest".to_string())]);
//!
//! let result = evaluate(
//! 	r#"and (eq .Principal.Region "Midwest") (eq .CurrentLocation "Chicago")"#,
//! 	&context,
//! 	&subject,
//! )
//! .unwrap();
//! assert!(result.matched);
//! ```

pub mod ast;
pub mod error;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use ast::{Bindings, Expr, FieldRef, Value};
pub use error::{ExprError, Result};
pub use parser::MAX_DEPTH;

/// Outcome of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
	pub matched: bool,
	/// The expression with field references substituted by their resolved
	/// values, followed by the result, e.g.
	/// `and (eq "Midwest" "Midwest") (eq "Seattle" "Chicago") -> false`.
	pub rendered: String,
}

/// A parsed expression, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
	root: Expr,
}

impl Expression {
	/// Parses `source`. Empty or whitespace-only input is an error.
	pub fn parse(source: &str) -> Result<Self> {
		let root = parser::parse(source)?;
		Ok(Self { root })
	}

	pub fn root(&self) -> &Expr {
		&self.root
	}

	pub fn evaluate(&self, bindings: &Bindings<'_>) -> Evaluation {
		let matched = self.root.eval(bindings).truthy();
		let mut rendered = String::new();
		self.root.render_resolved(bindings, &mut rendered);
		rendered.push_str(if matched { " -> true" } else { " -> false" });
		Evaluation { matched, rendered }
	}
}

impl FromStr for Expression {
	type Err = ExprError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.root, f)
	}
}

/// Parses and evaluates `expression` in one step.
pub fn evaluate(
	expression: &str,
	context: &HashMap<String, String>,
	subject: &HashMap<String, String>,
) -> Result<Evaluation> {
	let parsed = Expression::parse(expression).inspect_err(|e| {
		tracing::debug!(error = %e, "constraint expression rejected");
	})?;
	Ok(parsed.evaluate(&Bindings::new(context, subject)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const TELLER: &str = r#"and (eq .Principal.Region "Midwest") (eq .CurrentLocation "Chicago")"#;

	fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn teller_constraint_in_chicago() {
		let result = evaluate(
			TELLER,
			&attrs(&[("CurrentLocation", "Chicago")]),
			&attrs(&[("Region", "Midwest")]),
		)
		.unwrap();

		assert!(result.matched);
		assert_eq!(
			result.rendered,
			r#"and (eq "Midwest" "Midwest") (eq "Chicago" "Chicago") -> true"#
		);
	}

	#[test]
	fn teller_constraint_in_seattle() {
		let result = evaluate(
			TELLER,
			&attrs(&[("CurrentLocation", "Seattle")]),
			&attrs(&[("Region", "Midwest")]),
		)
		.unwrap();

		assert!(!result.matched);
		assert!(result.rendered.ends_with("-> false"));
	}

	#[test]
	fn missing_field_is_empty_string() {
		let result = evaluate(r#"eq .Missing """#, &HashMap::new(), &HashMap::new()).unwrap();
		assert!(result.matched);
	}

	#[test]
	fn principal_and_context_namespaces_are_separate() {
		let result = evaluate(
			r#"eq .Region "Midwest""#,
			&HashMap::new(),
			&attrs(&[("Region", "Midwest")]),
		)
		.unwrap();
		assert!(!result.matched);
	}

	#[test]
	fn syntax_errors_are_not_false_matches() {
		assert!(evaluate(r#"eq .A "x"#, &HashMap::new(), &HashMap::new()).is_err());
		assert_eq!(
			evaluate("", &HashMap::new(), &HashMap::new()),
			Err(ExprError::Empty)
		);
	}

	#[test]
	fn or_and_not_combinators() {
		let context = attrs(&[("Tier", "gold")]);
		let subject = HashMap::new();
		let check = |e: &str| evaluate(e, &context, &subject).unwrap().matched;

		assert!(check(r#"or (eq .Tier "silver") (eq .Tier "gold")"#));
		assert!(!check(r#"not (eq .Tier "gold")"#));
		assert!(check(r#"not .Missing"#));
		assert!(check(r#"eq .Tier "bronze" "gold""#));
	}

	#[test]
	fn parsed_expression_displays_canonically() {
		let parsed: Expression = "and   (eq .Principal.Region \"Midwest\")\n  true".parse().unwrap();
		assert_eq!(parsed.to_string(), r#"and (eq .Principal.Region "Midwest") true"#);
	}

	fn arb_key() -> impl Strategy<Value = String> {
		prop_oneof![Just("A".to_string()), Just("B".to_string()), Just("C".to_string())]
	}

	fn arb_expr() -> impl Strategy<Value = String> {
		let leaf = prop_oneof![
			(arb_key(), "[a-c]{0,2}").prop_map(|(k, v)| format!("(eq .{k} \"{v}\")")),
			(arb_key(), "[a-c]{0,2}").prop_map(|(k, v)| format!("(eq .Principal.{k} \"{v}\")")),
			Just("true".to_string()),
			Just("false".to_string()),
		];
		leaf.prop_recursive(4, 32, 3, |inner| {
			prop_oneof![
				prop::collection::vec(inner.clone(), 1..3)
					.prop_map(|ops| format!("(and {})", ops.join(" "))),
				prop::collection::vec(inner.clone(), 1..3)
					.prop_map(|ops| format!("(or {})", ops.join(" "))),
				inner.prop_map(|op| format!("(not {op})")),
			]
		})
	}

	fn arb_map() -> impl Strategy<Value = HashMap<String, String>> {
		prop::collection::hash_map(arb_key(), "[a-c]{0,2}", 0..3)
	}

	proptest! {
		#[test]
		fn evaluation_is_deterministic(
			expr in arb_expr(),
			context in arb_map(),
			subject in arb_map(),
		) {
			let first = evaluate(&expr, &context, &subject).unwrap();
			let second = evaluate(&expr, &context, &subject).unwrap();
			prop_assert_eq!(first, second);
		}

		#[test]
		fn not_inverts_match(
			expr in arb_expr(),
			context in arb_map(),
			subject in arb_map(),
		) {
			let plain = evaluate(&expr, &context, &subject).unwrap();
			let negated = evaluate(&format!("not {expr}"), &context, &subject).unwrap();
			prop_assert_eq!(plain.matched, !negated.matched);
		}

		#[test]
		fn canonical_form_reparses_to_same_tree(expr in arb_expr()) {
			let parsed = Expression::parse(&expr).unwrap();
			let reparsed = Expression::parse(&parsed.to_string()).unwrap();
			prop_assert_eq!(parsed, reparsed);
		}
	}
}
