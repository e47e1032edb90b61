// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Expression tree and its evaluation.

use std::collections::HashMap;
use std::fmt;

/// A reference to a value supplied at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
	/// `.Key`, resolved against the request context.
	Context(String),
	/// `.Principal.Key`, resolved against the subject's attributes.
	Principal(String),
}

impl fmt::Display for FieldRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FieldRef::Context(key) => write!(f, ".{key}"),
			FieldRef::Principal(key) => write!(f, ".Principal.{key}"),
		}
	}
}

/// Parsed constraint expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
	Literal(String),
	Bool(bool),
	Field(FieldRef),
	/// `eq A B C...` is true when `A` equals any of the following operands.
	Eq(Vec<Expr>),
	And(Vec<Expr>),
	Or(Vec<Expr>),
	Not(Box<Expr>),
}

/// Runtime value of an evaluated node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
	Bool(bool),
	Str(String),
}

impl Value {
	/// Empty strings and `false` are falsy, everything else is truthy.
	pub fn truthy(&self) -> bool {
		match self {
			Value::Bool(b) => *b,
			Value::Str(s) => !s.is_empty(),
		}
	}

	fn as_text(&self) -> &str {
		match self {
			Value::Bool(true) => "true",
			Value::Bool(false) => "false",
			Value::Str(s) => s,
		}
	}
}

/// Lookup tables an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
	pub context: &'a HashMap<String, String>,
	pub subject: &'a HashMap<String, String>,
}

impl<'a> Bindings<'a> {
	pub fn new(context: &'a HashMap<String, String>, subject: &'a HashMap<String, String>) -> Self {
		Self { context, subject }
	}

	/// Unknown keys resolve to the empty string.
	pub fn resolve(&self, field: &FieldRef) -> &'a str {
		let found = match field {
			FieldRef::Context(key) => self.context.get(key),
			FieldRef::Principal(key) => self.subject.get(key),
		};
		found.map(String::as_str).unwrap_or("")
	}
}

impl Expr {
	/// Evaluates the node. `and`/`or` short-circuit and yield the deciding
	/// operand.
	pub fn eval(&self, bindings: &Bindings<'_>) -> Value {
		match self {
			Expr::Literal(s) => Value::Str(s.clone()),
			Expr::Bool(b) => Value::Bool(*b),
			Expr::Field(field) => Value::Str(bindings.resolve(field).to_string()),
			Expr::Eq(operands) => {
				let Some((first, rest)) = operands.split_first() else {
					return Value::Bool(false);
				};
				let lhs = first.eval(bindings);
				Value::Bool(
					rest
						.iter()
						.any(|rhs| rhs.eval(bindings).as_text() == lhs.as_text()),
				)
			}
			Expr::And(operands) => {
				let mut last = Value::Bool(true);
				for operand in operands {
					last = operand.eval(bindings);
					if !last.truthy() {
						return last;
					}
				}
				last
			}
			Expr::Or(operands) => {
				let mut last = Value::Bool(false);
				for operand in operands {
					last = operand.eval(bindings);
					if last.truthy() {
						return last;
					}
				}
				last
			}
			Expr::Not(inner) => Value::Bool(!inner.eval(bindings).truthy()),
		}
	}

	/// Writes the expression with every field reference replaced by the
	/// value it resolved to.
	pub(crate) fn render_resolved(&self, bindings: &Bindings<'_>, out: &mut String) {
		match self {
			Expr::Literal(s) => push_quoted(out, s),
			Expr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
			Expr::Field(field) => push_quoted(out, bindings.resolve(field)),
			Expr::Eq(operands) => render_call(out, "eq", operands, |e, out| {
				e.render_resolved(bindings, out)
			}),
			Expr::And(operands) => render_call(out, "and", operands, |e, out| {
				e.render_resolved(bindings, out)
			}),
			Expr::Or(operands) => render_call(out, "or", operands, |e, out| {
				e.render_resolved(bindings, out)
			}),
			Expr::Not(inner) => render_call(out, "not", std::slice::from_ref(inner.as_ref()), |e, out| {
				e.render_resolved(bindings, out)
			}),
		}
	}

	fn is_call(&self) -> bool {
		matches!(self, Expr::Eq(_) | Expr::And(_) | Expr::Or(_) | Expr::Not(_))
	}
}

fn push_quoted(out: &mut String, s: &str) {
	out.push('"');
	for c in s.chars() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\t' => out.push_str("\\t"),
			other => out.push(other),
		}
	}
	out.push('"');
}

fn render_call<F>(out: &mut String, name: &str, operands: &[Expr], mut render: F)
where
	F: FnMut(&Expr, &mut String),
{
	out.push_str(name);
	for operand in operands {
		out.push(' ');
		if operand.is_call() {
			out.push('(');
			render(operand, out);
			out.push(')');
		} else {
			render(operand, out);
		}
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut out = String::new();
		render_source(self, &mut out);
		f.write_str(&out)
	}
}

fn render_source(expr: &Expr, out: &mut String) {
	match expr {
		Expr::Literal(s) => push_quoted(out, s),
		Expr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
		Expr::Field(field) => out.push_str(&field.to_string()),
		Expr::Eq(operands) => render_call(out, "eq", operands, render_source),
		Expr::And(operands) => render_call(out, "and", operands, render_source),
		Expr::Or(operands) => render_call(out, "or", operands, render_source),
		Expr::Not(inner) => render_call(out, "not", std::slice::from_ref(inner.as_ref()), render_source),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn field(key: &str) -> Expr {
		Expr::Field(FieldRef::Context(key.to_string()))
	}

	fn lit(s: &str) -> Expr {
		Expr::Literal(s.to_string())
	}

	#[test]
	fn eq_matches_any_following_operand() {
		let context = HashMap::from([("City".to_string(), "Chicago".to_string())]);
		let subject = HashMap::new();
		let bindings = Bindings::new(&context, &subject);

		let expr = Expr::Eq(vec![field("City"), lit("Seattle"), lit("Chicago")]);
		assert_eq!(expr.eval(&bindings), Value::Bool(true));

		let expr = Expr::Eq(vec![field("City"), lit("Seattle")]);
		assert_eq!(expr.eval(&bindings), Value::Bool(false));
	}

	#[test]
	fn and_or_yield_deciding_operand() {
		let context = HashMap::from([("Name".to_string(), "tom".to_string())]);
		let subject = HashMap::new();
		let bindings = Bindings::new(&context, &subject);

		let and = Expr::And(vec![field("Name"), field("Missing")]);
		assert_eq!(and.eval(&bindings), Value::Str(String::new()));

		let or = Expr::Or(vec![field("Missing"), field("Name")]);
		assert_eq!(or.eval(&bindings), Value::Str("tom".into()));
	}

	#[test]
	fn bools_compare_by_text() {
		let context = HashMap::new();
		let subject = HashMap::new();
		let bindings = Bindings::new(&context, &subject);

		let expr = Expr::Eq(vec![Expr::Bool(true), lit("true")]);
		assert!(expr.eval(&bindings).truthy());
	}

	#[test]
	fn display_round_trips_nested_calls() {
		let expr = Expr::And(vec![
			Expr::Eq(vec![
				Expr::Field(FieldRef::Principal("Region".into())),
				lit("Midwest"),
			]),
			Expr::Not(Box::new(field("Closed"))),
		]);
		assert_eq!(
			expr.to_string(),
			r#"and (eq .Principal.Region "Midwest") (not .Closed)"#
		);
	}
}
