//! Canonical text form of result rows, compared against the recorded ground-truth result.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Serialize, Serializer};
use serde_json::Value;

use sqlbench_types::Row;

/// Serializes a value with object keys sorted and integral floats written as integers.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.0 {
			Value::Object(map) => map
				.iter()
				.map(|(k, v)| (k.as_str(), Canonical(v)))
				.collect::<BTreeMap<_, _>>()
				.serialize(serializer),
			Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
			Value::Number(n) if n.is_f64() => match n.as_f64() {
				Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => serializer.serialize_i64(f as i64),
				_ => n.serialize(serializer),
			},
			other => other.serialize(serializer),
		}
	}
}

/// Compact JSON array of row objects. Row order is kept as returned; column keys are sorted.
pub fn serialize(rows: &[Row]) -> Result<String> {
	let sorted: Vec<BTreeMap<&str, Canonical>> = rows
		.iter()
		.map(|row| row.iter().map(|(k, v)| (k.as_str(), Canonical(v))).collect())
		.collect();
	Ok(serde_json::to_string(&sorted)?)
}

/// Re-compact a stored result through the same canonical form, so whitespace, key order and
/// `100.0` versus `100` do not matter. Non-JSON text is used verbatim.
pub fn canonicalize(expected: &str) -> String {
	serde_json::from_str::<Value>(expected)
		.ok()
		.and_then(|v| serde_json::to_string(&Canonical(&v)).ok())
		.unwrap_or_else(|| expected.trim().to_string())
}

/// True when the serialized rows equal the canonical form of `expected`.
pub fn matches(serialized_rows: &str, expected: &str) -> bool {
	serialized_rows == canonicalize(expected)
}
