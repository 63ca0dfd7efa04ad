//! Parsing of dependency declarations (`requires_dist` entries and requirement file lines).

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::*;
use crate::report::Diagnostic;

/// A parsed dependency declaration such as `requests[socks] (>=2.0) ; extra == "proxy"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
	/// The name as written by the package author.
	pub name: String,
	/// Optional groups requested from the dependency itself.
	pub extras: BTreeSet<String>,
	pub constraint: VersionConstraint,
	/// The optional group of the *declaring* package this requirement belongs to, taken from an `extra == "..."` marker.
	pub group: Option<String>,
	pub marker: Option<String>,
}

fn requirement_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[([^\]]*)\])?\s*(.*)$").expect("requirement regex is valid"))
}

fn extra_marker_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"extra\s*==\s*['"]([^'"]+)['"]"#).expect("extra marker regex is valid"))
}

impl Requirement {
	pub fn parse(s: &str) -> crate::Result<Self> {
		let (body, marker) = match s.split_once(';') {
			Some((b, m)) => (b, Some(m.trim().to_string()).filter(|m| !m.is_empty())),
			None => (s, None),
		};

		let captures = requirement_regex()
			.captures(body)
			.ok_or_else(|| crate::Error::Parse(format!("invalid requirement \"{}\"", s.trim())))?;

		let name = captures[1].to_string();
		let extras = captures.get(2)
			.map(|m| m.as_str().split(',').map(|e| normalize_name(e.trim())).filter(|e| !e.is_empty()).collect())
			.unwrap_or_default();

		let rest = captures.get(3).map_or("", |m| m.as_str()).trim();
		/* Direct references (`name @ url`) carry no version information */
		let constraint = if rest.starts_with('@') {
			VersionConstraint::any()
		} else {
			VersionConstraint::parse(rest)?
		};

		let group = marker.as_deref()
			.and_then(|m| extra_marker_regex().captures(m))
			.map(|c| normalize_name(&c[1]));

		Ok(Requirement { name, extras, constraint, group, marker })
	}

	pub fn normalized_name(&self) -> String {
		normalize_name(&self.name)
	}

	pub fn to_spec(&self) -> PackageSpec {
		PackageSpec {
			name: self.normalized_name(),
			constraint: self.constraint.clone(),
			extras: self.extras.clone(),
		}
	}
}

impl std::fmt::Display for Requirement {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name)?;
		if !self.extras.is_empty() {
			write!(f, "[{}]", self.extras.iter().cloned().collect::<Vec<_>>().join(","))?;
		}
		if !self.constraint.is_any() {
			write!(f, "{}", self.constraint)?;
		}
		Ok(())
	}
}

/// Reads a requirements file, one requirement per line.
///
/// Editable installs, nested requirement files and local paths are skipped, lines that don't parse
/// are reported and skipped.
pub fn parse_requirements(text: &str) -> (Vec<PackageSpec>, Vec<Diagnostic>) {
	let mut specs = Vec::<PackageSpec>::new();
	let mut diagnostics = Vec::<Diagnostic>::new();

	for line in text.lines() {
		let line = match line.split_once(" #") {
			Some((l, _)) => l,
			None => line,
		}.trim();

		if line.is_empty() || line.starts_with('#') {
			continue;
		}

		if line.starts_with("-e") || line.starts_with("-r") || line.starts_with('.') || line.starts_with('/') {
			diagnostics.push(Diagnostic::SkippedRequirement { line: line.to_string(), reason: "not a registry package".to_string() });
			continue;
		}

		match Requirement::parse(line) {
			Ok(r) => specs.push(r.to_spec()),
			Err(e) => diagnostics.push(Diagnostic::SkippedRequirement { line: line.to_string(), reason: format!("unparsed package: {}", e) }),
		}
	}

	(specs, diagnostics)
}
