//! Various types associated with registry packages.

use std::collections::{BTreeMap, BTreeSet};

mod version;
pub use version::PackageVersion;

mod specifier;
pub use specifier::VersionConstraint;
pub use specifier::Comparator;
pub use specifier::Operator;

mod requirement;
pub use requirement::Requirement;
pub use requirement::parse_requirements;

/// Registry-normalized form of a package name.
///
/// Names are case insensitive and treat runs of `-`, `_` and `.` as a single separator,
/// `Zope.Interface` and `zope_interface` are the same package `zope-interface`.
pub fn normalize_name(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	let mut last_was_separator = false;
	for c in name.trim().chars() {
		if matches!(c, '-' | '_' | '.') {
			if !last_was_separator {
				out.push('-');
			}
			last_was_separator = true;
		} else {
			out.extend(c.to_lowercase());
			last_was_separator = false;
		}
	}
	out
}

/// A request to resolve a package, not yet a resolved package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSpec {
	/// Always normalized, see [`normalize_name`].
	pub name: String,
	pub constraint: VersionConstraint,
	/// Requested optional-dependency groups.
	pub extras: BTreeSet<String>,
}

impl PackageSpec {
	pub fn new(name: &str, constraint: VersionConstraint) -> Self {
		Self { name: normalize_name(name), constraint, extras: Default::default() }
	}

	/// Builds a spec from a package name and an optional exact version, as given on the command line.
	pub fn from_name_version(name: &str, version: Option<&str>) -> crate::Result<Self> {
		let mut spec = Requirement::parse(name)?.to_spec();
		if let Some(version) = version {
			spec.constraint = VersionConstraint::parse(version)?;
		}
		Ok(spec)
	}

	pub fn with_extras(mut self, extras: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
		self.extras.extend(extras.into_iter().map(|e| normalize_name(e.as_ref())));
		self
	}
}

impl std::fmt::Display for PackageSpec {
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

/// Metadata of one release of a package as reported by a [`MetadataSource`](crate::registry::MetadataSource).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageMetadata {
	/// The name as the registry spells it.
	pub name: String,
	pub version: PackageVersion,
	/// Every release the registry knows about, used when a later requirement forces a different version.
	pub available_versions: Vec<PackageVersion>,
	/// Raw license text, may be empty.
	pub license: String,
	/// `License :: ...` trove classifiers.
	pub license_classifiers: Vec<String>,
	pub summary: String,
	pub homepage: String,
	pub author: String,
	pub author_email: String,
	/// Location of the source distribution.
	pub source_url: Option<String>,
	/// Runtime dependencies, in declaration order.
	pub requires: Vec<Requirement>,
	/// Dependencies per optional group.
	pub optional_groups: BTreeMap<String, Vec<Requirement>>,
}

impl PackageMetadata {
	/// Sorts requirements into the runtime list and optional groups according to their `extra` markers.
	pub fn set_requirements(&mut self, requirements: impl IntoIterator<Item = Requirement>) {
		self.requires.clear();
		self.optional_groups.clear();
		for requirement in requirements {
			match requirement.group.clone() {
				Some(group) => self.optional_groups.entry(group).or_default().push(requirement),
				None => self.requires.push(requirement),
			}
		}
	}
}
