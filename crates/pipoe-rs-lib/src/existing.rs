//! Packages the target build environment already provides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::PythonTarget;
use crate::package::{normalize_name, PackageVersion, VersionConstraint};
use crate::report::Diagnostic;

/// Why a file in a recipe tree wasn't understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
	#[error("file name is not <prefix>-<name>_<version>.bb")]
	NotARecipeName,
	#[error("version \"{0}\" is not a dotted release")]
	UndottedVersion(String),
	#[error("invalid version: {0}")]
	Version(String),
}

/// Where to read the existing environment from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingSource {
	/// A `name==version` listing, one package per line.
	Listing(PathBuf),
	/// A layer directory searched for recipe files.
	RecipeTree(PathBuf),
}

/// How the existing environment relates to a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingMatch {
	/// Not provided, resolve from the registry.
	Absent,
	/// Provided at an acceptable version, or at an unknown one.
	Satisfied,
	/// Provided at a version the requirement doesn't accept, it is used anyway.
	Differs(PackageVersion),
	/// Provided, but older than the requirement's lower bound.
	TooOld(PackageVersion),
}

/// Normalized package name to the version already present, `None` when the version is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingPackageSet {
	packages: BTreeMap<String, Option<PackageVersion>>,
}

impl ExistingPackageSet {
	/// Reads the environment from `source`.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when a listing can't be read.
	/// - [`Validation`](crate::error::Error::Validation) when a recipe tree isn't a directory.
	pub fn scan(source: &ExistingSource, target: PythonTarget) -> crate::Result<(Self, Vec<Diagnostic>)> {
		match source {
			ExistingSource::Listing(path) => {
				log::info!("Reading existing packages from {}", path.display());
				let text = std::fs::read_to_string(path)?;
				Ok((Self::parse_listing(&text), Vec::new()))
			},
			ExistingSource::RecipeTree(dir) => Self::scan_recipe_tree(dir, target),
		}
	}

	/// Parses `name==version` lines. A line without `==` names a package at an unknown version.
	pub fn parse_listing(text: &str) -> Self {
		let mut set = Self::default();
		for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
			let (name, version) = match line.split_once("==") {
				Some((n, v)) => (n.trim(), PackageVersion::new(v.trim()).ok()),
				None => (line, None),
			};
			set.insert(name, version);
		}
		set
	}

	/// Walks `dir` collecting every `<prefix>-<name>_<version>.bb` recipe of the interpreter target.
	///
	/// Recipe files whose name can't be understood are reported and skipped.
	pub fn scan_recipe_tree(dir: &Path, target: PythonTarget) -> crate::Result<(Self, Vec<Diagnostic>)> {
		if !dir.is_dir() {
			return Err(crate::Error::Validation(format!("{} is not a directory", dir.display())));
		}
		log::info!("Gathering recipes in layers directory: {}", dir.display());

		let mut set = Self::default();
		let mut diagnostics = Vec::<Diagnostic>::new();
		let prefix = format!("{}-", target.prefix());

		for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
			let entry = match entry {
				Ok(e) => e,
				Err(e) => {
					log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
					continue;
				},
			};
			if !entry.file_type().is_file() {
				continue;
			}

			let file_name = entry.file_name().to_string_lossy();
			if !file_name.starts_with(&prefix) || !file_name.ends_with(".bb") {
				continue;
			}

			match parse_recipe_filename(&file_name, target) {
				Ok((name, version)) => set.insert(&name, Some(version)),
				Err(e) => diagnostics.push(Diagnostic::RecipeParseFailed { path: entry.path().to_path_buf(), reason: e.to_string() }),
			}
		}

		log::debug!("Found {} existing recipes", set.len());
		Ok((set, diagnostics))
	}

	/// Adds a package, the higher version wins when it is already present.
	pub fn insert(&mut self, name: &str, version: Option<PackageVersion>) {
		let name = normalize_name(name);
		let replace = match (self.packages.get(&name), &version) {
			(Some(Some(current)), Some(v)) => v > current,
			(Some(Some(_)), None) => false,
			_ => true,
		};
		if replace {
			self.packages.insert(name, version);
		}
	}

	pub fn get(&self, name: &str) -> Option<Option<&PackageVersion>> {
		self.packages.get(&normalize_name(name)).map(Option::as_ref)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.packages.contains_key(&normalize_name(name))
	}

	pub fn len(&self) -> usize {
		self.packages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packages.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, Option<&PackageVersion>)> {
		self.packages.iter().map(|(k, v)| (k, v.as_ref()))
	}

	/// Decides whether a requirement is already provided.
	pub fn check(&self, name: &str, constraint: &VersionConstraint) -> ExistingMatch {
		match self.get(name) {
			None => ExistingMatch::Absent,
			Some(None) => ExistingMatch::Satisfied,
			Some(Some(version)) if constraint.is_version_within(version) => ExistingMatch::Satisfied,
			Some(Some(version)) => match constraint.lower_bound() {
				Some(lower) if lower > version => ExistingMatch::TooOld(version.clone()),
				_ => ExistingMatch::Differs(version.clone()),
			},
		}
	}

	/// Writes the set as a sorted `name==version` listing readable by [`parse_listing`](Self::parse_listing).
	pub fn write_listing(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let mut out = String::new();
		for (name, version) in self.iter() {
			match version {
				Some(v) => out.push_str(&format!("{}=={}\n", name, v)),
				None => out.push_str(&format!("{}\n", name)),
			}
		}
		std::fs::write(path, out)?;
		Ok(())
	}
}

impl<'a> FromIterator<(&'a str, Option<PackageVersion>)> for ExistingPackageSet {
	fn from_iter<T: IntoIterator<Item = (&'a str, Option<PackageVersion>)>>(iter: T) -> Self {
		let mut set = Self::default();
		for (name, version) in iter {
			set.insert(name, version);
		}
		set
	}
}

/// Splits `python3-webob_1.8.7.bb` into `webob` and `1.8.7`.
pub fn parse_recipe_filename(file_name: &str, target: PythonTarget) -> Result<(String, PackageVersion), ScanError> {
	let stem = file_name
		.strip_prefix(target.prefix())
		.and_then(|s| s.strip_prefix('-'))
		.and_then(|s| s.strip_suffix(".bb"))
		.ok_or(ScanError::NotARecipeName)?;

	let (name, version) = stem.split_once('_').ok_or(ScanError::NotARecipeName)?;
	if name.is_empty() {
		return Err(ScanError::NotARecipeName);
	}
	if !version.contains('.') {
		return Err(ScanError::UndottedVersion(version.to_string()));
	}

	let version = PackageVersion::new(version).map_err(|e| ScanError::Version(e.to_string()))?;
	Ok((normalize_name(name), version))
}

#[cfg(test)]
mod test {
	use super::*;

	fn v(s: &str) -> PackageVersion {
		PackageVersion::new(s).unwrap()
	}

	#[test] fn recipe_name_parses() { assert_eq!(parse_recipe_filename("python3-webob_1.8.7.bb", PythonTarget::Python3).unwrap(), ("webob".to_string(), v("1.8.7"))) }
	#[test] fn recipe_name_needs_dotted_version() { assert!(matches!(parse_recipe_filename("python3-foo_git.bb", PythonTarget::Python3), Err(ScanError::UndottedVersion(_)))) }
	#[test] fn recipe_name_needs_version() { assert_eq!(parse_recipe_filename("python3-foo.bb", PythonTarget::Python3), Err(ScanError::NotARecipeName)) }
	#[test] fn recipe_name_of_other_target() { assert!(parse_recipe_filename("python3-foo_1.0.bb", PythonTarget::Python).is_err()) }

	#[test]
	fn listing_parses_with_and_without_versions() {
		let set = ExistingPackageSet::parse_listing("urllib3==1.24.1\n\n# comment\nSix\n");
		assert_eq!(set.get("urllib3"), Some(Some(&v("1.24.1"))));
		assert_eq!(set.get("six"), Some(None));
		assert_eq!(set.len(), 2);
	}

	#[test]
	fn check_outcomes() {
		let set: ExistingPackageSet = [("urllib3", Some(v("1.24.1"))), ("six", None)].into_iter().collect();
		assert_eq!(set.check("urllib3", &VersionConstraint::parse("==1.24.1").unwrap()), ExistingMatch::Satisfied);
		assert_eq!(set.check("six", &VersionConstraint::parse(">=1.16").unwrap()), ExistingMatch::Satisfied);
		assert_eq!(set.check("urllib3", &VersionConstraint::parse("<1.24").unwrap()), ExistingMatch::Differs(v("1.24.1")));
		assert_eq!(set.check("urllib3", &VersionConstraint::parse(">=1.25").unwrap()), ExistingMatch::TooOld(v("1.24.1")));
		assert_eq!(set.check("idna", &VersionConstraint::any()), ExistingMatch::Absent);
	}

	#[test]
	fn higher_version_wins() {
		let set: ExistingPackageSet = [("a", Some(v("2.0"))), ("A", Some(v("1.0")))].into_iter().collect();
		assert_eq!(set.get("a"), Some(Some(&v("2.0"))));
	}

	#[test]
	fn recipe_tree_is_scanned() {
		let dir = tempfile::tempdir().unwrap();
		let layer = dir.path().join("meta-python/recipes-devtools/python");
		std::fs::create_dir_all(&layer).unwrap();
		for f in ["python3-webob_1.8.7.bb", "python3-foo_git.bb", "python3-webob_1.8.7.bbappend", "python-old_1.0.bb", "README"] {
			std::fs::write(layer.join(f), "").unwrap();
		}

		let (set, diagnostics) = ExistingPackageSet::scan_recipe_tree(dir.path(), PythonTarget::Python3).unwrap();
		assert_eq!(set.len(), 1);
		assert!(set.contains("webob"));
		assert_eq!(diagnostics.len(), 1);
		assert!(matches!(&diagnostics[0], Diagnostic::RecipeParseFailed { path, .. } if path.ends_with("python3-foo_git.bb")));
	}

	#[test]
	fn listing_round_trips_through_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("existing.txt");
		let set: ExistingPackageSet = [("b", Some(v("1.0"))), ("a", None)].into_iter().collect();
		set.write_listing(&path).unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb==1.0\n");
		assert_eq!(ExistingPackageSet::scan(&ExistingSource::Listing(path), PythonTarget::Python3).unwrap().0, set);
	}
}
