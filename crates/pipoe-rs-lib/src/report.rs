//! Per-package events that don't stop a run.
//!
//! Every recoverable problem is recorded as a [`Diagnostic`] naming the package it belongs to,
//! the [`Report`] collects them so they can be shown next to the generated artifacts at the end of a run.

use std::path::PathBuf;

/// A recoverable event attributable to a single package or file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
	/// Metadata for a package could not be fetched, the package and its subtree are left out.
	FetchFailed { package: String, requester: Option<String>, reason: String },
	/// A package was required at a version other than the one already resolved.
	VersionConflict { package: String, needed: String, found: String, chosen: String },
	/// A license term had no mapping and the default was used instead.
	LicenseFallback { package: String, term: String, license: String },
	/// A requirement was satisfied by a package in the existing environment at a different version.
	ExistingVersionDiffers { package: String, required: String, existing: String },
	/// The existing environment has the package but too old, it is resolved from the registry instead.
	ExistingVersionTooOld { package: String, required: String, existing: String },
	/// An existing recipe file could not be understood.
	RecipeParseFailed { path: PathBuf, reason: String },
	/// A requested optional group isn't declared by the package.
	UnknownOptionalGroup { package: String, group: String },
	/// The source archive could not be downloaded or inspected, the recipe lacks checksums.
	SourceInspectionFailed { package: String, reason: String },
	/// A line of a requirements file was not used.
	SkippedRequirement { line: String, reason: String },
	/// The run was interrupted before the dependency tree was fully explored.
	Interrupted { pending: usize },
}

impl Diagnostic {
	/// Sends the diagnostic to the log at a level matching its severity.
	pub fn log(&self) {
		match self {
			Diagnostic::FetchFailed { .. }
			| Diagnostic::Interrupted { .. } => log::error!("{}", self),
			Diagnostic::SkippedRequirement { .. } => log::info!("{}", self),
			_ => log::warn!("{}", self),
		}
	}

	pub fn is_version_conflict(&self) -> bool {
		matches!(self, Diagnostic::VersionConflict { .. })
	}

	pub fn is_license_fallback(&self) -> bool {
		matches!(self, Diagnostic::LicenseFallback { .. })
	}
}

impl std::fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Diagnostic::FetchFailed { package, requester: Some(requester), reason } => write!(f, "Failed to gather {} required by {} ({})", package, requester, reason),
			Diagnostic::FetchFailed { package, requester: None, reason } => write!(f, "Failed to gather {} ({})", package, reason),
			Diagnostic::VersionConflict { package, needed, found, chosen } => write!(f, "Package {} version needed {} found {}, using {}", package, needed, found, chosen),
			Diagnostic::LicenseFallback { package, term, license } => write!(f, "Failed to translate license \"{}\" of {}, using {}", term, package, license),
			Diagnostic::ExistingVersionDiffers { package, required, existing } => write!(f, "Package {} required at {} is provided by the existing environment at {}", package, required, existing),
			Diagnostic::ExistingVersionTooOld { package, required, existing } => write!(f, "Package {} required at {} but the existing environment only has {}", package, required, existing),
			Diagnostic::RecipeParseFailed { path, reason } => write!(f, "Could not parse: {} ({})", path.display(), reason),
			Diagnostic::UnknownOptionalGroup { package, group } => write!(f, "Package {} has no optional group {}", package, group),
			Diagnostic::SourceInspectionFailed { package, reason } => write!(f, "Could not inspect source of {} ({})", package, reason),
			Diagnostic::SkippedRequirement { line, reason } => write!(f, "Skipping: {} ({})", line, reason),
			Diagnostic::Interrupted { pending } => write!(f, "Interrupted with {} packages left unexplored", pending),
		}
	}
}

/// Everything that happened during a run that the user should see.
#[derive(Debug, Clone, Default)]
pub struct Report {
	diagnostics: Vec<Diagnostic>,
}

impl Report {
	/// Records and logs a diagnostic.
	pub fn push(&mut self, diagnostic: Diagnostic) {
		diagnostic.log();
		self.diagnostics.push(diagnostic);
	}

	pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
		for d in diagnostics {
			self.push(d);
		}
	}

	/// Moves the diagnostics of `other` to the end of this report, they are not logged again.
	pub fn append(&mut self, mut other: Report) {
		self.diagnostics.append(&mut other.diagnostics);
	}

	pub fn diagnostics(&self) -> &[Diagnostic] {
		&self.diagnostics
	}

	pub fn version_conflicts(&self) -> impl Iterator<Item = &Diagnostic> {
		self.diagnostics.iter().filter(|d| d.is_version_conflict())
	}

	pub fn license_fallbacks(&self) -> impl Iterator<Item = &Diagnostic> {
		self.diagnostics.iter().filter(|d| d.is_license_fallback())
	}

	pub fn fetch_failures(&self) -> impl Iterator<Item = &Diagnostic> {
		self.diagnostics.iter().filter(|d| matches!(d, Diagnostic::FetchFailed { .. }))
	}

	pub fn is_empty(&self) -> bool {
		self.diagnostics.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn conflict_message_names_both_versions() {
		let d = Diagnostic::VersionConflict { package: "idna".into(), needed: "==2.8".into(), found: "2.7".into(), chosen: "2.8".into() };
		assert!(d.to_string().starts_with("Package idna version needed ==2.8 found 2.7"));
	}

	#[test]
	fn report_filters_by_kind() {
		let mut report = Report::default();
		report.push(Diagnostic::LicenseFallback { package: "a".into(), term: "Weird".into(), license: "CLOSED".into() });
		report.push(Diagnostic::FetchFailed { package: "b".into(), requester: Some("a".into()), reason: "package not found".into() });
		assert_eq!(report.license_fallbacks().count(), 1);
		assert_eq!(report.fetch_failures().count(), 1);
		assert_eq!(report.version_conflicts().count(), 0);
	}
}
