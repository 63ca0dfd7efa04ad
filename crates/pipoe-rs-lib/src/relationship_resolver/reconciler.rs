use super::*;

/// What to do with a package that is required again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
	/// The resolved version stays.
	Keep,
	/// Resolve the package again at this version.
	Replace(PackageVersion),
}

/// Settles packages required more than once with different constraints.
///
/// The highest version wins. Resolved versions only ever go up, a constraint that would need a lower
/// version is reported and otherwise ignored.
pub struct VersionReconciler;

impl VersionReconciler {
	/// # Parameters
	/// - `name` - Package being required.
	/// - `current` - Version it is resolved at.
	/// - `constraint` - The new requirement.
	/// - `available` - Every known release of the package.
	///
	/// Returns the decision and a conflict diagnostic when `constraint` doesn't accept `current`.
	pub fn reconcile(name: &str, current: &PackageVersion, constraint: &VersionConstraint, available: &[PackageVersion]) -> (Reconciliation, Option<Diagnostic>) {
		if constraint.is_version_within(current) {
			return (Reconciliation::Keep, None);
		}

		let best = constraint.max_satisfying(available)
			.or_else(|| constraint.pinned().filter(|_| available.is_empty()))
			.filter(|best| *best > current)
			.cloned();

		let chosen = best.clone().unwrap_or_else(|| current.clone());
		let conflict = Diagnostic::VersionConflict {
			package: name.to_string(),
			needed: constraint.to_string(),
			found: current.to_string(),
			chosen: chosen.to_string(),
		};

		match best {
			Some(version) => (Reconciliation::Replace(version), Some(conflict)),
			None => (Reconciliation::Keep, Some(conflict)),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn v(s: &str) -> PackageVersion {
		PackageVersion::new(s).unwrap()
	}

	fn c(s: &str) -> VersionConstraint {
		VersionConstraint::parse(s).unwrap()
	}

	#[test]
	fn satisfied_is_kept_quietly() {
		assert_eq!(VersionReconciler::reconcile("a", &v("1.5"), &c(">=1.0"), &[v("1.5"), v("2.0")]), (Reconciliation::Keep, None));
	}

	#[test]
	fn higher_requirement_replaces() {
		let (decision, conflict) = VersionReconciler::reconcile("a", &v("1.0"), &c("==2.0"), &[v("1.0"), v("2.0")]);
		assert_eq!(decision, Reconciliation::Replace(v("2.0")));
		assert_eq!(conflict.unwrap().to_string(), "Package a version needed ==2.0 found 1.0, using 2.0");
	}

	#[test]
	fn lower_requirement_keeps_with_warning() {
		let (decision, conflict) = VersionReconciler::reconcile("a", &v("2.0"), &c("<2.0"), &[v("1.0"), v("2.0")]);
		assert_eq!(decision, Reconciliation::Keep);
		assert!(conflict.unwrap().is_version_conflict());
	}

	#[test]
	fn range_picks_highest_match() {
		let (decision, _) = VersionReconciler::reconcile("a", &v("1.0"), &c(">=1.1,<3"), &[v("1.0"), v("1.2"), v("2.5"), v("3.0")]);
		assert_eq!(decision, Reconciliation::Replace(v("2.5")));
	}

	#[test] fn pin_without_release_list() { assert_eq!(VersionReconciler::reconcile("a", &v("1.0"), &c("==1.4"), &[]).0, Reconciliation::Replace(v("1.4"))) }
}
