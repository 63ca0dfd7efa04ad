use super::*;
use crate::license::LicenseStore;

/// A completed resolve.
pub struct ResolverFinalized {
	dep_graph: DependencyGraph,
	report: Report,
	licenses: LicenseStore,
}

impl ResolverFinalized {
	pub(super) fn new(dep_graph: DependencyGraph, report: Report, licenses: LicenseStore) -> Self {
		Self {
			dep_graph,
			report,
			licenses,
		}
	}

	pub fn get_graph(&self) -> &DependencyGraph {
		&self.dep_graph
	}

	pub fn report(&self) -> &Report {
		&self.report
	}

	/// The license map including everything the operator answered during the resolve.
	pub fn licenses(&self) -> &LicenseStore {
		&self.licenses
	}

	pub fn into_parts(self) -> (DependencyGraph, Report, LicenseStore) {
		(self.dep_graph, self.report, self.licenses)
	}
}
