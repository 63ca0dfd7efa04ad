use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::*;
use crate::existing::ExistingPackageSet;
use crate::registry::MetadataSource;

pub struct ResolverBuilder<S: MetadataSource, P: Prompter> {
	source: Arc<S>,
	licenses: LicenseMapper<P>,
	existing: ExistingPackageSet,
	include_optional_groups: bool,
	max_concurrent_fetches: usize,
	interrupt: Arc<AtomicBool>,

	requirements: Vec<PackageSpec>,
}

impl<S: MetadataSource, P: Prompter> ResolverBuilder<S, P> {
	pub fn new(source: Arc<S>, licenses: LicenseMapper<P>) -> Self {
		Self {
			source,
			licenses,
			existing: Default::default(),
			include_optional_groups: false,
			max_concurrent_fetches: 8,
			interrupt: Default::default(),
			requirements: Default::default(),
		}
	}

	pub fn add_package_specs(mut self, specs: impl IntoIterator<Item = PackageSpec>) -> Self {
		for spec in specs {
			self.requirements.push(spec);
		}
		self
	}

	/// Packages already provided, these are not resolved.
	pub fn existing_packages(mut self, existing: ExistingPackageSet) -> Self {
		self.existing = existing;
		self
	}

	pub fn include_optional_groups(mut self, include: bool) -> Self {
		self.include_optional_groups = include;
		self
	}

	pub fn max_concurrent_fetches(mut self, max: usize) -> Self {
		self.max_concurrent_fetches = max.max(1);
		self
	}

	/// Once `flag` is set no new packages are visited, fetches already started are still merged.
	pub fn interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
		self.interrupt = flag;
		self
	}

	/// # Errors
	/// - [`NoPackages`](crate::error::Error::NoPackages) when no root package was added.
	pub fn build(self) -> crate::Result<ResolverProcessor<S, P>> {
		if self.requirements.is_empty() {
			return Err(crate::Error::NoPackages);
		}

		Ok(ResolverProcessor::new(
			self.source,
			self.licenses,
			self.existing,
			self.include_optional_groups,
			self.max_concurrent_fetches,
			self.interrupt,
			self.requirements,
		))
	}
}
