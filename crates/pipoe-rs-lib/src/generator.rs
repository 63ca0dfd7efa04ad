//! Generator
//!
//! Merges the license loading, resolve, source inspection and emission steps into a single function [`generate`] for convenience.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::task::JoinSet;

use crate::archive::SourceInfo;
use crate::config::GeneratorOptions;
use crate::existing::{ExistingPackageSet, ExistingSource};
use crate::license::{LicenseMapper, LicenseStore, Prompter};
use crate::package::{parse_requirements, PackageSpec};
use crate::recipe::RecipeEmitter;
use crate::registry::MetadataSource;
use crate::relationship_resolver::{DependencyGraph, ResolverBuilder};
use crate::report::{Diagnostic, Report};

/// What to generate recipes for.
#[derive(Debug, Clone, Default)]
pub struct GenerationInput {
	pub roots: Vec<PackageSpec>,
	pub existing: ExistingPackageSet,
	/// Problems found while reading the input, reported with the run.
	pub diagnostics: Vec<Diagnostic>,
}

impl GenerationInput {
	/// A single root package, `version` pins it.
	pub fn from_package(name: &str, version: Option<&str>) -> crate::Result<Self> {
		Ok(Self { roots: vec![PackageSpec::from_name_version(name, version)?], ..Default::default() })
	}

	/// Every requirement of a requirements file.
	pub fn from_requirements_file(path: &Path) -> crate::Result<Self> {
		log::info!("Reading requirements from {}", path.display());
		let text = std::fs::read_to_string(path)?;
		let (roots, diagnostics) = parse_requirements(&text);
		Ok(Self { roots, diagnostics, ..Default::default() })
	}

	/// Adds packages the build environment already provides.
	pub fn with_existing(mut self, source: &ExistingSource, options: &GeneratorOptions) -> crate::Result<Self> {
		let (existing, diagnostics) = ExistingPackageSet::scan(source, options.target())?;
		self.existing = existing;
		self.diagnostics.extend(diagnostics);
		Ok(self)
	}
}

/// Everything a run produced.
#[derive(Debug)]
pub struct GenerationOutput {
	pub graph: DependencyGraph,
	/// Recipe files written, in the order they were written.
	pub artifacts: Vec<PathBuf>,
	pub preferred_versions: Option<PathBuf>,
	/// Where the license map was saved, when it was.
	pub license_map: Option<PathBuf>,
	pub report: Report,
}

/// Resolves `input` and writes recipes for the result into the output directory.
///
/// # Parameters
/// - `options` - Run configuration.
/// - `source` - Registry to resolve against.
/// - `prompter` - Asked for licenses that have no mapping.
/// - `input` - Root packages and the existing environment.
/// - `interrupt` - Set to stop exploring new packages, what is already known is still written.
///
/// # Errors
/// - [`RootUnresolvable`](crate::error::Error::RootUnresolvable) when no root package resolved.
/// - [`IO`](crate::error::Error::IO) when output can't be written.
pub async fn generate<S: MetadataSource, P: Prompter>(
	options: &GeneratorOptions,
	source: Arc<S>,
	prompter: P,
	input: GenerationInput,
	interrupt: Arc<AtomicBool>,
) -> crate::Result<GenerationOutput> {
	let license_map_path = options.license_map_path();
	let store = LicenseStore::load(&license_map_path)?;
	let licenses = LicenseMapper::new(store, prompter, options.fallback_license());

	let mut report = Report::default();
	report.extend(input.diagnostics);

	let finalized = ResolverBuilder::new(source.clone(), licenses)
		.add_package_specs(input.roots)
		.existing_packages(input.existing)
		.include_optional_groups(options.include_optional_groups())
		.max_concurrent_fetches(options.max_concurrent_fetches())
		.interrupt_flag(interrupt)
		.build()?
		.resolve()
		.await?;
	let (graph, resolve_report, store) = finalized.into_parts();
	report.append(resolve_report);

	let sources = if options.inspect_sources() {
		inspect_sources(source, &graph, options.max_concurrent_fetches(), &mut report).await
	} else {
		BTreeMap::new()
	};

	log::info!("Generating recipes ({})", graph.len());
	let emitter = RecipeEmitter::new(options.target(), options.use_pypi_class());
	let artifacts = emitter.emit_with_sources(&graph, &sources, options.out_dir())?;

	let preferred_versions = if options.write_preferred_versions() {
		Some(emitter.write_preferred_versions(&graph, options.out_dir())?)
	} else {
		None
	};

	let license_map = if options.persist_licenses() {
		store.save(&license_map_path)?;
		log::info!("License mappings are available in: {}", license_map_path.display());
		Some(license_map_path)
	} else {
		None
	};

	Ok(GenerationOutput { graph, artifacts, preferred_versions, license_map, report })
}

/// Downloads and inspects the source archive of every resolved package.
///
/// Failures are added to `report`, the package is simply missing from the result.
async fn inspect_sources<S: MetadataSource>(source: Arc<S>, graph: &DependencyGraph, max_concurrent: usize, report: &mut Report) -> BTreeMap<String, SourceInfo> {
	let mut results = BTreeMap::<String, SourceInfo>::new();
	let mut tasks = JoinSet::<(String, Result<SourceInfo, String>)>::new();

	let mut handle = |joined: Option<Result<(String, Result<SourceInfo, String>), tokio::task::JoinError>>, results: &mut BTreeMap<String, SourceInfo>| {
		match joined {
			Some(Ok((name, Ok(info)))) => { results.insert(name, info); },
			Some(Ok((package, Err(reason)))) => report.push(Diagnostic::SourceInspectionFailed { package, reason }),
			Some(Err(e)) => log::error!("Source inspection task failed: {}", e),
			None => {},
		}
	};

	for node in graph.nodes() {
		let Some(url) = node.metadata.source_url.clone() else {
			log::debug!("{} has no source distribution", node.name);
			continue;
		};

		while tasks.len() >= max_concurrent.max(1) {
			let joined = tasks.join_next().await;
			handle(joined, &mut results);
		}

		let name = node.name.clone();
		let source = source.clone();
		tasks.spawn(async move {
			log::info!("Inspecting source of {}", name);
			let result = match source.download(&url).await {
				Ok(data) => crate::archive::inspect_archive(&url, &data).map_err(|e| e.to_string()),
				Err(e) => Err(e.to_string()),
			};
			(name, result)
		});
	}

	while !tasks.is_empty() {
		let joined = tasks.join_next().await;
		handle(joined, &mut results);
	}

	results
}
