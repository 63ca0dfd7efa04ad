//!

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinSet;

use super::*;
use crate::existing::{ExistingMatch, ExistingPackageSet};
use crate::registry::{FetchError, MetadataSource};

/// A request to resolve one package on behalf of another.
#[derive(Debug, Clone)]
struct Request {
	name: String,
	constraint: VersionConstraint,
	extras: BTreeSet<String>,
	/// The requesting package at the version it was resolved at, `None` for root packages.
	parent: Option<(String, PackageVersion)>,
	edge: EdgeData,
}

impl Request {
	fn root(spec: PackageSpec) -> Self {
		Self {
			edge: EdgeData::Depends(spec.constraint.clone()),
			name: spec.name,
			constraint: spec.constraint,
			extras: spec.extras,
			parent: None,
		}
	}

	fn dependency(requirement: &Requirement, parent: &(String, PackageVersion), edge: EdgeData) -> Self {
		Self {
			name: requirement.normalized_name(),
			constraint: requirement.constraint.clone(),
			extras: requirement.extras.clone(),
			parent: Some(parent.clone()),
			edge,
		}
	}

	fn requester(&self) -> Option<String> {
		self.parent.as_ref().map(|(name, _)| name.clone())
	}
}

/// A fetch that has been started, or is waiting for a free slot.
struct InFlight {
	request: Request,
	/// Requests for the same name that arrived while fetching, visited again once it completes.
	deferred: Vec<Request>,
}

type FetchResult = (String, Result<PackageMetadata, FetchError>);

/// Walks the dependency tree breadth first.
///
/// All graph and license changes happen on the task calling [`resolve`](Self::resolve), only the
/// metadata fetches run concurrently. Their results are merged one at a time.
pub struct ResolverProcessor<S: MetadataSource, P: Prompter> {
	source: Arc<S>,
	licenses: LicenseMapper<P>,
	existing: ExistingPackageSet,
	include_optional_groups: bool,
	max_concurrent_fetches: usize,
	interrupt: Arc<AtomicBool>,

	dep_graph: DependencyGraph,
	report: Report,
	roots: Vec<String>,
	root_failures: Vec<(String, String)>,

	queue: VecDeque<Request>,
	in_flight: HashMap<String, InFlight>,
	waiting: VecDeque<(String, VersionConstraint)>,
	fetches: JoinSet<FetchResult>,
	/// Names that can't be fetched at all.
	unavailable: HashSet<String>,
}

impl<S: MetadataSource, P: Prompter> ResolverProcessor<S, P> {
	pub(super) fn new(
		source: Arc<S>,
		licenses: LicenseMapper<P>,
		existing: ExistingPackageSet,
		include_optional_groups: bool,
		max_concurrent_fetches: usize,
		interrupt: Arc<AtomicBool>,
		requirements: Vec<PackageSpec>,
	) -> Self {
		let mut roots = Vec::<String>::new();
		for spec in &requirements {
			if !roots.contains(&spec.name) {
				roots.push(spec.name.clone());
			}
		}

		Self {
			source,
			licenses,
			existing,
			include_optional_groups,
			max_concurrent_fetches,
			interrupt,
			dep_graph: Default::default(),
			report: Default::default(),
			roots,
			root_failures: Default::default(),
			queue: requirements.into_iter().map(Request::root).collect(),
			in_flight: Default::default(),
			waiting: Default::default(),
			fetches: JoinSet::new(),
			unavailable: Default::default(),
		}
	}

	fn is_interrupted(&self) -> bool {
		self.interrupt.load(Ordering::Relaxed)
	}

	/// Resolves the full tree of the root packages.
	///
	/// Per-package failures end up in the [`Report`] of the result.
	///
	/// # Errors
	/// - [`RootUnresolvable`](crate::error::Error::RootUnresolvable) when none of the root packages could be resolved.
	pub async fn resolve(mut self) -> crate::Result<ResolverFinalized> {
		loop {
			if !self.is_interrupted() {
				while let Some(request) = self.queue.pop_front() {
					self.visit(request);
				}
				self.start_waiting_fetches();
			}

			match self.fetches.join_next().await {
				Some(Ok((name, result))) => self.merge(name, result),
				Some(Err(e)) => log::error!("Metadata fetch task failed: {}", e),
				None => break,
			}
		}

		if self.is_interrupted() {
			self.report.push(Diagnostic::Interrupted { pending: self.queue.len() + self.waiting.len() });
		}

		self.finalize()
	}

	/// The node that made `request`, `None` once its version has been replaced.
	fn parent_index(&self, request: &Request) -> Option<NodeIndex> {
		match &request.parent {
			None => Some(self.dep_graph.meta_node()),
			Some((parent, version)) => self.dep_graph.resolved_index(parent, version),
		}
	}

	/// Handles one request, either settling it against what is already known or starting a fetch.
	fn visit(&mut self, request: Request) {
		/* Requests made by a package version that has since been replaced are obsolete */
		let Some(parent_index) = self.parent_index(&request) else {
			log::trace!("Dropping obsolete request for {}", request.name);
			return;
		};

		if self.unavailable.contains(&request.name) {
			return;
		}

		let target = self.dep_graph.get_or_add_node_index(&request.name);
		self.dep_graph.add_requirement(parent_index, target, request.edge.clone());

		if let Some(in_flight) = self.in_flight.get_mut(&request.name) {
			in_flight.deferred.push(request);
			return;
		}

		if let Some(NodeData::Resolved(_)) = self.dep_graph.node_weight(target) {
			self.revisit(target, request);
			return;
		}

		match self.existing.check(&request.name, &request.constraint) {
			ExistingMatch::Absent => self.start_fetch(request),
			ExistingMatch::Satisfied => self.exclude(target, &request.name),
			ExistingMatch::Differs(existing) => {
				self.report.push(Diagnostic::ExistingVersionDiffers {
					package: request.name.clone(),
					required: request.constraint.to_string(),
					existing: existing.to_string(),
				});
				self.exclude(target, &request.name);
			},
			ExistingMatch::TooOld(existing) => {
				self.report.push(Diagnostic::ExistingVersionTooOld {
					package: request.name.clone(),
					required: request.constraint.to_string(),
					existing: existing.to_string(),
				});
				self.start_fetch(request);
			},
		}
	}

	/// A package that is already resolved is required again.
	fn revisit(&mut self, target: NodeIndex, request: Request) {
		let Some(NodeData::Resolved(node)) = self.dep_graph.node_weight(target) else { return };
		let (decision, conflict) = VersionReconciler::reconcile(&request.name, &node.version, &request.constraint, &node.metadata.available_versions);
		let groups = self.groups_for(&request, &node.metadata);

		if let Some(conflict) = conflict {
			self.report.push(conflict);
		}

		match decision {
			Reconciliation::Replace(version) => {
				let mut request = request;
				request.constraint = VersionConstraint::exact(version);
				self.start_fetch(request);
			},
			Reconciliation::Keep => self.install_groups(target, groups),
		}
	}

	fn exclude(&mut self, target: NodeIndex, name: &str) {
		let version = self.existing.get(name).flatten().cloned();
		log::info!("{} is provided by the existing environment", name);
		self.dep_graph.set_node(target, NodeData::Excluded(name.to_string(), version));
	}

	/// The optional groups a request asks for.
	///
	/// A root package requested without explicit groups gets all of them.
	fn groups_for(&self, request: &Request, metadata: &PackageMetadata) -> BTreeSet<String> {
		if !self.include_optional_groups {
			BTreeSet::new()
		} else if request.parent.is_none() && request.extras.is_empty() {
			metadata.optional_groups.keys().cloned().collect()
		} else {
			request.extras.clone()
		}
	}

	fn start_fetch(&mut self, request: Request) {
		let name = request.name.clone();
		self.waiting.push_back((name.clone(), request.constraint.clone()));
		self.in_flight.insert(name, InFlight { request, deferred: Vec::new() });
	}

	fn start_waiting_fetches(&mut self) {
		while self.fetches.len() < self.max_concurrent_fetches {
			let Some((name, constraint)) = self.waiting.pop_front() else { break };
			log::info!("Gathering {} {}", name, constraint);

			let source = self.source.clone();
			self.fetches.spawn(async move {
				let result = source.fetch(&name, &constraint).await;
				(name, result)
			});
		}
	}

	fn merge(&mut self, name: String, result: Result<PackageMetadata, FetchError>) {
		let Some(InFlight { request, deferred }) = self.in_flight.remove(&name) else {
			log::warn!("Received metadata for {} which was never requested", name);
			return;
		};

		match result {
			Ok(metadata) => self.install(request, metadata),
			Err(e) => self.fetch_failed(request, e),
		}

		self.queue.extend(deferred);
	}

	/// Makes `metadata` the resolved node of its name and requests its dependencies.
	fn install(&mut self, request: Request, metadata: PackageMetadata) {
		/* The requester may have been replaced while the fetch was running */
		if self.parent_index(&request).is_none() {
			log::debug!("Dropping {} {}, its requester was replaced", request.name, metadata.version);
			return;
		}

		let target = self.dep_graph.get_or_add_node_index(&request.name);

		let mut groups = self.groups_for(&request, &metadata);
		if let Some(NodeData::Resolved(old)) = self.dep_graph.node_weight(target) {
			if old.version >= metadata.version {
				log::debug!("Keeping {} {}, fetched {}", old.name, old.version, metadata.version);
				return;
			}
			groups.extend(old.groups.keys().cloned());
		}

		log::info!("Resolved {} {}", request.name, metadata.version);

		let parent = (request.name.clone(), metadata.version.clone());
		let mut requests = Vec::<Request>::new();
		for requirement in &metadata.requires {
			if requirement.normalized_name() == request.name {
				/* `pkg[extra]` required by `pkg` itself only asks for more groups */
				if self.include_optional_groups {
					groups.extend(requirement.extras.iter().cloned());
				}
				continue;
			}
			requests.push(Request::dependency(requirement, &parent, EdgeData::Depends(requirement.constraint.clone())));
		}

		let node = DependencyNode {
			name: request.name.clone(),
			version: metadata.version.clone(),
			/* Normalized once the resolve is complete, pruned packages are never asked about */
			license: LicenseExpression::closed(),
			metadata,
			dependencies: Default::default(),
			groups: Default::default(),
		};

		self.dep_graph.clear_node_requirements(target);
		self.dep_graph.set_node(target, NodeData::Resolved(node));
		self.queue.extend(requests);
		self.install_groups(target, groups);
	}

	/// Adds optional groups to a resolved node and requests their dependencies.
	fn install_groups(&mut self, target: NodeIndex, groups: BTreeSet<String>) {
		if groups.is_empty() {
			return;
		}
		let Some(NodeData::Resolved(node)) = self.dep_graph.node_weight_mut(target) else { return };

		let parent = (node.name.clone(), node.version.clone());
		let mut requests = Vec::<Request>::new();
		let mut diagnostics = Vec::<Diagnostic>::new();
		let mut pending: VecDeque<String> = groups.into_iter().collect();

		while let Some(group) = pending.pop_front() {
			if node.groups.contains_key(&group) {
				continue;
			}
			let Some(requirements) = node.metadata.optional_groups.get(&group) else {
				diagnostics.push(Diagnostic::UnknownOptionalGroup { package: node.name.clone(), group });
				continue;
			};

			for requirement in requirements {
				if requirement.normalized_name() == node.name {
					pending.extend(requirement.extras.iter().cloned());
					continue;
				}
				requests.push(Request::dependency(requirement, &parent, EdgeData::Optional(group.clone(), requirement.constraint.clone())));
			}
			log::debug!("Including optional group {} of {}", group, node.name);
			node.groups.insert(group, BTreeSet::new());
		}

		self.report.extend(diagnostics);
		self.queue.extend(requests);
	}

	fn fetch_failed(&mut self, request: Request, error: FetchError) {
		let reason = error.to_string();
		self.report.push(Diagnostic::FetchFailed {
			package: request.name.clone(),
			requester: request.requester(),
			reason: reason.clone(),
		});

		if request.parent.is_none() {
			self.root_failures.push((request.name.clone(), reason));
		}

		/* A failed upgrade leaves the resolved version in place */
		if let Some(NodeData::Resolved(_)) = self.dep_graph.node_data(&request.name) {
			return;
		}

		/* Earlier requesters are still served by the existing environment */
		if self.existing.contains(&request.name) {
			if let Some(target) = self.dep_graph.node_index(&request.name) {
				if let Some(parent) = self.parent_index(&request) {
					self.dep_graph.remove_requirement(parent, target, &request.edge);
				}
				self.exclude(target, &request.name);
			}
			return;
		}

		/* Another constraint may still match a release */
		if !matches!(error, FetchError::NoMatchingVersion(_)) {
			self.unavailable.insert(request.name.clone());
		}
		self.dep_graph.remove_package(&request.name);
	}

	/// Normalizes the license of every resolved package, in name order.
	fn normalize_licenses(&mut self) {
		for i in self.dep_graph.resolved_indices() {
			let Some(NodeData::Resolved(node)) = self.dep_graph.node_weight_mut(i) else { continue };
			let normalized = self.licenses.normalize_with_classifiers(&node.name, &node.metadata.license, &node.metadata.license_classifiers);
			log::debug!("License of {} is {}", node.name, normalized.expression);
			node.license = normalized.expression;
			self.report.extend(normalized.diagnostics);
		}
	}

	fn finalize(mut self) -> crate::Result<ResolverFinalized> {
		self.dep_graph.clear_stubs();
		self.dep_graph.clear_loose_nodes();
		self.dep_graph.fill_dependencies();

		if !self.roots.iter().any(|r| self.dep_graph.contains(r)) {
			let (name, reason) = self.root_failures.into_iter().next()
				.unwrap_or_else(|| (self.roots.first().cloned().unwrap_or_default(), "not resolved".to_string()));
			return Err(crate::Error::RootUnresolvable { name, reason });
		}

		self.normalize_licenses();

		log::info!("Resolved {} packages, {} provided by the existing environment", self.dep_graph.len(), self.dep_graph.excluded().count());
		Ok(ResolverFinalized::new(self.dep_graph, self.report, self.licenses.into_store()))
	}
}
