//! Module for only DependencyGraph functions not related to the overall resolving process.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
	/// Control node for giving the root requests a presence in the graph.
	Meta,
	/// Node only refers to a name with no additional information, its metadata is still being fetched.
	Stub(String),
	Resolved(DependencyNode),
	/// Provided by the existing environment, possibly at an unknown version.
	Excluded(String, Option<PackageVersion>),
}

impl NodeData {
	pub fn name(&self) -> Option<&str> {
		match self {
			NodeData::Meta => None,
			NodeData::Stub(name) | NodeData::Excluded(name, _) => Some(name),
			NodeData::Resolved(node) => Some(&node.name),
		}
	}

	/// The name of a node that represents a real package, stubs don't.
	fn package_name(&self) -> Option<&str> {
		match self {
			NodeData::Resolved(node) => Some(&node.name),
			NodeData::Excluded(name, _) => Some(name),
			NodeData::Meta | NodeData::Stub(_) => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeData {
	/// A runtime requirement from the source package for the target to be within the constraint.
	Depends(VersionConstraint),
	/// A requirement belonging to an optional group of the source package.
	Optional(String, VersionConstraint),
}

/// Packages keyed by normalized name with their requirements as edges.
///
/// Every name has at most one node. The meta node has an edge to every root package.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
	graph: StableDiGraph<NodeData, EdgeData>,
	meta_node: NodeIndex,
	index: BTreeMap<String, NodeIndex>,
}

impl Default for DependencyGraph {
	fn default() -> Self {
		let mut graph = StableDiGraph::<NodeData, EdgeData>::default();
		let meta_node = graph.add_node(NodeData::Meta);
		Self { graph, meta_node, index: Default::default() }
	}
}

impl DependencyGraph {
	pub fn graph(&self) -> &StableDiGraph<NodeData, EdgeData> {
		&self.graph
	}

	pub fn meta_node(&self) -> NodeIndex {
		self.meta_node
	}

	pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
		self.index.get(name).copied()
	}

	pub fn node_data(&self, name: &str) -> Option<&NodeData> {
		self.node_index(name).and_then(|i| self.graph.node_weight(i))
	}

	/// The resolved package called `name`.
	pub fn get(&self, name: &str) -> Option<&DependencyNode> {
		match self.node_data(name) {
			Some(NodeData::Resolved(node)) => Some(node),
			_ => None,
		}
	}

	/// `true` when `name` is resolved or provided by the existing environment.
	pub fn contains(&self, name: &str) -> bool {
		self.node_data(name).and_then(NodeData::package_name).is_some()
	}

	/// Resolved packages sorted by name.
	pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
		self.index.values().filter_map(|i| match &self.graph[*i] {
			NodeData::Resolved(node) => Some(node),
			_ => None,
		})
	}

	/// Indices of the resolved packages, sorted by name.
	pub(super) fn resolved_indices(&self) -> Vec<NodeIndex> {
		self.index.values().copied().filter(|i| matches!(self.graph[*i], NodeData::Resolved(_))).collect()
	}

	/// Packages left to the existing environment, sorted by name.
	pub fn excluded(&self) -> impl Iterator<Item = (&str, Option<&PackageVersion>)> {
		self.index.values().filter_map(|i| match &self.graph[*i] {
			NodeData::Excluded(name, version) => Some((name.as_str(), version.as_ref())),
			_ => None,
		})
	}

	/// Number of resolved packages.
	pub fn len(&self) -> usize {
		self.nodes().count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Names of the packages requiring `name`, root requests aren't included.
	pub fn referrers(&self, name: &str) -> BTreeSet<String> {
		let Some(i) = self.node_index(name) else { return Default::default() };
		self.graph.edges_directed(i, Incoming)
			.filter(|e| e.source() != i)
			.filter_map(|e| self.graph[e.source()].name())
			.map(str::to_string)
			.collect()
	}

	/// `true` when `name` was one of the requested root packages.
	pub fn is_root(&self, name: &str) -> bool {
		self.node_index(name).is_some_and(|i| self.graph.find_edge(self.meta_node, i).is_some())
	}

	/// Index of `name` if it is resolved at exactly `version`.
	pub(super) fn resolved_index(&self, name: &str, version: &PackageVersion) -> Option<NodeIndex> {
		self.node_index(name).filter(|i| matches!(&self.graph[*i], NodeData::Resolved(node) if node.version == *version))
	}

	pub(super) fn node_weight_mut(&mut self, i: NodeIndex) -> Option<&mut NodeData> {
		self.graph.node_weight_mut(i)
	}

	pub(super) fn node_weight(&self, i: NodeIndex) -> Option<&NodeData> {
		self.graph.node_weight(i)
	}

	/// Returns the index of the existing node or a new `Stub` node with `name`.
	pub(super) fn get_or_add_node_index(&mut self, name: &str) -> NodeIndex {
		if let Some(i) = self.node_index(name) {
			return i;
		}
		let i = self.graph.add_node(NodeData::Stub(name.to_string()));
		self.index.insert(name.to_string(), i);
		i
	}

	/// Replaces the data of a node, edges are kept.
	pub(super) fn set_node(&mut self, i: NodeIndex, data: NodeData) {
		self.graph[i] = data;
	}

	/// Adds a requirement edge unless the same one already exists.
	pub(super) fn add_requirement(&mut self, src: NodeIndex, target: NodeIndex, edge: EdgeData) {
		let exists = self.graph.edges_directed(src, Outgoing).any(|e| e.target() == target && *e.weight() == edge);
		if !exists {
			self.graph.add_edge(src, target, edge);
		}
	}

	/// Removes the requirement edge `src` → `target` carrying `edge`.
	pub(super) fn remove_requirement(&mut self, src: NodeIndex, target: NodeIndex, edge: &EdgeData) {
		let found = self.graph.edges_directed(src, Outgoing).find(|e| e.target() == target && e.weight() == edge).map(|e| e.id());
		if let Some(id) = found {
			self.graph.remove_edge(id);
		}
	}

	/// Removes all outgoing requirements of `src`.
	pub(super) fn clear_node_requirements(&mut self, src: NodeIndex) {
		for id in self.graph.edges_directed(src, Outgoing).map(|e| e.id()).collect::<Vec<_>>() {
			self.graph.remove_edge(id);
		}
	}

	/// Removes `name` and every edge touching it.
	pub(super) fn remove_package(&mut self, name: &str) {
		if let Some(i) = self.index.remove(name) {
			self.graph.remove_node(i);
		}
	}

	fn remove_index(&mut self, i: NodeIndex) {
		if let Some(name) = self.graph.node_weight(i).and_then(NodeData::name).map(str::to_string) {
			self.index.remove(&name);
		}
		self.graph.remove_node(i);
	}

	/// Removes stubs left behind by fetches that never completed.
	pub(super) fn clear_stubs(&mut self) {
		let stubs: Vec<NodeIndex> = self.graph.node_indices().filter(|i| matches!(self.graph[*i], NodeData::Stub(_))).collect();
		for i in stubs {
			self.remove_index(i);
		}
	}

	/// Removes every node the meta node can no longer reach.
	pub(super) fn clear_loose_nodes(&mut self) {
		let mut reached = HashSet::<NodeIndex>::new();
		let mut bfs = petgraph::visit::Bfs::new(&self.graph, self.meta_node);
		while let Some(i) = bfs.next(&self.graph) {
			reached.insert(i);
		}

		let loose: Vec<NodeIndex> = self.graph.node_indices().filter(|i| !reached.contains(i)).collect();
		for i in loose {
			log::debug!("Dropping unreachable package {}", self.graph[i].name().unwrap_or_default());
			self.remove_index(i);
		}
	}

	/// Fills the dependency sets of every resolved node from its outgoing edges.
	///
	/// Only edges to resolved or excluded packages count, a package never depends on itself.
	pub(super) fn fill_dependencies(&mut self) {
		let mut updates = Vec::<(NodeIndex, BTreeSet<String>, BTreeMap<String, BTreeSet<String>>)>::new();

		for i in self.graph.node_indices() {
			let NodeData::Resolved(node) = &self.graph[i] else { continue };
			let mut dependencies = BTreeSet::<String>::new();
			let mut groups: BTreeMap<String, BTreeSet<String>> = node.groups.keys().map(|g| (g.clone(), BTreeSet::new())).collect();

			for e in self.graph.edges_directed(i, Outgoing) {
				if e.target() == i {
					continue;
				}
				let Some(target) = self.graph[e.target()].package_name() else { continue };
				match e.weight() {
					EdgeData::Depends(_) => { dependencies.insert(target.to_string()); },
					EdgeData::Optional(group, _) => { groups.entry(group.clone()).or_default().insert(target.to_string()); },
				}
			}
			updates.push((i, dependencies, groups));
		}

		for (i, dependencies, groups) in updates {
			if let NodeData::Resolved(node) = &mut self.graph[i] {
				node.dependencies = dependencies;
				node.groups = groups;
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn node(name: &str, version: &str) -> NodeData {
		NodeData::Resolved(DependencyNode {
			name: name.to_string(),
			version: PackageVersion::new(version).unwrap(),
			license: LicenseExpression::single("MIT").unwrap(),
			metadata: Default::default(),
			dependencies: Default::default(),
			groups: Default::default(),
		})
	}

	fn graph() -> DependencyGraph {
		let mut g = DependencyGraph::default();
		let a = g.get_or_add_node_index("a");
		let b = g.get_or_add_node_index("b");
		let c = g.get_or_add_node_index("c");
		g.set_node(a, node("a", "1.0"));
		g.set_node(b, node("b", "1.0"));
		g.set_node(c, NodeData::Excluded("c".to_string(), None));
		let meta = g.meta_node();
		g.add_requirement(meta, a, EdgeData::Depends(VersionConstraint::any()));
		g.add_requirement(a, b, EdgeData::Depends(VersionConstraint::any()));
		g.add_requirement(a, b, EdgeData::Depends(VersionConstraint::any()));
		g.add_requirement(b, c, EdgeData::Depends(VersionConstraint::any()));
		g
	}

	#[test] fn duplicate_edges_are_ignored() { assert_eq!(graph().graph().edge_count(), 3) }
	#[test] fn root_is_known() { assert!(graph().is_root("a") && !graph().is_root("b")) }
	#[test] fn referrers_exclude_meta() { assert_eq!(graph().referrers("a").len(), 0) }

	#[test]
	fn loose_nodes_and_stubs_are_removed() {
		let mut g = graph();
		g.get_or_add_node_index("stub");
		let loose = g.get_or_add_node_index("loose");
		g.set_node(loose, node("loose", "1.0"));
		g.clear_stubs();
		g.clear_loose_nodes();
		assert!(g.node_index("stub").is_none());
		assert!(g.node_index("loose").is_none());
		assert_eq!(g.len(), 2);
	}

	#[test]
	fn dependencies_include_excluded_targets() {
		let mut g = graph();
		g.fill_dependencies();
		assert_eq!(g.get("a").unwrap().dependencies, BTreeSet::from(["b".to_string()]));
		assert_eq!(g.get("b").unwrap().dependencies, BTreeSet::from(["c".to_string()]));
		assert_eq!(g.excluded().count(), 1);
	}
}
