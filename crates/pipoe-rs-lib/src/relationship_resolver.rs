//! Discovery of the full dependency tree of a set of root packages.
//!
//! # Usage
//! 1. Create a [`ResolverBuilder`] with a [`MetadataSource`](crate::registry::MetadataSource) and a [`LicenseMapper`].
//! 1. Use the builder to add root packages, the existing environment and options.
//! 1. [`ResolverBuilder::build()`] to get a [`ResolverProcessor`].
//! 1. [`ResolverProcessor::resolve()`] to walk the tree, this fetches metadata concurrently.
//! 1. Query the returned [`ResolverFinalized`] for the [`DependencyGraph`] and the [`Report`] of everything that went wrong.
//!
//! Version conflicts are settled by "highest wins", see [`VersionReconciler`]. There is no backtracking.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::prelude::*;

use crate::license::{LicenseExpression, LicenseMapper, Prompter};
use crate::package::*;
use crate::report::{Diagnostic, Report};

mod dependency_graph;
pub use dependency_graph::DependencyGraph;
pub use dependency_graph::NodeData;
pub use dependency_graph::EdgeData;

mod reconciler;
pub use reconciler::VersionReconciler;
pub use reconciler::Reconciliation;

mod resolver_builder;
pub use resolver_builder::ResolverBuilder;
mod processing_resolver;
pub use processing_resolver::ResolverProcessor;
mod finalized_resolver;
pub use finalized_resolver::ResolverFinalized;

/// A resolved package.
///
/// A node is replaced as a whole when a later requirement forces a different version.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
	/// Normalized name.
	pub name: String,
	pub version: PackageVersion,
	pub license: LicenseExpression,
	pub metadata: PackageMetadata,
	/// Names of the packages this one requires, filled in once the resolve is complete.
	pub dependencies: BTreeSet<String>,
	/// Requested optional groups and the names of the packages each one requires.
	pub groups: BTreeMap<String, BTreeSet<String>>,
}
