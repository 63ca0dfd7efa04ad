//! Writing of recipe files for a resolved dependency graph.
//!
//! Output only depends on the graph contents, dependency names and license tokens are always sorted
//! so the same graph always produces byte identical files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::archive::SourceInfo;
use crate::config::PythonTarget;
use crate::package::PackageVersion;
use crate::relationship_resolver::{DependencyGraph, DependencyNode};

mod template;
use template::{GroupTemplate, PackageTemplate};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeEmitter {
	target: PythonTarget,
	use_pypi_class: bool,
}

impl RecipeEmitter {
	/// # Parameters
	/// - `target` - Interpreter generation, also the prefix of every recipe name.
	/// - `use_pypi_class` - Inherit the `pypi` class instead of spelling out `SRC_URI`.
	pub fn new(target: PythonTarget, use_pypi_class: bool) -> Self {
		Self { target, use_pypi_class }
	}

	/// `python3-requests`
	pub fn recipe_name(&self, name: &str) -> String {
		format!("{}-{}", self.target.prefix(), name)
	}

	/// `python3-requests_2.22.0.bb`
	pub fn file_name(&self, name: &str, version: &PackageVersion) -> String {
		format!("{}_{}.bb", self.recipe_name(name), version)
	}

	/// `python3-requests-socks_2.22.0.bb`
	pub fn group_file_name(&self, name: &str, group: &str, version: &PackageVersion) -> String {
		format!("{}-{}_{}.bb", self.recipe_name(name), group, version)
	}

	pub fn render_recipe(&self, node: &DependencyNode, source: Option<&SourceInfo>) -> String {
		PackageTemplate {
			prefix: self.target.prefix(),
			use_pypi_class: self.use_pypi_class,
			node,
			source,
		}.render()
	}

	/// Returns `None` when `node` didn't request `group`.
	pub fn render_group(&self, node: &DependencyNode, group: &str) -> Option<String> {
		node.groups.get(group).map(|dependencies| GroupTemplate {
			prefix: self.target.prefix(),
			node,
			dependencies,
		}.render())
	}

	/// Writes a recipe for every resolved package and every requested optional group.
	pub fn emit(&self, graph: &DependencyGraph, out_dir: &Path) -> crate::Result<Vec<PathBuf>> {
		self.emit_with_sources(graph, &BTreeMap::new(), out_dir)
	}

	/// Like [`emit`](Self::emit), filling in checksums and build requirements for packages found in `sources`.
	///
	/// # Parameters
	/// - `sources` - Source archive details by normalized package name.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when a file can't be written, files written before it are left in place.
	pub fn emit_with_sources(&self, graph: &DependencyGraph, sources: &BTreeMap<String, SourceInfo>, out_dir: &Path) -> crate::Result<Vec<PathBuf>> {
		std::fs::create_dir_all(out_dir)?;
		let mut written = Vec::<PathBuf>::new();

		for node in graph.nodes() {
			let path = out_dir.join(self.file_name(&node.name, &node.version));
			std::fs::write(&path, self.render_recipe(node, sources.get(&node.name)))?;
			log::info!("Wrote {}", path.display());
			written.push(path);

			for group in node.groups.keys() {
				let Some(text) = self.render_group(node, group) else { continue };
				let path = out_dir.join(self.group_file_name(&node.name, group, &node.version));
				std::fs::write(&path, text)?;
				log::info!("Wrote {}", path.display());
				written.push(path);
			}
		}

		Ok(written)
	}

	/// Writes `<prefix>-versions.inc` pinning every resolved package to its version.
	pub fn write_preferred_versions(&self, graph: &DependencyGraph, out_dir: &Path) -> crate::Result<PathBuf> {
		std::fs::create_dir_all(out_dir)?;
		let path = out_dir.join(format!("{}-versions.inc", self.target.prefix()));

		let mut text = String::new();
		for node in graph.nodes() {
			text.push_str(&format!("PREFERRED_VERSION_{} = \"{}\"\n", self.recipe_name(&node.name), node.version));
		}
		std::fs::write(&path, text)?;
		log::info!("Wrote {}", path.display());
		Ok(path)
	}
}

#[cfg(test)]
mod test {
	use std::collections::BTreeSet;

	use super::*;
	use crate::license::{Conjunction, LicenseExpression};
	use crate::package::PackageMetadata;

	fn node() -> DependencyNode {
		DependencyNode {
			name: "requests".to_string(),
			version: PackageVersion::new("2.22.0").unwrap(),
			license: LicenseExpression::new(["MIT", "Apache-2.0"], Conjunction::Any).unwrap(),
			metadata: PackageMetadata {
				name: "requests".to_string(),
				summary: "Python HTTP for Humans.".to_string(),
				homepage: "http://python-requests.org".to_string(),
				author: "Kenneth Reitz".to_string(),
				author_email: "me@kennethreitz.org".to_string(),
				source_url: Some("https://files.example/requests-2.22.0.zip".to_string()),
				..Default::default()
			},
			dependencies: BTreeSet::from(["urllib3".to_string(), "idna".to_string(), "chardet".to_string()]),
			groups: [("socks".to_string(), BTreeSet::from(["pysocks".to_string()]))].into_iter().collect(),
		}
	}

	fn source() -> SourceInfo {
		SourceInfo {
			sha256: "abc".to_string(),
			src_dir: "requests-2.22.0".to_string(),
			license_file: Some("LICENSE".to_string()),
			license_sha256: Some("def".to_string()),
			build_requires: BTreeSet::from(["setuptools-scm".to_string()]),
		}
	}

	#[test]
	fn file_names() {
		let e = RecipeEmitter::new(PythonTarget::Python3, false);
		let v = PackageVersion::new("2.22.0").unwrap();
		assert_eq!(e.file_name("requests", &v), "python3-requests_2.22.0.bb");
		assert_eq!(e.group_file_name("requests", "socks", &v), "python3-requests-socks_2.22.0.bb");
	}

	#[test]
	fn plain_recipe() {
		let text = RecipeEmitter::new(PythonTarget::Python3, false).render_recipe(&node(), Some(&source()));
		assert!(text.contains("LICENSE = \"Apache-2.0 | MIT\"\n"));
		assert!(text.contains("LIC_FILES_CHKSUM = \"file://LICENSE;sha256=def\"\n"));
		assert!(text.contains("inherit setuptools3\n"));
		assert!(text.contains("SRC_URI = \"https://files.example/requests-2.22.0.zip\"\n"));
		assert!(text.contains("S = \"${WORKDIR}/requests-2.22.0\"\n"));
		assert!(text.contains("DEPENDS += \"${PYTHON_PN}-setuptools-scm-native\"\n"));
		assert!(text.contains("RDEPENDS_${PN} = \"python3-chardet python3-idna python3-urllib3\"\n"));
		assert!(text.contains("AUTHOR = \"Kenneth Reitz <me@kennethreitz.org>\"\n"));
	}

	#[test]
	fn pypi_recipe() {
		let text = RecipeEmitter::new(PythonTarget::Python, true).render_recipe(&node(), None);
		assert!(text.contains("inherit setuptools pypi\n"));
		assert!(text.contains("PYPI_PACKAGE = \"requests\"\n"));
		assert!(text.contains("PYPI_PACKAGE_EXT = \"zip\"\n"));
		assert!(!text.contains("SRC_URI ="));
		assert!(text.contains("RDEPENDS_${PN} = \"python-chardet python-idna python-urllib3\"\n"));
	}

	#[test]
	fn group_recipe() {
		let text = RecipeEmitter::new(PythonTarget::Python3, false).render_group(&node(), "socks").unwrap();
		assert!(text.contains("RDEPENDS_${PN} = \"python3-pysocks python3-requests\"\n"));
		assert!(text.contains("inherit packagegroup\n"));
	}

	#[test] fn unknown_group_renders_nothing() { assert!(RecipeEmitter::default().render_group(&node(), "nope").is_none()) }
}
