//! BitBake recipe text.

use std::collections::BTreeSet;

use crate::archive::SourceInfo;
use crate::relationship_resolver::DependencyNode;

/// Makes `value` safe inside a double quoted BitBake assignment.
pub(super) fn escape(value: &str) -> String {
	value
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.replace('\\', "\\\\")
		.replace('"', "\\\"")
		.replace('$', "\\$")
}

fn assign(lines: &mut Vec<String>, key: &str, value: &str) {
	lines.push(format!("{} = \"{}\"", key, value));
}

/// `SUMMARY`, `HOMEPAGE` and `AUTHOR`, empty values are left out.
fn description(lines: &mut Vec<String>, node: &DependencyNode) {
	let meta = &node.metadata;
	if !meta.summary.trim().is_empty() {
		assign(lines, "SUMMARY", &escape(&meta.summary));
	}
	if !meta.homepage.trim().is_empty() {
		assign(lines, "HOMEPAGE", &escape(&meta.homepage));
	}
	let author = match (meta.author.trim(), meta.author_email.trim()) {
		("", "") => None,
		(author, "") => Some(author.to_string()),
		("", email) => Some(format!("<{}>", email)),
		(author, email) => Some(format!("{} <{}>", author, email)),
	};
	if let Some(author) = author {
		assign(lines, "AUTHOR", &escape(&author));
	}
}

fn finish(mut lines: Vec<String>) -> String {
	lines.push(String::new());
	lines.join("\n")
}

pub(super) struct PackageTemplate<'a> {
	pub prefix: &'a str,
	pub use_pypi_class: bool,
	pub node: &'a DependencyNode,
	pub source: Option<&'a SourceInfo>,
}

impl PackageTemplate<'_> {
	pub fn render(&self) -> String {
		let node = self.node;
		let mut lines = Vec::<String>::new();

		description(&mut lines, node);
		assign(&mut lines, "LICENSE", &node.license.to_string());
		if let Some((file, sha256)) = self.source.and_then(|s| s.license_file.as_ref().zip(s.license_sha256.as_ref())) {
			assign(&mut lines, "LIC_FILES_CHKSUM", &format!("file://{};sha256={}", file, sha256));
		}
		lines.push(String::new());

		let setuptools = if self.prefix == "python3" { "setuptools3" } else { "setuptools" };
		if self.use_pypi_class {
			lines.push(format!("inherit {} pypi", setuptools));
			lines.push(String::new());
			if let Some(source) = self.source {
				assign(&mut lines, "SRC_URI[sha256sum]", &source.sha256);
				lines.push(String::new());
			}
			assign(&mut lines, "PYPI_PACKAGE", &node.metadata.name);
			let extension = node.metadata.source_url.as_deref()
				.map(crate::archive::filename_from_url)
				.and_then(crate::archive::archive_extension)
				.filter(|ext| *ext != "tar.gz");
			if let Some(extension) = extension {
				assign(&mut lines, "PYPI_PACKAGE_EXT", extension);
			}
		} else {
			lines.push(format!("inherit {}", setuptools));
			if let Some(url) = &node.metadata.source_url {
				lines.push(String::new());
				assign(&mut lines, "SRC_URI", url);
				if let Some(source) = self.source {
					assign(&mut lines, "SRC_URI[sha256sum]", &source.sha256);
					lines.push(String::new());
					assign(&mut lines, "S", &format!("${{WORKDIR}}/{}", source.src_dir));
				}
			}
		}
		lines.push(String::new());

		if let Some(source) = self.source.filter(|s| !s.build_requires.is_empty()) {
			let build: Vec<String> = source.build_requires.iter().map(|b| format!("${{PYTHON_PN}}-{}-native", b)).collect();
			lines.push(format!("DEPENDS += \"{}\"", build.join(" ")));
		}
		assign(&mut lines, "RDEPENDS_${PN}", &self.prefixed(&node.dependencies));
		lines.push(String::new());
		assign(&mut lines, "BBCLASSEXTEND", "native nativesdk");

		finish(lines)
	}

	fn prefixed(&self, names: &BTreeSet<String>) -> String {
		names.iter().map(|n| format!("{}-{}", self.prefix, n)).collect::<Vec<_>>().join(" ")
	}
}

/// A `packagegroup` recipe pulling in a package together with one of its optional groups.
pub(super) struct GroupTemplate<'a> {
	pub prefix: &'a str,
	pub node: &'a DependencyNode,
	pub dependencies: &'a BTreeSet<String>,
}

impl GroupTemplate<'_> {
	pub fn render(&self) -> String {
		let mut lines = Vec::<String>::new();
		description(&mut lines, self.node);
		lines.push(String::new());

		let mut names: BTreeSet<&str> = self.dependencies.iter().map(String::as_str).collect();
		names.insert(self.node.name.as_str());
		let depends: Vec<String> = names.into_iter().map(|n| format!("{}-{}", self.prefix, n)).collect();
		assign(&mut lines, "RDEPENDS_${PN}", &depends.join(" "));
		lines.push(String::new());
		lines.push("inherit packagegroup".to_string());
		lines.push(String::new());
		assign(&mut lines, "BBCLASSEXTEND", "native nativesdk");

		finish(lines)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn escape_quotes() { assert_eq!(escape("say \"hi\""), "say \\\"hi\\\"") }
	#[test] fn escape_newlines() { assert_eq!(escape("one\ntwo  three"), "one two three") }
	#[test] fn escape_variables() { assert_eq!(escape("costs $5"), "costs \\$5") }
}
