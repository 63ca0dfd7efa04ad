//! Various helpers for testing
//!
//! Fixture builders are only fed literals from tests, so malformed input panics instead of returning errors.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use pipoe_rs::package::{normalize_name, PackageMetadata, PackageVersion, Requirement, VersionConstraint};
use pipoe_rs::registry::{FetchError, MetadataSource};

/// An in-memory registry.
#[derive(Debug, Default)]
pub struct FixtureSource {
	releases: BTreeMap<String, Vec<PackageMetadata>>,
	failing: BTreeMap<String, FetchError>,
	archives: BTreeMap<String, Vec<u8>>,
	delays: BTreeMap<String, std::time::Duration>,
	fetched: Mutex<Vec<String>>,
	downloaded: Mutex<Vec<String>>,
}

impl FixtureSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a release licensed `MIT` with a source archive URL of `https://files.example/<name>-<version>.tar.gz`.
	///
	/// # Parameters
	/// - `requires` - `requires_dist` style requirement strings.
	pub fn package(mut self, name: &str, version: &str, requires: &[&str]) -> Self {
		let mut metadata = PackageMetadata {
			name: name.to_string(),
			version: PackageVersion::new(version).expect("fixture version is valid"),
			license: "MIT".to_string(),
			summary: format!("The {} package", name),
			source_url: Some(format!("https://files.example/{}-{}.tar.gz", name, version)),
			..Default::default()
		};
		metadata.set_requirements(requires.iter().map(|r| Requirement::parse(r).expect("fixture requirement is valid")));

		let releases = self.releases.entry(normalize_name(name)).or_default();
		releases.retain(|r| r.version != metadata.version);
		releases.push(metadata);
		self
	}

	/// Sets the raw license of every release of `name` added so far.
	pub fn license(mut self, name: &str, license: &str) -> Self {
		for release in self.releases.entry(normalize_name(name)).or_default() {
			release.license = license.to_string();
		}
		self
	}

	/// Sets the license classifiers of every release of `name` added so far.
	pub fn classifiers(mut self, name: &str, classifiers: &[&str]) -> Self {
		for release in self.releases.entry(normalize_name(name)).or_default() {
			release.license_classifiers = classifiers.iter().map(|c| c.to_string()).collect();
		}
		self
	}

	/// Every fetch of `name` fails with `error`.
	pub fn failing(mut self, name: &str, error: FetchError) -> Self {
		self.failing.insert(normalize_name(name), error);
		self
	}

	/// Every fetch of `name` takes `delay` before answering.
	///
	/// Meant for tests running on a paused clock, where it only orders completions.
	pub fn delay(mut self, name: &str, delay: std::time::Duration) -> Self {
		self.delays.insert(normalize_name(name), delay);
		self
	}

	/// Serves `data` from `url`.
	pub fn archive(mut self, url: &str, data: Vec<u8>) -> Self {
		self.archives.insert(url.to_string(), data);
		self
	}

	/// Names passed to [`fetch`](MetadataSource::fetch), in call order.
	pub fn fetched(&self) -> Vec<String> {
		self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
	}

	pub fn fetch_count(&self, name: &str) -> usize {
		let name = normalize_name(name);
		self.fetched().iter().filter(|f| **f == name).count()
	}

	/// URLs passed to [`download`](MetadataSource::download), in call order.
	pub fn downloaded(&self) -> Vec<String> {
		self.downloaded.lock().map(|d| d.clone()).unwrap_or_default()
	}

	fn lookup(&self, name: &str, constraint: &VersionConstraint) -> Result<PackageMetadata, FetchError> {
		if let Some(error) = self.failing.get(name) {
			return Err(error.clone());
		}
		let releases = self.releases.get(name).ok_or(FetchError::NotFound)?;
		let available: Vec<PackageVersion> = releases.iter().map(|r| r.version.clone()).collect();
		let chosen = constraint.max_satisfying(&available)
			.ok_or_else(|| FetchError::NoMatchingVersion(constraint.to_string()))?;

		let mut metadata = releases.iter()
			.find(|r| &r.version == chosen)
			.cloned()
			.ok_or(FetchError::NotFound)?;
		metadata.available_versions = available;
		Ok(metadata)
	}
}

impl MetadataSource for FixtureSource {
	async fn fetch(&self, name: &str, constraint: &VersionConstraint) -> Result<PackageMetadata, FetchError> {
		let name = normalize_name(name);
		if let Ok(mut fetched) = self.fetched.lock() {
			fetched.push(name.clone());
		}
		if let Some(delay) = self.delays.get(&name) {
			tokio::time::sleep(*delay).await;
		}
		self.lookup(&name, constraint)
	}

	async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
		if let Ok(mut downloaded) = self.downloaded.lock() {
			downloaded.push(url.to_string());
		}
		self.archives.get(url).cloned().ok_or(FetchError::NotFound)
	}
}

/// `requests` 2.22.0 and its four runtime dependencies with their real constraints and licenses.
///
/// Every license has a mapping in the bundled license map. The `socks` and `security` groups are declared
/// but `pysocks` is the only group member present.
pub fn requests_fixture() -> FixtureSource {
	FixtureSource::new()
		.package("requests", "2.22.0", &[
			"chardet (<3.1.0,>=3.0.2)",
			"idna (<2.9,>=2.5)",
			"urllib3 (!=1.25.0,!=1.25.1,<1.26,>=1.21.1)",
			"certifi (>=2017.4.17)",
			"pyOpenSSL (>=0.14) ; extra == 'security'",
			"PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'",
		])
		.license("requests", "Apache 2.0")
		.package("chardet", "3.0.4", &[])
		.license("chardet", "LGPL")
		.package("idna", "2.8", &[])
		.license("idna", "BSD-like")
		.package("urllib3", "1.24.1", &[])
		.package("urllib3", "1.25.3", &[])
		.package("urllib3", "1.26.0", &[])
		.license("urllib3", "MIT")
		.package("certifi", "2019.6.16", &[])
		.license("certifi", "MPL-2.0")
		.package("pysocks", "1.7.0", &[])
		.license("pysocks", "BSD")
}

/// Answers license prompts from a fixed table and records every question asked.
///
/// Clones share the record, keep one to inspect after handing the other to a mapper.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
	answers: BTreeMap<String, String>,
	asked: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedPrompter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Answers `term` with `license`, unknown terms are declined.
	pub fn answer(mut self, term: &str, license: &str) -> Self {
		self.answers.insert(term.to_string(), license.to_string());
		self
	}

	/// `(package, term)` pairs asked so far.
	pub fn asked(&self) -> Vec<(String, String)> {
		self.asked.lock().map(|a| a.clone()).unwrap_or_default()
	}
}

impl pipoe_rs::license::Prompter for ScriptedPrompter {
	fn prompt(&mut self, package: &str, term: &str) -> Option<String> {
		if let Ok(mut asked) = self.asked.lock() {
			asked.push((package.to_string(), term.to_string()));
		}
		self.answers.get(term).cloned()
	}
}

/// An empty output directory removed when dropped.
pub fn temp_out_dir() -> std::io::Result<tempfile::TempDir> {
	tempfile::Builder::new().prefix("pipoe-rs-test").tempdir()
}

/// File names in `dir`, sorted.
pub fn file_names(dir: impl AsRef<std::path::Path>) -> std::io::Result<Vec<String>> {
	let mut names = Vec::<String>::new();
	for entry in std::fs::read_dir(dir)? {
		names.push(entry?.file_name().to_string_lossy().into_owned());
	}
	names.sort();
	Ok(names)
}

/// A `.tar.gz` source distribution with `files` placed under `<name>-<version>/`.
pub fn sdist_archive(name: &str, version: &str, files: &[(&str, &str)]) -> std::io::Result<Vec<u8>> {
	let encoder = flate2::write::GzEncoder::new(Vec::<u8>::new(), flate2::Compression::default());
	let mut builder = tar::Builder::new(encoder);
	for (path, contents) in files {
		let mut header = tar::Header::new_gnu();
		header.set_size(contents.len() as u64);
		header.set_mode(0o644);
		header.set_cksum();
		builder.append_data(&mut header, format!("{}-{}/{}", name, version, path), contents.as_bytes())?;
	}
	let mut encoder = builder.into_inner()?;
	encoder.flush()?;
	encoder.finish()
}
