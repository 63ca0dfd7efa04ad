//! The Python Package Index JSON API.

use std::collections::BTreeMap;
use serde::Deserialize;

use super::*;
use crate::package::{PackageVersion, Requirement};

#[derive(Debug, Clone, Deserialize)]
struct PypiFile {
	packagetype: String,
	url: String,
	#[serde(default)]
	size: u64,
	#[serde(default)]
	yanked: bool,
}

impl PypiFile {
	/// Smaller is preferred when a file is only downloaded to read its metadata.
	/// Source tarballs come first since wheels may lack files.
	fn metadata_cost(&self) -> u64 {
		let lower = self.url.to_ascii_lowercase();
		if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") || lower.ends_with(".tar") {
			self.size
		} else if lower.ends_with(".zip") {
			self.size.saturating_mul(10)
		} else {
			self.size.saturating_mul(10_000)
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct PypiInfo {
	name: String,
	version: String,
	#[serde(default)]
	summary: Option<String>,
	#[serde(default)]
	home_page: Option<String>,
	#[serde(default)]
	project_urls: Option<BTreeMap<String, String>>,
	#[serde(default)]
	author: Option<String>,
	#[serde(default)]
	author_email: Option<String>,
	#[serde(default)]
	license: Option<String>,
	#[serde(default)]
	license_expression: Option<String>,
	#[serde(default)]
	classifiers: Option<Vec<String>>,
	#[serde(default)]
	requires_dist: Option<Vec<String>>,
}

/// Response of `/pypi/<name>/json` and `/pypi/<name>/<version>/json`.
#[derive(Debug, Deserialize)]
struct PypiRelease {
	info: PypiInfo,
	#[serde(default)]
	releases: BTreeMap<String, Vec<PypiFile>>,
	#[serde(default)]
	urls: Vec<PypiFile>,
}

impl PypiRelease {
	/// Every release with at least one file that isn't yanked.
	///
	/// A yanked release stays available when `pinned` names it exactly.
	fn available_versions(&self, pinned: Option<&PackageVersion>) -> Vec<PackageVersion> {
		let mut versions: Vec<PackageVersion> = self.releases.iter()
			.filter_map(|(v, files)| PackageVersion::new(v).ok().map(|v| (v, files)))
			.filter(|(v, files)| files.iter().any(|f| !f.yanked) || Some(v) == pinned)
			.map(|(v, _)| v)
			.collect();
		versions.sort();
		versions
	}

	fn sdist(&self) -> Option<&PypiFile> {
		self.urls.iter().find(|f| f.packagetype == "sdist")
	}

	fn homepage(&self) -> String {
		let from_urls = || self.info.project_urls.as_ref().and_then(|urls| {
			urls.iter()
				.find(|(k, _)| k.eq_ignore_ascii_case("homepage") || k.eq_ignore_ascii_case("home"))
				.map(|(_, v)| v.clone())
		});
		self.info.home_page.clone()
			.filter(|h| !h.trim().is_empty())
			.or_else(from_urls)
			.unwrap_or_default()
	}

	/// Converts the release into metadata, `requires_dist` entries that don't parse are skipped.
	fn into_metadata(self, available_versions: Vec<PackageVersion>) -> Result<PackageMetadata, FetchError> {
		let version = PackageVersion::new(&self.info.version).map_err(|e| FetchError::Parse(e.to_string()))?;
		let license = self.info.license.clone()
			.filter(|l| !l.trim().is_empty())
			.or_else(|| self.info.license_expression.clone())
			.unwrap_or_default();

		let mut metadata = PackageMetadata {
			name: self.info.name.clone(),
			version,
			available_versions,
			license,
			license_classifiers: self.info.classifiers.clone().unwrap_or_default().into_iter().filter(|c| c.starts_with("License ::")).collect(),
			summary: self.info.summary.clone().unwrap_or_default(),
			homepage: self.homepage(),
			author: self.info.author.clone().unwrap_or_default(),
			author_email: self.info.author_email.clone().unwrap_or_default(),
			source_url: self.sdist().map(|f| f.url.clone()),
			..Default::default()
		};
		metadata.set_requirements(parse_requires_dist(&metadata.name, self.info.requires_dist.as_deref().unwrap_or_default()));
		Ok(metadata)
	}
}

fn parse_requires_dist(package: &str, requires_dist: &[String]) -> Vec<Requirement> {
	requires_dist.iter()
		.filter_map(|r| match Requirement::parse(r) {
			Ok(r) => Some(r),
			Err(e) => {
				log::warn!("Ignoring dependency \"{}\" of {}: {}", r, package, e);
				None
			},
		})
		.collect()
}

/// Metadata from a PyPI compatible index.
#[derive(Debug, Clone)]
pub struct PypiSource {
	client: reqwest::Client,
	base_url: String,
}

impl PypiSource {
	/// # Parameters
	/// - `base_url` - Index root such as `https://pypi.org`.
	/// - `https_only` - Refuse to talk plain HTTP.
	pub fn new(base_url: &str, https_only: bool) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.https_only(https_only)
			.build()?;
		Ok(Self::with_client(client, base_url))
	}

	pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
		Self { client, base_url: base_url.trim_end_matches('/').to_string() }
	}

	pub fn client(&self) -> &reqwest::Client {
		&self.client
	}

	async fn get_release(&self, url: &str) -> Result<PypiRelease, FetchError> {
		log::trace!("GET {}", url);
		let response = self.client.get(url).send().await?.error_for_status()?;
		let text = response.text().await?;
		serde_json::from_str(&text).map_err(|e| FetchError::Parse(e.to_string()))
	}

	/// Reads `Requires-Dist` out of the smallest file of the release when the index doesn't report it.
	async fn requires_dist_from_files(&self, release: &PypiRelease) -> Result<Vec<String>, FetchError> {
		let file = release.urls.iter()
			.filter(|f| !f.yanked)
			.min_by_key(|f| f.metadata_cost())
			.ok_or_else(|| FetchError::Parse("release has no files".to_string()))?;

		log::debug!("Reading dependencies of {} from {}", release.info.name, file.url);
		let data = self.download(&file.url).await?;
		crate::archive::read_requires_dist(&file.url, &data).map_err(|e| FetchError::Parse(e.to_string()))
	}
}

impl MetadataSource for PypiSource {
	async fn fetch(&self, name: &str, constraint: &VersionConstraint) -> Result<PackageMetadata, FetchError> {
		let project = self.get_release(&format!("{}/pypi/{}/json", self.base_url, name)).await?;
		let available = project.available_versions(constraint.pinned());

		let latest = PackageVersion::new(&project.info.version).ok();
		let chosen = match latest.filter(|l| constraint.is_any() && !l.is_prerelease()) {
			Some(latest) => latest,
			None => constraint.max_satisfying(&available)
				.cloned()
				.ok_or_else(|| FetchError::NoMatchingVersion(constraint.to_string()))?,
		};

		let mut release = if project.info.version == chosen.as_str() {
			project
		} else {
			self.get_release(&format!("{}/pypi/{}/{}/json", self.base_url, name, chosen.as_str())).await?
		};

		if release.info.requires_dist.is_none() {
			match self.requires_dist_from_files(&release).await {
				Ok(requires) => release.info.requires_dist = Some(requires),
				Err(e) => log::warn!("Could not read dependencies of {} {}: {}", name, chosen, e),
			}
		}

		release.into_metadata(available)
	}

	async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
		crate::archive::download(&self.client, url).await.map_err(|e| match e {
			crate::archive::ArchiveError::Reqwest(e) => FetchError::from(e),
			e => FetchError::Transient(e.to_string()),
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const REQUESTS: &str = r#"{
		"info": {
			"name": "requests",
			"version": "2.22.0",
			"summary": "Python HTTP for Humans.",
			"home_page": "http://python-requests.org",
			"author": "Kenneth Reitz",
			"author_email": "me@kennethreitz.org",
			"license": "Apache 2.0",
			"classifiers": ["License :: OSI Approved :: Apache Software License", "Natural Language :: English"],
			"requires_dist": [
				"chardet (<3.1.0,>=3.0.2)",
				"idna (<2.9,>=2.5)",
				"urllib3 (!=1.25.0,!=1.25.1,<1.26,>=1.21.1)",
				"certifi (>=2017.4.17)",
				"PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'"
			]
		},
		"releases": {
			"2.21.0": [{"packagetype": "sdist", "url": "https://files/requests-2.21.0.tar.gz", "size": 10}],
			"2.22.0": [{"packagetype": "sdist", "url": "https://files/requests-2.22.0.tar.gz", "size": 10}],
			"3.0.0": [{"packagetype": "sdist", "url": "https://files/requests-3.0.0.tar.gz", "size": 10, "yanked": true}]
		},
		"urls": [
			{"packagetype": "bdist_wheel", "url": "https://files/requests-2.22.0-py2.py3-none-any.whl", "size": 5},
			{"packagetype": "sdist", "url": "https://files/requests-2.22.0.tar.gz", "size": 10}
		]
	}"#;

	fn release() -> PypiRelease {
		serde_json::from_str(REQUESTS).unwrap()
	}

	#[test]
	fn yanked_releases_are_unavailable() {
		let versions = release().available_versions(None);
		assert_eq!(versions, vec![PackageVersion::new("2.21.0").unwrap(), PackageVersion::new("2.22.0").unwrap()]);
	}

	#[test]
	fn pinned_yanked_release_is_available() {
		let pinned = PackageVersion::new("3.0.0").unwrap();
		let versions = release().available_versions(Some(&pinned));
		assert_eq!(versions.last(), Some(&pinned));
		assert_eq!(versions.len(), 3);

		let constraint = VersionConstraint::exact(pinned.clone());
		assert_eq!(constraint.max_satisfying(&versions), Some(&pinned));
	}

	#[test]
	fn release_converts_to_metadata() {
		let release = release();
		let available = release.available_versions(None);
		let meta = release.into_metadata(available).unwrap();
		assert_eq!(meta.name, "requests");
		assert_eq!(meta.license, "Apache 2.0");
		assert_eq!(meta.license_classifiers.len(), 1);
		assert_eq!(meta.requires.len(), 4);
		assert_eq!(meta.optional_groups["socks"][0].name, "PySocks");
		assert_eq!(meta.source_url.as_deref(), Some("https://files/requests-2.22.0.tar.gz"));
	}

	#[test]
	fn tarball_is_cheapest_metadata_file() {
		let release = release();
		let cheapest = release.urls.iter().min_by_key(|f| f.metadata_cost()).unwrap();
		assert_eq!(cheapest.packagetype, "sdist");
	}

	#[test]
	fn null_fields_are_empty() {
		let release: PypiRelease = serde_json::from_str(r#"{"info": {"name": "x", "version": "1.0", "summary": null, "license": null, "license_expression": "MIT", "classifiers": null, "requires_dist": null, "project_urls": {"Homepage": "https://x.example"}}}"#).unwrap();
		let meta = release.into_metadata(vec![]).unwrap();
		assert_eq!(meta.license, "MIT");
		assert_eq!(meta.homepage, "https://x.example");
		assert!(meta.requires.is_empty());
		assert!(meta.source_url.is_none());
	}

	#[test] fn unparsable_requirements_are_skipped() { assert_eq!(parse_requires_dist("x", &["!!!".to_string(), "six".to_string()]).len(), 1) }
}
