//! Downloading and reading of package source archives.
//!
//! Archives are never extracted to disk, only the top two levels of the archive are read into memory
//! which is where every file of interest lives.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::OnceLock;

use regex::Regex;

use crate::package::normalize_name;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
	#[error("download failed: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	/// Only gzip compressed or plain tarballs, zips and wheels can be read.
	#[error("unsupported archive format: {0}")]
	Unsupported(String),
	#[error("archive has no top level source directory")]
	NoSourceDirectory,
	#[error("archive has no package metadata")]
	NoMetadata,
}

/// What a recipe needs to know about a source archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
	pub sha256: String,
	/// Directory the archive unpacks into.
	pub src_dir: String,
	/// Path of the license file relative to `src_dir`.
	pub license_file: Option<String>,
	pub license_sha256: Option<String>,
	/// Normalized names of packages needed to build the package.
	pub build_requires: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
	TarGz,
	Tar,
	Zip,
}

impl ArchiveKind {
	fn from_filename(filename: &str) -> Result<Self, ArchiveError> {
		let lower = filename.to_ascii_lowercase();
		if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
			Ok(ArchiveKind::TarGz)
		} else if lower.ends_with(".tar") {
			Ok(ArchiveKind::Tar)
		} else if lower.ends_with(".zip") || lower.ends_with(".whl") {
			Ok(ArchiveKind::Zip)
		} else {
			Err(ArchiveError::Unsupported(filename.to_string()))
		}
	}
}

/// The last path segment of a URL without query or fragment.
pub fn filename_from_url(url: &str) -> &str {
	let url = url.split(['?', '#']).next().unwrap_or(url);
	url.rsplit('/').next().unwrap_or(url)
}

/// The archive extension BitBake needs to know about, `tar.gz` and friends.
pub fn archive_extension(filename: &str) -> Option<&'static str> {
	let lower = filename.to_ascii_lowercase();
	["tar.gz", "tar.bz2", "tar.xz", "tgz", "tar", "zip", "whl"].into_iter().find(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Top level entries plus the contents of every file at most two levels deep.
#[derive(Debug, Default)]
struct Listing {
	top_level: Vec<String>,
	files: BTreeMap<String, Vec<u8>>,
}

impl Listing {
	fn note(&mut self, path: &str, is_dir: bool) {
		let mut components = path.split('/').filter(|c| !c.is_empty() && *c != ".");
		if let Some(first) = components.next() {
			let nested = components.next().is_some();
			if (nested || is_dir) && !self.top_level.iter().any(|t| t == first) {
				self.top_level.push(first.to_string());
			}
		}
	}

	fn wants(path: &str) -> bool {
		path.split('/').filter(|c| !c.is_empty() && *c != ".").count() <= 2
	}

	fn clean(path: &str) -> String {
		path.trim_start_matches("./").trim_end_matches('/').to_string()
	}

	fn read(kind: ArchiveKind, data: &[u8]) -> Result<Self, ArchiveError> {
		match kind {
			ArchiveKind::TarGz => Self::read_tar(tar::Archive::new(flate2::read::GzDecoder::new(data))),
			ArchiveKind::Tar => Self::read_tar(tar::Archive::new(data)),
			ArchiveKind::Zip => Self::read_zip(data),
		}
	}

	fn read_tar<R: Read>(mut archive: tar::Archive<R>) -> Result<Self, ArchiveError> {
		let mut listing = Listing::default();
		for entry in archive.entries()? {
			let mut entry = entry?;
			let kind = entry.header().entry_type();
			if !(kind.is_file() || kind.is_dir()) {
				continue;
			}

			let path = Self::clean(&entry.path()?.to_string_lossy());
			listing.note(&path, kind.is_dir());
			if kind.is_file() && Self::wants(&path) {
				let mut buf = Vec::<u8>::new();
				entry.read_to_end(&mut buf)?;
				listing.files.insert(path, buf);
			}
		}
		Ok(listing)
	}

	fn read_zip(data: &[u8]) -> Result<Self, ArchiveError> {
		let mut listing = Listing::default();
		let mut zip = zip::ZipArchive::new(std::io::Cursor::new(data))?;
		for i in 0..zip.len() {
			let mut file = zip.by_index(i)?;
			let path = Self::clean(file.name());
			let is_dir = file.is_dir();
			listing.note(&path, is_dir);
			if !is_dir && Self::wants(&path) {
				let mut buf = Vec::<u8>::new();
				file.read_to_end(&mut buf)?;
				listing.files.insert(path, buf);
			}
		}
		Ok(listing)
	}

	/// Files directly inside `dir`, by file name.
	fn files_in<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a Vec<u8>)> + 'a {
		self.files.iter().filter_map(move |(path, data)| {
			path.strip_prefix(dir)
				.and_then(|rest| rest.strip_prefix('/'))
				.filter(|name| !name.contains('/'))
				.map(|name| (name, data))
		})
	}
}

/// Downloads `url` into memory.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, ArchiveError> {
	log::debug!("Downloading {}", url);
	let response = client.get(url).send().await?.error_for_status()?;
	Ok(response.bytes().await?.to_vec())
}

/// Reads checksums, layout and build requirements out of a source distribution.
///
/// # Parameters
/// - `filename` - Archive file name or URL, decides how `data` is read.
/// - `data` - The complete archive.
///
/// # Errors
/// - [`ArchiveError::Unsupported`] for anything but `.tar.gz`, `.tgz`, `.tar`, `.zip` and `.whl`.
/// - [`ArchiveError::NoSourceDirectory`] when nothing in the archive is inside a directory.
pub fn inspect_archive(filename: &str, data: &[u8]) -> Result<SourceInfo, ArchiveError> {
	let filename = filename_from_url(filename);
	let listing = Listing::read(ArchiveKind::from_filename(filename)?, data)?;
	let src_dir = listing.top_level.first().cloned().ok_or(ArchiveError::NoSourceDirectory)?;

	let files: BTreeMap<&str, &Vec<u8>> = listing.files_in(&src_dir).collect();

	let license_file = files.keys()
		.find(|name| {
			let lower = name.to_ascii_lowercase();
			lower.contains("license") || lower.contains("copying")
		})
		.or_else(|| files.keys().find(|name| **name == "setup.py"))
		.or_else(|| files.keys().find(|name| **name == "pyproject.toml"))
		.copied();

	let mut build_requires = BTreeSet::<String>::new();
	if let Some(setup) = files.get("setup.py") {
		build_requires.extend(setup_requires(&String::from_utf8_lossy(setup)));
	}
	if let Some(pyproject) = files.get("pyproject.toml") {
		build_requires.extend(build_system_requires(&String::from_utf8_lossy(pyproject)));
	}

	Ok(SourceInfo {
		sha256: sha256::digest(data),
		license_sha256: license_file.and_then(|f| files.get(f)).map(|d| sha256::digest(d.as_slice())),
		license_file: license_file.map(str::to_string),
		src_dir,
		build_requires,
	})
}

/// Reads the `Requires-Dist` headers of the `PKG-INFO` (source distribution) or `METADATA` (wheel) file.
///
/// # Errors
/// - [`ArchiveError::NoMetadata`] when neither file exists.
pub fn read_requires_dist(filename: &str, data: &[u8]) -> Result<Vec<String>, ArchiveError> {
	let filename = filename_from_url(filename);
	let listing = Listing::read(ArchiveKind::from_filename(filename)?, data)?;

	let metadata = listing.files.iter()
		.find(|(path, _)| {
			let mut parts = path.splitn(2, '/');
			let dir = parts.next().unwrap_or_default();
			match parts.next() {
				Some("PKG-INFO") => true,
				Some("METADATA") => dir.ends_with(".dist-info"),
				_ => false,
			}
		})
		.map(|(_, data)| String::from_utf8_lossy(data).to_string())
		.ok_or(ArchiveError::NoMetadata)?;

	Ok(metadata.lines()
		.take_while(|line| !line.is_empty())
		.filter_map(|line| line.strip_prefix("Requires-Dist:"))
		.map(|r| r.trim().to_string())
		.filter(|r| !r.is_empty())
		.collect())
}

fn quoted_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("quoted string regex is valid"))
}

fn leading_name_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("leading name regex is valid"))
}

/// The text of a `[...]`/`(...)` list starting at `text`, or the rest of the line when there is no bracket.
fn list_body(text: &str) -> &str {
	let text = text.trim_start();
	let close = match text.chars().next() {
		Some('[') => ']',
		Some('(') => ')',
		_ => return text.lines().next().unwrap_or_default(),
	};
	match text.find(close) {
		Some(end) => &text[1..end],
		None => text.lines().next().unwrap_or_default(),
	}
}

fn names_in(body: &str) -> impl Iterator<Item = String> + '_ {
	quoted_regex().captures_iter(body)
		.filter_map(|c| leading_name_regex().captures(&c[1]).map(|n| normalize_name(&n[1])))
}

/// Packages named by `setup_requires=` in a `setup.py`, following one level of variable indirection.
fn setup_requires(text: &str) -> BTreeSet<String> {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| Regex::new(r"(?m)^\s*setup_requires\s*=\s*").expect("setup_requires regex is valid"));

	let mut names = BTreeSet::<String>::new();
	for m in re.find_iter(text) {
		let body = list_body(&text[m.end()..]);
		names.extend(names_in(body));

		/* `setup_requires=SETUP_REQUIRES` names a list defined elsewhere in the file */
		for variable in body.split(',').map(|v| v.trim().trim_end_matches(')')).filter(|v| !v.is_empty() && v.chars().all(|c| c.is_alphanumeric() || c == '_')) {
			let Ok(definition) = Regex::new(&format!(r"(?m)^\s*{}\s*=\s*", regex::escape(variable))) else { continue };
			if let Some(d) = definition.find(text) {
				names.extend(names_in(list_body(&text[d.end()..])));
			}
		}
	}
	names
}

/// Packages in the `requires` list of the `[build-system]` table of a `pyproject.toml`.
fn build_system_requires(text: &str) -> BTreeSet<String> {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| Regex::new(r"(?ms)^\[build-system\][^\[]*?^\s*requires\s*=\s*").expect("build-system regex is valid"));
	re.find(text)
		.map(|m| names_in(list_body(&text[m.end()..])).collect())
		.unwrap_or_default()
}
