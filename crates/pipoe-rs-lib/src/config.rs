/// The interpreter generation recipes are generated for, also the prefix of every recipe name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PythonTarget {
	Python,
	#[default] Python3,
}

impl PythonTarget {
	pub fn prefix(&self) -> &'static str {
		match self {
			PythonTarget::Python => "python",
			PythonTarget::Python3 => "python3",
		}
	}
}

impl std::str::FromStr for PythonTarget {
	type Err = crate::Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"python" => Ok(PythonTarget::Python),
			"python3" => Ok(PythonTarget::Python3),
			_ => Err(crate::Error::Validation(format!("unknown python target \"{}\", expected python or python3", s))),
		}
	}
}

impl std::fmt::Display for PythonTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.prefix())
	}
}

/// License used when nothing else applies and no default was configured.
pub const FALLBACK_LICENSE: &str = "CLOSED";

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org";

pub struct GeneratorOptions {
	out_dir: std::path::PathBuf,
	target: PythonTarget,
	include_optional_groups: bool,
	interactive: bool,
	persist_licenses: bool,
	license_map_path: Option<std::path::PathBuf>,
	default_license: Option<String>,
	use_pypi_class: bool,
	write_preferred_versions: bool,
	inspect_sources: bool,
	max_concurrent_fetches: usize,
	index_url: String,
	https_only: bool,
}

impl Default for GeneratorOptions {
	fn default() -> Self {
		Self {
			out_dir: std::path::PathBuf::from("./"),
			target: Default::default(),
			include_optional_groups: false,
			interactive: true,
			persist_licenses: false,
			license_map_path: None,
			default_license: None,
			use_pypi_class: false,
			write_preferred_versions: true,
			inspect_sources: true,
			max_concurrent_fetches: 8,
			index_url: DEFAULT_INDEX_URL.to_string(),
			https_only: true,
		}
	}
}

impl GeneratorOptions {
	pub fn out_dir(&self) -> &std::path::PathBuf {
		&self.out_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_out_dir(&mut self, out_dir: std::path::PathBuf) -> bool {
		if out_dir.is_dir() {
			self.out_dir = out_dir;
			true
		} else {
			false
		}
	}

	pub fn target(&self) -> PythonTarget {
		self.target
	}
	pub fn set_target(&mut self, target: PythonTarget) {
		self.target = target;
	}

	pub fn include_optional_groups(&self) -> bool {
		self.include_optional_groups
	}
	pub fn set_include_optional_groups(&mut self, include_optional_groups: bool) {
		self.include_optional_groups = include_optional_groups;
	}

	/// Ask the operator for unmapped licenses.
	pub fn interactive(&self) -> bool {
		self.interactive
	}
	pub fn set_interactive(&mut self, interactive: bool) {
		self.interactive = interactive;
	}

	/// Write the license map back to disk at the end of the run.
	pub fn persist_licenses(&self) -> bool {
		self.persist_licenses
	}
	pub fn set_persist_licenses(&mut self, persist_licenses: bool) {
		self.persist_licenses = persist_licenses;
	}

	/// Where the license map is loaded from and saved to, `licenses.json` in the output directory unless set.
	pub fn license_map_path(&self) -> std::path::PathBuf {
		self.license_map_path.clone().unwrap_or_else(|| self.out_dir.join("licenses.json"))
	}
	pub fn set_license_map_path(&mut self, license_map_path: Option<std::path::PathBuf>) {
		self.license_map_path = license_map_path;
	}

	pub fn default_license(&self) -> Option<&str> {
		self.default_license.as_deref()
	}
	/// The license given to terms nobody could map, [`FALLBACK_LICENSE`] unless configured.
	pub fn fallback_license(&self) -> &str {
		self.default_license.as_deref().unwrap_or(FALLBACK_LICENSE)
	}
	pub fn set_default_license(&mut self, default_license: Option<String>) {
		self.default_license = default_license.filter(|l| !l.trim().is_empty());
	}

	/// Generate recipes inheriting the `pypi` class instead of spelling out `SRC_URI`.
	pub fn use_pypi_class(&self) -> bool {
		self.use_pypi_class
	}
	pub fn set_use_pypi_class(&mut self, use_pypi_class: bool) {
		self.use_pypi_class = use_pypi_class;
	}

	pub fn write_preferred_versions(&self) -> bool {
		self.write_preferred_versions
	}
	pub fn set_write_preferred_versions(&mut self, write_preferred_versions: bool) {
		self.write_preferred_versions = write_preferred_versions;
	}

	/// Download source archives to fill in checksums, license files and build dependencies.
	pub fn inspect_sources(&self) -> bool {
		self.inspect_sources
	}
	pub fn set_inspect_sources(&mut self, inspect_sources: bool) {
		self.inspect_sources = inspect_sources;
	}

	pub fn max_concurrent_fetches(&self) -> usize {
		self.max_concurrent_fetches
	}
	/// Values below one are raised to one.
	pub fn set_max_concurrent_fetches(&mut self, max_concurrent_fetches: usize) {
		self.max_concurrent_fetches = max_concurrent_fetches.max(1);
	}

	pub fn index_url(&self) -> &str {
		&self.index_url
	}
	pub fn set_index_url(&mut self, index_url: String) {
		self.index_url = index_url.trim_end_matches('/').to_string();
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn target_prefix() { assert_eq!(PythonTarget::Python.prefix(), "python") }
	#[test] fn target_parses() { assert_eq!("python3".parse::<PythonTarget>().unwrap(), PythonTarget::Python3) }
	#[test] fn target_rejects_unknown() { assert!("python4".parse::<PythonTarget>().is_err()) }

	#[test]
	fn fallback_license_uses_default_when_set() {
		let mut options = GeneratorOptions::default();
		assert_eq!(options.fallback_license(), FALLBACK_LICENSE);
		options.set_default_license(Some("MIT".to_string()));
		assert_eq!(options.fallback_license(), "MIT");
	}

	#[test]
	fn license_map_defaults_to_out_dir() {
		let options = GeneratorOptions::default();
		assert_eq!(options.license_map_path(), std::path::PathBuf::from("./").join("licenses.json"));
	}

	#[test]
	fn out_dir_must_exist() {
		let mut options = GeneratorOptions::default();
		assert!(!options.set_out_dir(std::path::PathBuf::from("/this/does/not/exist")));
	}
}
