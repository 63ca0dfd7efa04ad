use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// One or many license tokens, a plain string in the file when there is only one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredTokens {
	One(String),
	Many(Vec<String>),
}

impl From<StoredTokens> for Vec<String> {
	fn from(value: StoredTokens) -> Self {
		match value {
			StoredTokens::One(s) => vec![s],
			StoredTokens::Many(v) => v,
		}
	}
}

/// Mapping from raw license text to license tokens.
///
/// Entries are only ever added. Keys are matched exactly, two spellings of the same license are two entries.
#[derive(Debug, Clone, Default)]
pub struct LicenseStore {
	entries: BTreeMap<String, Vec<String>>,
	added: usize,
}

impl LicenseStore {
	/// The mappings shipped with the library.
	pub fn bundled() -> Self {
		Self::from_json(include_str!("default_licenses.json")).expect("bundled license map is valid")
	}

	pub fn from_json(text: &str) -> crate::Result<Self> {
		let raw: BTreeMap<String, StoredTokens> = serde_json::from_str(text)?;
		let entries = raw.into_iter()
			.map(|(k, v)| (k, Vec::<String>::from(v)))
			.filter(|(_, v)| v.iter().any(|t| !t.trim().is_empty()))
			.collect();
		Ok(Self { entries, added: 0 })
	}

	/// Bundled mappings overlaid with the mappings from `path` when the file exists.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the file exists but can't be read.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when the file is not a valid map.
	pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let mut store = Self::bundled();
		let path = path.as_ref();
		if path.is_file() {
			log::debug!("Loading license map from {}", path.display());
			let text = std::fs::read_to_string(path)?;
			let file = Self::from_json(&text)?;
			store.entries.extend(file.entries);
		}
		Ok(store)
	}

	pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
		let out: BTreeMap<&String, StoredTokens> = self.entries.iter()
			.map(|(k, v)| {
				let tokens = if v.len() == 1 { StoredTokens::One(v[0].clone()) } else { StoredTokens::Many(v.clone()) };
				(k, tokens)
			})
			.collect();
		let mut text = serde_json::to_string_pretty(&out)?;
		text.push('\n');
		std::fs::write(path, text)?;
		Ok(())
	}

	pub fn get(&self, raw: &str) -> Option<&[String]> {
		self.entries.get(raw).map(Vec::as_slice)
	}

	/// Adds a mapping. An existing mapping for `raw` is kept and `false` returned.
	pub fn insert(&mut self, raw: &str, tokens: Vec<String>) -> bool {
		if self.entries.contains_key(raw) || tokens.is_empty() {
			return false;
		}
		self.entries.insert(raw.to_string(), tokens);
		self.added += 1;
		true
	}

	/// Number of mappings added since the store was loaded.
	pub fn added(&self) -> usize {
		self.added
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn bundled_map_loads() { assert!(LicenseStore::bundled().len() > 200) }
	#[test] fn bundled_map_has_classifiers() { assert_eq!(LicenseStore::bundled().get("License :: OSI Approved :: MIT License"), Some(&["MIT".to_string()][..])) }

	#[test]
	fn insert_never_overwrites() {
		let mut store = LicenseStore::bundled();
		assert!(!store.insert("MIT", vec!["GPL-2.0".to_string()]));
		assert_eq!(store.get("MIT"), Some(&["MIT".to_string()][..]));
		assert_eq!(store.added(), 0);
	}

	#[test]
	fn file_accepts_single_and_many() {
		let store = LicenseStore::from_json(r#"{"Dual": ["MIT", "BSD"], "Solo": "ISC"}"#).unwrap();
		assert_eq!(store.get("Dual").unwrap().len(), 2);
		assert_eq!(store.get("Solo"), Some(&["ISC".to_string()][..]));
	}

	#[test]
	fn save_and_load_keep_added_entries() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("licenses.json");
		let mut store = LicenseStore::bundled();
		store.insert("Custom Thing", vec!["Custom".to_string()]);
		store.save(&path).unwrap();

		let loaded = LicenseStore::load(&path).unwrap();
		assert_eq!(loaded.get("Custom Thing"), Some(&["Custom".to_string()][..]));
		assert_eq!(loaded.len(), store.len());
	}

	#[test]
	fn load_without_file_is_bundled() {
		let dir = tempfile::tempdir().unwrap();
		assert_eq!(LicenseStore::load(dir.path().join("missing.json")).unwrap().len(), LicenseStore::bundled().len());
	}
}
