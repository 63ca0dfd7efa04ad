//! Where package metadata comes from.

use std::future::Future;

use crate::package::{PackageMetadata, VersionConstraint};

mod pypi;
pub use pypi::PypiSource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
	#[error("package not found")]
	NotFound,
	/// The package exists but no release satisfies the constraint.
	#[error("no release matching {0}")]
	NoMatchingVersion(String),
	/// Network or server trouble, trying again later may work.
	#[error("transient error: {0}")]
	Transient(String),
	/// The registry answered with something that isn't package metadata.
	#[error("invalid metadata: {0}")]
	Parse(String),
}

impl From<reqwest::Error> for FetchError {
	fn from(value: reqwest::Error) -> Self {
		if value.status() == Some(reqwest::StatusCode::NOT_FOUND) {
			FetchError::NotFound
		} else if value.is_decode() {
			FetchError::Parse(value.to_string())
		} else {
			FetchError::Transient(value.to_string())
		}
	}
}

/// A package registry.
///
/// Sources are shared between concurrently running fetches so they are used through an [`Arc`](std::sync::Arc).
pub trait MetadataSource: Send + Sync + 'static {
	/// Metadata of the highest release of `name` within `constraint`.
	///
	/// # Errors
	/// - [`FetchError::NotFound`] when the registry doesn't know the package.
	/// - [`FetchError::NoMatchingVersion`] when no release is within `constraint`.
	fn fetch(&self, name: &str, constraint: &VersionConstraint) -> impl Future<Output = Result<PackageMetadata, FetchError>> + Send;

	/// Raw bytes of a file the registry hosts, used for source archives.
	fn download(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}
