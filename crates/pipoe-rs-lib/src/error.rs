//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("directory walk error: {0}")]
	WalkDir(#[from] walkdir::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("validation error: {0}")]
	Validation(String),
	#[error("no packages provided")]
	NoPackages,
	/// None of the requested root packages could be resolved, nothing can be emitted.
	#[error("root package {name} could not be resolved: {reason}")]
	RootUnresolvable { name: String, reason: String },
}
