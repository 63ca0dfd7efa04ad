pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::GeneratorOptions;
pub use config::PythonTarget;

pub mod package;
pub use package::PackageSpec;
pub use package::PackageMetadata;

pub mod report;
pub use report::Diagnostic;
pub use report::Report;

pub mod license;
pub mod archive;
pub mod registry;
pub use registry::MetadataSource;

pub mod existing;
pub mod relationship_resolver;
pub mod recipe;
pub use recipe::RecipeEmitter;

pub mod generator;
pub use generator::generate;
