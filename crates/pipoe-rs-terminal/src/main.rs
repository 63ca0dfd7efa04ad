use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pipoe_rs::existing::{ExistingPackageSet, ExistingSource};
use pipoe_rs::generator::{GenerationInput, GenerationOutput};
use pipoe_rs::license::{NonInteractive, Prompter, StdinPrompter};
use pipoe_rs::registry::PypiSource;

#[tokio::main]
async fn main() {
	let opts = cli_options();

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); std::process::exit(2) }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("Usage: pipoe [options]"));
			return;
		}

		parsed_options
	};

	init_logging(parsed_options.opt_present("verbose"));

	match run(&parsed_options).await {
		Ok(()) => {},
		Err(e) => {
			log::error!("{}", e);
			eprintln!("{}", e);
			std::process::exit(1);
		},
	}
}

fn cli_options() -> getopts::Options {
	let mut opts = getopts::Options::new();
	opts.optflag( "h", "help",             "Show help");
	opts.optopt(  "p", "package",          "The package to be processed", "NAME");
	opts.optopt(  "v", "version",          "The package version", "VERSION");
	opts.optopt(  "r", "requirements",     "Pip requirements file", "FILE");
	opts.optflag( "e", "extras",           "Generate recipes for optional dependency groups");
	opts.optopt(  "o", "outdir",           "Recipes output directory", "DIR");
	opts.optopt(  "y", "python",           "Python version to generate recipes for", "python|python3");
	opts.optflag( "l", "licenses",         "Write the license map back to disk");
	opts.optopt(  "d", "default-license",  "License used when a license can't be translated, never asks for one", "LICENSE");
	opts.optflag( "s", "pypi-class",       "Generate recipes inheriting the pypi class");
	opts.optflag( "n", "non-interactive",  "Never ask for licenses, use the default license instead");
	opts.optflag( "",  "verbose",          "Increased verbosity");
	opts.optopt(  "",  "existing-packages", "Listing of packages the build already provides", "FILE");
	opts.optopt(  "",  "yocto-layers-dir", "Layers directory scanned for existing recipes", "DIR");
	opts.optflag( "",  "no-preferred",     "Don't write the preferred versions file");
	opts.optflag( "",  "no-inspect",       "Don't download source archives for checksums");
	opts.optopt(  "",  "jobs",             "Maximum concurrent registry requests", "N");
	opts.optopt(  "",  "index-url",        "Package index base URL", "URL");
	opts.parsing_style(getopts::ParsingStyle::FloatingFrees);
	opts
}

fn init_logging(verbose: bool) {
	let mut builder = env_logger::Builder::from_default_env();
	if verbose {
		builder.filter_level(log::LevelFilter::Info);
	}
	builder.init();
}

fn options_from_args(args: &getopts::Matches) -> Result<pipoe_rs::GeneratorOptions, Error> {
	let mut options = pipoe_rs::GeneratorOptions::default();

	if let Some(dir) = args.opt_str("o") {
		let dir = PathBuf::from(dir);
		std::fs::create_dir_all(&dir).map_err(pipoe_rs::Error::from)?;
		if !options.set_out_dir(dir.clone()) {
			return Err(Error::InvalidArgument(format!("output directory {} is not a directory", dir.display())));
		}
	}
	if let Some(target) = args.opt_str("y") {
		options.set_target(target.parse()?);
	}
	if let Some(jobs) = args.opt_str("jobs") {
		let jobs = jobs.parse::<usize>().map_err(|e| Error::InvalidArgument(format!("--jobs {}: {}", jobs, e)))?;
		options.set_max_concurrent_fetches(jobs);
	}
	if let Some(url) = args.opt_str("index-url") {
		options.set_https_only(url.starts_with("https://"));
		options.set_index_url(url);
	}

	options.set_include_optional_groups(args.opt_present("e"));
	options.set_persist_licenses(args.opt_present("l"));
	options.set_default_license(args.opt_str("d"));
	options.set_use_pypi_class(args.opt_present("s"));
	/* A default license answers every unmapped term */
	options.set_interactive(!args.opt_present("n") && !args.opt_present("d"));
	options.set_write_preferred_versions(!args.opt_present("no-preferred"));
	options.set_inspect_sources(!args.opt_present("no-inspect"));
	Ok(options)
}

async fn run(args: &getopts::Matches) -> Result<(), Error> {
	let options = options_from_args(args)?;

	let existing_path = args.opt_str("existing-packages").map(PathBuf::from);
	let layers_dir = args.opt_str("yocto-layers-dir").map(PathBuf::from);

	/* Both given means the layers are scanned into a listing for later runs */
	if let (Some(layers), Some(listing)) = (&layers_dir, &existing_path) {
		let (existing, diagnostics) = ExistingPackageSet::scan_recipe_tree(layers, options.target())?;
		for d in &diagnostics {
			d.log();
		}
		existing.write_listing(listing)?;
		println!("Existing packages written to: {}", listing.display());
		return Ok(());
	}

	let mut input = match (args.opt_str("p"), args.opt_str("r")) {
		(Some(package), _) => GenerationInput::from_package(&package, args.opt_str("v").as_deref())?,
		(None, Some(requirements)) => GenerationInput::from_requirements_file(&PathBuf::from(requirements))?,
		(None, None) => return Err(Error::MissingArgument("a package (-p) or a requirements file (-r)")),
	};

	let existing_source = existing_path.map(ExistingSource::Listing).or(layers_dir.map(ExistingSource::RecipeTree));
	if let Some(source) = existing_source {
		input = input.with_existing(&source, &options)?;
	}

	let interrupt = Arc::new(AtomicBool::new(false));
	{
		let interrupt = interrupt.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log::warn!("Interrupted, finishing requests already sent");
				interrupt.store(true, Ordering::Relaxed);
			}
		});
	}

	let prompter: Box<dyn Prompter> = if options.interactive() {
		Box::new(StdinPrompter)
	} else {
		Box::new(NonInteractive)
	};

	let source = Arc::new(PypiSource::new(options.index_url(), options.https_only())?);
	let output = pipoe_rs::generate(&options, source, prompter, input, interrupt).await?;
	print_summary(&output);
	Ok(())
}

fn print_summary(output: &GenerationOutput) {
	println!("Generated recipes:");
	for artifact in &output.artifacts {
		println!("\t{}", artifact.display());
	}
	if let Some(path) = &output.preferred_versions {
		println!("Preferred versions: {}", path.display());
	}
	if let Some(path) = &output.license_map {
		println!("License mappings are available in: {}", path.display());
	}

	let excluded: Vec<String> = output.graph.excluded()
		.map(|(name, version)| match version {
			Some(v) => format!("{}=={}", name, v),
			None => name.to_string(),
		})
		.collect();
	if !excluded.is_empty() {
		println!("Already provided: {}", excluded.join(" "));
	}

	if !output.report.is_empty() {
		println!("Problems:");
		for diagnostic in output.report.diagnostics() {
			println!("\t{}", diagnostic);
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Pipoe(#[from] pipoe_rs::Error),
	#[error("Missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}

#[cfg(test)]
mod test {
	use super::*;

	fn parse(args: &[&str]) -> pipoe_rs::GeneratorOptions {
		let matches = cli_options().parse(args).unwrap();
		options_from_args(&matches).unwrap()
	}

	#[test] fn interactive_by_default() { assert!(parse(&["-p", "requests"]).interactive()) }
	#[test] fn non_interactive_flag() { assert!(!parse(&["-p", "requests", "-n"]).interactive()) }

	#[test]
	fn default_license_never_asks() {
		let options = parse(&["-p", "requests", "-d", "MIT"]);
		assert!(!options.interactive());
		assert_eq!(options.fallback_license(), "MIT");
	}
}
