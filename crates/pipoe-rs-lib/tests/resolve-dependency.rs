use std::collections::BTreeSet;
use std::sync::Arc;

use pipoe_rs::existing::ExistingPackageSet;
use pipoe_rs::license::{LicenseMapper, LicenseStore, NonInteractive};
use pipoe_rs::package::{PackageSpec, PackageVersion};
use pipoe_rs::registry::FetchError;
use pipoe_rs::relationship_resolver::*;
use pipoe_rs::report::Diagnostic;
use pipoe_rs_test_utils::{requests_fixture, FixtureSource, ScriptedPrompter};

fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn v(s: &str) -> PackageVersion {
	PackageVersion::new(s).unwrap()
}

fn specs(roots: &[&str]) -> Vec<PackageSpec> {
	roots.iter().map(|r| PackageSpec::from_name_version(r, None).unwrap()).collect()
}

fn builder(source: &Arc<FixtureSource>, roots: &[&str]) -> ResolverBuilder<FixtureSource, NonInteractive> {
	let licenses = LicenseMapper::new(LicenseStore::bundled(), NonInteractive, "CLOSED");
	ResolverBuilder::new(source.clone(), licenses).add_package_specs(specs(roots))
}

async fn resolve(source: &Arc<FixtureSource>, roots: &[&str]) -> ResolverFinalized {
	init_logging();
	builder(source, roots).build().unwrap().resolve().await.unwrap()
}

fn names(graph: &DependencyGraph) -> Vec<&str> {
	graph.nodes().map(|n| n.name.as_str()).collect()
}

#[tokio::test]
async fn diamond_resolves_shared_dependency_once() {
	let source = Arc::new(FixtureSource::new()
		.package("a", "1.0", &["b", "c"])
		.package("b", "1.0", &["d"])
		.package("c", "1.0", &["d"])
		.package("d", "1.0", &[]));

	let resolved = resolve(&source, &["a"]).await;
	let graph = resolved.get_graph();

	assert_eq!(names(graph), vec!["a", "b", "c", "d"]);
	assert_eq!(graph.referrers("d"), BTreeSet::from(["b".to_string(), "c".to_string()]));
	assert_eq!(source.fetch_count("d"), 1);
	assert!(resolved.report().is_empty());
}

#[tokio::test]
async fn cycle_terminates() {
	let source = Arc::new(FixtureSource::new()
		.package("a", "1.0", &["b"])
		.package("b", "1.0", &["a"]));

	let resolved = resolve(&source, &["a"]).await;
	let graph = resolved.get_graph();

	assert_eq!(names(graph), vec!["a", "b"]);
	assert!(graph.get("a").unwrap().dependencies.contains("b"));
	assert!(graph.get("b").unwrap().dependencies.contains("a"));
	assert_eq!(source.fetch_count("a"), 1);
	assert_eq!(source.fetch_count("b"), 1);
}

#[tokio::test]
async fn self_dependency_is_ignored() {
	let source = Arc::new(FixtureSource::new().package("a", "1.0", &["a"]));
	let resolved = resolve(&source, &["a"]).await;
	assert!(resolved.get_graph().get("a").unwrap().dependencies.is_empty());
}

#[tokio::test]
async fn highest_required_version_wins() {
	let source = Arc::new(FixtureSource::new()
		.package("root", "1.0", &["x", "y"])
		.package("x", "1.0", &["a==1.0"])
		.package("y", "1.0", &["a==2.0"])
		.package("a", "1.0", &[])
		.package("a", "2.0", &[]));

	let resolved = resolve(&source, &["root"]).await;

	assert_eq!(resolved.get_graph().get("a").unwrap().version, v("2.0"));
	assert_eq!(resolved.report().version_conflicts().count(), 1);
	assert_eq!(resolved.get_graph().referrers("a"), BTreeSet::from(["x".to_string(), "y".to_string()]));
}

#[tokio::test]
async fn replaced_version_drops_its_old_dependencies() {
	let source = Arc::new(FixtureSource::new()
		.package("root", "1.0", &["x", "y"])
		.package("x", "1.0", &["a==1.0"])
		.package("y", "1.0", &["a>=2.0"])
		.package("a", "1.0", &["old"])
		.package("a", "2.0", &["new"])
		.package("old", "1.0", &[])
		.package("new", "1.0", &[]));

	let resolved = resolve(&source, &["root"]).await;
	let graph = resolved.get_graph();

	assert_eq!(graph.get("a").unwrap().version, v("2.0"));
	assert!(graph.contains("new"));
	assert!(!graph.contains("old"));
}

#[tokio::test]
async fn existing_package_is_excluded() {
	let source = Arc::new(requests_fixture());
	let existing: ExistingPackageSet = [("urllib3", Some(v("1.24.1")))].into_iter().collect();

	init_logging();
	let resolved = builder(&source, &["requests"]).existing_packages(existing).build().unwrap().resolve().await.unwrap();
	let graph = resolved.get_graph();

	assert_eq!(names(graph), vec!["certifi", "chardet", "idna", "requests"]);
	assert_eq!(graph.excluded().collect::<Vec<_>>(), vec![("urllib3", Some(&v("1.24.1")))]);
	assert!(graph.get("requests").unwrap().dependencies.contains("urllib3"));
	assert_eq!(source.fetch_count("urllib3"), 0);
	assert!(resolved.report().is_empty());
}

#[tokio::test]
async fn existing_package_at_other_version_is_reported() {
	let source = Arc::new(requests_fixture());
	let existing: ExistingPackageSet = [("urllib3", Some(v("1.26.5")))].into_iter().collect();

	init_logging();
	let resolved = builder(&source, &["requests"]).existing_packages(existing).build().unwrap().resolve().await.unwrap();

	assert!(resolved.get_graph().get("urllib3").is_none());
	assert!(matches!(resolved.report().diagnostics(), [Diagnostic::ExistingVersionDiffers { package, .. }] if package == "urllib3"));
}

#[tokio::test]
async fn existing_package_too_old_is_resolved() {
	let source = Arc::new(requests_fixture());
	let existing: ExistingPackageSet = [("urllib3", Some(v("1.20")))].into_iter().collect();

	init_logging();
	let resolved = builder(&source, &["requests"]).existing_packages(existing).build().unwrap().resolve().await.unwrap();

	assert_eq!(resolved.get_graph().get("urllib3").unwrap().version, v("1.25.3"));
	assert!(matches!(resolved.report().diagnostics(), [Diagnostic::ExistingVersionTooOld { package, .. }] if package == "urllib3"));
}

#[tokio::test]
async fn fetch_failure_names_requester() {
	let source = Arc::new(FixtureSource::new()
		.package("a", "1.0", &["b", "c"])
		.package("b", "1.0", &[])
		.failing("c", FetchError::Transient("connection reset".to_string())));

	let resolved = resolve(&source, &["a"]).await;

	assert_eq!(names(resolved.get_graph()), vec!["a", "b"]);
	assert!(!resolved.get_graph().get("a").unwrap().dependencies.contains("c"));
	let failures: Vec<_> = resolved.report().fetch_failures().collect();
	assert!(matches!(failures.as_slice(), [Diagnostic::FetchFailed { package, requester: Some(requester), .. }] if package == "c" && requester == "a"));
}

#[tokio::test]
async fn unknown_package_is_dropped_with_subtree() {
	let source = Arc::new(FixtureSource::new().package("a", "1.0", &["missing"]));
	let resolved = resolve(&source, &["a"]).await;
	assert_eq!(names(resolved.get_graph()), vec!["a"]);
	assert_eq!(resolved.report().fetch_failures().count(), 1);
}

#[tokio::test]
async fn unresolvable_root_is_fatal() {
	init_logging();
	let source = Arc::new(FixtureSource::new());
	let result = builder(&source, &["nothing"]).build().unwrap().resolve().await;
	assert!(matches!(result, Err(pipoe_rs::Error::RootUnresolvable { name, .. }) if name == "nothing"));
}

#[tokio::test]
async fn one_resolvable_root_is_enough() {
	let source = Arc::new(FixtureSource::new().package("a", "1.0", &[]));
	let resolved = resolve(&source, &["a", "nothing"]).await;
	assert_eq!(names(resolved.get_graph()), vec!["a"]);
	assert_eq!(resolved.report().fetch_failures().count(), 1);
}

#[test]
fn builder_needs_packages() {
	let source = Arc::new(FixtureSource::new());
	assert!(matches!(builder(&source, &[]).build(), Err(pipoe_rs::Error::NoPackages)));
}

#[tokio::test]
async fn optional_groups_only_when_enabled() {
	let source = Arc::new(requests_fixture());

	let resolved = resolve(&source, &["requests"]).await;
	assert!(!resolved.get_graph().contains("pysocks"));

	init_logging();
	let resolved = builder(&source, &["requests[socks]"]).include_optional_groups(true).build().unwrap().resolve().await.unwrap();
	let requests = resolved.get_graph().get("requests").unwrap();

	assert!(resolved.get_graph().contains("pysocks"));
	assert_eq!(requests.groups.get("socks"), Some(&BTreeSet::from(["pysocks".to_string()])));
	assert!(!requests.dependencies.contains("pysocks"));
}

#[tokio::test]
async fn unknown_optional_group_is_reported() {
	init_logging();
	let source = Arc::new(FixtureSource::new().package("a", "1.0", &[]));
	let resolved = builder(&source, &["a[nope]"]).include_optional_groups(true).build().unwrap().resolve().await.unwrap();
	assert!(matches!(resolved.report().diagnostics(), [Diagnostic::UnknownOptionalGroup { group, .. }] if group == "nope"));
}

#[tokio::test]
async fn unmapped_license_is_asked_once() {
	init_logging();
	let source = Arc::new(FixtureSource::new()
		.package("a", "1.0", &["b"])
		.package("b", "1.0", &[])
		.license("a", "Weird License")
		.license("b", "Weird License"));

	let prompter = ScriptedPrompter::new().answer("Weird License", "MIT");
	let licenses = LicenseMapper::new(LicenseStore::bundled(), prompter.clone(), "CLOSED");
	let resolved = ResolverBuilder::new(source, licenses)
		.add_package_specs(specs(&["a"]))
		.build().unwrap()
		.resolve().await.unwrap();

	assert_eq!(prompter.asked().len(), 1);
	assert_eq!(resolved.get_graph().get("b").unwrap().license.to_string(), "MIT");
	assert_eq!(resolved.licenses().get("Weird License"), Some(["MIT".to_string()].as_slice()));
	assert!(resolved.report().is_empty());
}

#[tokio::test]
async fn declined_license_falls_back() {
	let source = Arc::new(FixtureSource::new().package("a", "1.0", &[]).license("a", "Weird License"));
	let resolved = resolve(&source, &["a"]).await;

	assert_eq!(resolved.get_graph().get("a").unwrap().license.to_string(), "CLOSED");
	assert_eq!(resolved.report().license_fallbacks().count(), 1);
}

#[tokio::test]
async fn single_fetch_slot_still_resolves() {
	init_logging();
	let source = Arc::new(requests_fixture());
	let resolved = builder(&source, &["requests"]).max_concurrent_fetches(1).build().unwrap().resolve().await.unwrap();
	assert_eq!(resolved.get_graph().len(), 5);
}

#[tokio::test]
async fn interrupted_before_start_resolves_nothing() {
	init_logging();
	let source = Arc::new(requests_fixture());
	let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
	let result = builder(&source, &["requests"]).interrupt_flag(flag).build().unwrap().resolve().await;
	assert!(result.is_err());
	assert!(source.fetched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_for_replaced_requester_is_dropped() {
	init_logging();
	let source = Arc::new(FixtureSource::new()
		.package("root", "1.0", &["x", "y"])
		.package("x", "1.0", &["a==1.0"])
		.package("y", "1.0", &["a>=2.0"])
		.package("a", "1.0", &["old"])
		.package("a", "2.0", &[])
		.package("old", "1.0", &["deeper"])
		.package("deeper", "1.0", &[])
		.license("old", "Weird License")
		.delay("y", std::time::Duration::from_millis(10))
		.delay("old", std::time::Duration::from_millis(100)));

	let prompter = ScriptedPrompter::new();
	let licenses = LicenseMapper::new(LicenseStore::bundled(), prompter.clone(), "CLOSED");
	let resolved = ResolverBuilder::new(source.clone(), licenses)
		.add_package_specs(specs(&["root"]))
		.build().unwrap()
		.resolve().await.unwrap();

	assert_eq!(resolved.get_graph().get("a").unwrap().version, v("2.0"));
	assert!(!resolved.get_graph().contains("old"));
	assert_eq!(source.fetch_count("old"), 1);
	assert_eq!(source.fetch_count("deeper"), 0);
	assert!(prompter.asked().is_empty());
	assert_eq!(resolved.report().license_fallbacks().count(), 0);
}

#[tokio::test]
async fn pruned_packages_are_never_asked_about() {
	init_logging();
	let source = Arc::new(FixtureSource::new()
		.package("root", "1.0", &["x", "y"])
		.package("x", "1.0", &["a==1.0"])
		.package("y", "1.0", &["a>=2.0"])
		.package("a", "1.0", &["old"])
		.package("a", "2.0", &[])
		.package("old", "1.0", &[])
		.license("old", "Weird License"));

	let prompter = ScriptedPrompter::new();
	let licenses = LicenseMapper::new(LicenseStore::bundled(), prompter.clone(), "CLOSED");
	let resolved = ResolverBuilder::new(source, licenses)
		.add_package_specs(specs(&["root"]))
		.max_concurrent_fetches(1)
		.build().unwrap()
		.resolve().await.unwrap();

	assert!(!resolved.get_graph().contains("old"));
	assert!(prompter.asked().is_empty());
	assert_eq!(resolved.report().license_fallbacks().count(), 0);
}

#[tokio::test]
async fn failed_upgrade_of_existing_package_keeps_it_excluded() {
	let source = Arc::new(FixtureSource::new()
		.package("root", "1.0", &["a", "b"])
		.package("a", "1.0", &["u"])
		.package("b", "1.0", &["u>=2.0"])
		.failing("u", FetchError::NotFound));
	let existing: ExistingPackageSet = [("u", Some(v("1.0")))].into_iter().collect();

	init_logging();
	let resolved = builder(&source, &["root"]).existing_packages(existing).build().unwrap().resolve().await.unwrap();
	let graph = resolved.get_graph();

	assert!(graph.get("a").unwrap().dependencies.contains("u"));
	assert!(!graph.get("b").unwrap().dependencies.contains("u"));
	assert_eq!(graph.excluded().collect::<Vec<_>>(), vec![("u", Some(&v("1.0")))]);
	let failures: Vec<_> = resolved.report().fetch_failures().collect();
	assert!(matches!(failures.as_slice(), [Diagnostic::FetchFailed { package, requester: Some(requester), .. }] if package == "u" && requester == "b"));
}
