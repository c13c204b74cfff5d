//! End-to-end install runs against fake remotes.

use larder_core::{
    Constraint, Credentials, Error, GroupFilter, LocationSpec, Manifest, Requirement, Version,
};
use larder_installer::{InstallOptions, InstallReport, Installer, LockState};
use larder_test_utils::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;

const INDEX: &str = "https://index.example";

fn req(name: &str, constraint: &str) -> Requirement {
    Requirement::new(name, Constraint::parse(constraint).unwrap())
}

fn manifest(source: &str, requirements: Vec<Requirement>) -> Manifest {
    Manifest::new(requirements, vec![LocationSpec::index(INDEX)], source.as_bytes()).unwrap()
}

fn installer(project: &TempProject) -> Installer {
    Installer::new(project.config(), project.locations(), project.lockfile_path()).unwrap()
}

fn versions(report: &InstallReport) -> Vec<(String, String)> {
    let mut versions: Vec<_> = report
        .packages
        .iter()
        .map(|p| (p.name.clone(), p.version.to_string()))
        .collect();
    versions.sort();
    versions
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
        .collect()
}

fn publish(project: &TempProject, name: &str, version: &str, deps: &[(&str, &str)]) {
    let fixture = deps
        .iter()
        .fold(PackageFixture::new(name, version), |f, (dep, c)| f.depends_on(dep, c));
    project.index.publish(INDEX, fixture);
}

#[tokio::test]
async fn picks_the_highest_compatible_versions() {
    init_tracing();
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[]);
    publish(&project, "a", "2.0.0", &[("b", "~> 1.0")]);
    for version in ["0.9.0", "1.0.0", "1.1.0", "2.0.0"] {
        publish(&project, "b", version, &[]);
    }

    let report = installer(&project)
        .install(&manifest("a", vec![req("a", "")]), &InstallOptions::default())
        .await
        .unwrap();

    assert_eq!(report.state, LockState::Unlocked);
    assert_eq!(versions(&report), pairs(&[("a", "2.0.0"), ("b", "1.1.0")]));
    let order: Vec<_> = report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(order, ["b", "a"]);
    assert_eq!(report.lockfile.len(), 2);
    assert!(project.lockfile_path().is_file());
}

#[tokio::test]
async fn impossible_transitive_constraint_is_no_solution() {
    init_tracing();
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[]);
    publish(&project, "a", "2.0.0", &[]);
    publish(&project, "c", "1.0.0", &[("a", "<= 1.0.0")]);

    let err = installer(&project)
        .install(
            &manifest("a c", vec![req("a", ">= 2.0.0"), req("c", "")]),
            &InstallOptions::default(),
        )
        .await
        .unwrap_err();

    let Error::NoSolution { name, trace } = err else {
        panic!("expected no solution, got {err}");
    };
    assert_eq!(name, "a");
    let trace: Vec<_> = trace.iter().map(ToString::to_string).collect();
    assert!(trace.contains(&"a >= 2.0.0 (required by the manifest)".to_string()));
    assert!(trace.contains(&"a <= 1.0.0 (required by c 1.0.0)".to_string()));
    assert!(!project.lockfile_path().exists());
}

#[tokio::test]
async fn unknown_package_is_not_found() {
    let project = TempProject::new();
    let err = installer(&project)
        .install(&manifest("ghost", vec![req("ghost", "")]), &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!project.lockfile_path().exists());
}

#[tokio::test]
async fn unreachable_index_is_a_retryable_failure() {
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[]);
    project.index.set_offline(true);

    let err = installer(&project)
        .install(&manifest("a", vec![req("a", "")]), &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(!project.lockfile_path().exists());
}

#[tokio::test]
async fn unpinned_git_packages_are_stored_once_per_revision() {
    init_tracing();
    let project = TempProject::new();
    let uri = "https://git.example/app.git";
    let revision = project
        .git
        .commit(uri, "main", PackageFixture::new("app", "0.3.0"));
    let manifest = manifest(
        "app from git",
        vec![req("app", "").with_location(LocationSpec::git(uri, None))],
    );
    let installer = installer(&project);

    let first = installer
        .install(&manifest, &InstallOptions::default())
        .await
        .unwrap();
    let again = InstallOptions {
        update: larder_installer::UpdateScope::All,
        ..InstallOptions::default()
    };
    let second = installer.install(&manifest, &again).await.unwrap();

    let (a, b) = (first.package("app").unwrap(), second.package("app").unwrap());
    assert_eq!(a.checksum, b.checksum);
    assert_eq!(a.origin, LocationSpec::git(uri, Some(&revision)));
    assert_eq!(a.origin, b.origin);
    assert_eq!(project.git.clones(), 1);

    let locked = second.lockfile.get("app").unwrap();
    assert_eq!(locked.origin, LocationSpec::git(uri, Some(&revision)));
}

#[tokio::test]
async fn vendors_installed_packages() {
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[("b", ">= 0")]);
    publish(&project, "b", "1.0.0", &[]);
    let dest = project.path().join("berks-cookbooks");

    let options = InstallOptions {
        vendor: Some(dest.clone()),
        ..InstallOptions::default()
    };
    installer(&project)
        .install(&manifest("a", vec![req("a", "")]), &options)
        .await
        .unwrap();

    assert!(dest.join("a/recipes/default.rb").is_file());
    assert!(dest.join("b/recipes/default.rb").is_file());
}

#[tokio::test]
async fn vendoring_honors_the_project_ignore_file() {
    let project = TempProject::new();
    project.index.publish(
        INDEX,
        PackageFixture::new("a", "1.0.0").file("test/helper.rb", "# helper\n"),
    );
    fs::write(project.path().join(larder_installer::IGNORE_FILE), "test/*\n").unwrap();
    let dest = project.path().join("berks-cookbooks");

    let options = InstallOptions {
        vendor: Some(dest.clone()),
        ..InstallOptions::default()
    };
    installer(&project)
        .install(&manifest("a", vec![req("a", "")]), &options)
        .await
        .unwrap();

    assert!(dest.join("a/recipes/default.rb").is_file());
    assert!(!dest.join("a/test/helper.rb").exists());
}

#[tokio::test]
async fn excluded_groups_are_resolved_but_not_installed() {
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[]);
    publish(&project, "t", "1.0.0", &[]);
    let manifest = manifest("a t", vec![req("a", ""), req("t", "").in_group("test")]);

    let options = InstallOptions {
        groups: GroupFilter {
            except: vec!["test".to_string()],
            only: Vec::new(),
        },
        ..InstallOptions::default()
    };
    let report = installer(&project).install(&manifest, &options).await.unwrap();

    assert_eq!(versions(&report), pairs(&[("a", "1.0.0")]));
    assert!(report.lockfile.get("t").is_some());
}

#[tokio::test]
async fn api_credentials_are_used_but_never_locked() {
    let project = TempProject::new();
    let endpoint = "https://api.example";
    project
        .index
        .publish(endpoint, PackageFixture::new("private", "1.0.0"));
    let api = LocationSpec::api(
        endpoint,
        Some(Credentials {
            client_name: "ci".to_string(),
            token: "t0ps3cret".to_string(),
        }),
    );
    let manifest = manifest("private", vec![req("private", "").with_location(api.clone())]);
    let installer = installer(&project);

    let report = installer
        .install(&manifest, &InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(report.package("private").unwrap().origin, api);

    let on_disk = fs::read_to_string(project.lockfile_path()).unwrap();
    assert!(!on_disk.contains("t0ps3cret"));
    assert!(on_disk.contains(endpoint));

    let clean = installer
        .install(&manifest, &InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(clean.state, LockState::LockedClean);
    assert_eq!(clean.package("private").unwrap().origin, api);
}

#[tokio::test]
async fn path_packages_are_used_in_place() {
    let project = TempProject::new();
    publish(&project, "base", "1.4.0", &[]);
    let dir = project.local_package(&PackageFixture::new("app", "0.1.0").depends_on("base", "~> 1.0"));
    let manifest = manifest(
        "app from path",
        vec![req("app", "").with_location(LocationSpec::path(&dir))],
    );

    let report = installer(&project)
        .install(&manifest, &InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(versions(&report), pairs(&[("app", "0.1.0"), ("base", "1.4.0")]));
    assert_eq!(report.package("app").unwrap().path, dir);
}

#[tokio::test]
async fn concurrent_runs_share_one_store() {
    let project = TempProject::new();
    publish(&project, "a", "1.0.0", &[("b", ">= 0")]);
    publish(&project, "b", "1.0.0", &[]);
    let manifest = manifest("a", vec![req("a", "")]);
    let first = Installer::new(
        project.config(),
        project.locations(),
        project.path().join("one.lock"),
    )
    .unwrap();
    let second = Installer::new(
        project.config(),
        project.locations(),
        project.path().join("two.lock"),
    )
    .unwrap();

    let options = InstallOptions::default();
    let (one, two) = tokio::join!(
        first.install(&manifest, &options),
        second.install(&manifest, &options)
    );
    let (one, two) = (one.unwrap(), two.unwrap());

    assert_eq!(one.lockfile.entries(), two.lockfile.entries());
    assert_eq!(
        one.package("b").unwrap().checksum,
        two.package("b").unwrap().checksum
    );
    assert_eq!(first.store().list().unwrap(), ["a-1.0.0", "b-1.0.0"]);
    assert_eq!(one.package("a").unwrap().version, Version::new(1, 0, 0));
}
