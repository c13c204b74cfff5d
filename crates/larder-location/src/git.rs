//! Git locations and the `git` command-line transport.

use crate::{GitTransport, Locations};
use async_trait::async_trait;
use larder_core::{
    CachedPackage, Constraint, Error, LocationSpec, PackageDescriptor, Result,
};
use larder_store::{PackageStore, StoreKey};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Whether `reference` is a full 40-character hex revision.
#[must_use]
pub fn is_revision(reference: &str) -> bool {
    reference.len() == 40 && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Materialize a git repository at a resolved revision.
pub(crate) async fn fetch(
    locations: &Locations,
    uri: &str,
    reference: Option<&str>,
    name: &str,
    constraint: &Constraint,
    store: &PackageStore,
) -> Result<CachedPackage> {
    let requested = LocationSpec::git(uri, reference);
    let revision = match reference {
        Some(r) if is_revision(r) => r.to_ascii_lowercase(),
        _ => locations
            .deadline(&requested, locations.git().resolve_ref(uri, reference))
            .await
            .map_err(|e| crate::not_found_for(name, e))?,
    };
    debug!(name, uri, revision = %revision, "resolved git revision");

    let origin = LocationSpec::git(uri, Some(&revision));
    let key = StoreKey::new(name, &revision)?;
    let package = store
        .insert_with(&key, origin, |scratch| {
            let revision = revision.clone();
            let requested = &requested;
            async move {
                let checkout = scratch.join("checkout");
                let git = locations.git();
                locations
                    .deadline(requested, git.clone_repo(uri, &checkout))
                    .await?;
                locations
                    .deadline(requested, git.checkout(&checkout, &revision))
                    .await?;
                let head = locations.deadline(requested, git.rev_parse(&checkout)).await?;
                if !head.eq_ignore_ascii_case(&revision) {
                    return Err(Error::transport(
                        requested,
                        format!("checked out {head}, expected {revision}"),
                    ));
                }

                if !PackageDescriptor::present_in(&checkout) {
                    return Err(Error::not_found(
                        name,
                        format!("{requested} has no package descriptor at {revision}"),
                    ));
                }
                let descriptor = PackageDescriptor::read(&checkout)?;
                if descriptor.name != name {
                    return Err(Error::not_found(
                        name,
                        format!("{requested} contains package '{}'", descriptor.name),
                    ));
                }

                let dot_git = checkout.join(".git");
                if tokio::fs::try_exists(&dot_git).await.unwrap_or(false) {
                    tokio::fs::remove_dir_all(&dot_git)
                        .await
                        .map_err(|e| Error::io(&dot_git, e))?;
                }
                info!(name, uri, revision = %revision, "cloned package");
                Ok(checkout)
            }
        })
        .await?;

    if !constraint.satisfies(&package.version) {
        return Err(Error::not_found(
            name,
            format!(
                "{requested} has version {} at {revision}, which does not satisfy '{constraint}'",
                package.version
            ),
        ));
    }
    Ok(package)
}

/// Git transport over the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    program: Option<String>,
}

impl GitCli {
    /// Transport using `git` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport using a specific git executable.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    async fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self.program.as_deref().unwrap_or("git");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::transport("git", format!("failed to run {program}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transport("git", stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pick the revision for `reference` from `git ls-remote` output.
///
/// Peeled tags win over the tag object, tags over branches.
fn select_ref(listing: &str, reference: Option<&str>) -> Option<String> {
    let refs: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .collect();
    let wanted = match reference {
        None => return refs.first().map(|(sha, _)| (*sha).to_string()),
        Some(r) => [
            format!("refs/tags/{r}^{{}}"),
            format!("refs/tags/{r}"),
            format!("refs/heads/{r}"),
            r.to_string(),
        ],
    };
    wanted.iter().find_map(|want| {
        refs.iter()
            .find(|(_, name)| name == want)
            .map(|(sha, _)| (*sha).to_string())
    })
}

#[async_trait]
impl GitTransport for GitCli {
    async fn resolve_ref(&self, uri: &str, reference: Option<&str>) -> Result<String> {
        let listing = self
            .run(None, ["ls-remote", "--", uri, reference.unwrap_or("HEAD")])
            .await?;
        select_ref(&listing, reference).ok_or_else(|| {
            Error::not_found(
                uri,
                format!("reference '{}' not found", reference.unwrap_or("HEAD")),
            )
        })
    }

    async fn clone_repo(&self, uri: &str, dest: &Path) -> Result<()> {
        debug!(uri, dest = %dest.display(), "cloning git repository");
        self.run(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new("--no-checkout"),
                OsStr::new("--"),
                OsStr::new(uri),
                dest.as_os_str(),
            ],
        )
        .await
        .map(drop)
    }

    async fn checkout(&self, repo: &Path, revision: &str) -> Result<()> {
        self.run(
            Some(repo),
            [
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--quiet",
                revision,
            ],
        )
        .await
        .map(drop)
    }

    async fn rev_parse(&self, repo: &Path) -> Result<String> {
        let out = self.run(Some(repo), ["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }
}
