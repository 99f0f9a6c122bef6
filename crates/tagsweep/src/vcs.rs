//! Git plumbing for the apply step, built on libgit2.
//!
//! The update commit is created on a side branch without ever moving
//! HEAD; the working tree is restored once the branch is pushed.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use camino::{Utf8Path, Utf8PathBuf};
use git2::{Direction, Signature, build::CheckoutBuilder};

const COMMIT_NAME: &str = "tagsweep";
const COMMIT_EMAIL: &str = "tagsweep@devnull.localhost";

pub(crate) struct Repo {
    inner: git2::Repository,
}

impl Repo {
    pub(crate) fn discover(path: &Utf8Path) -> Result<Self> {
        // Actions mounts the workspace with an owner other than the
        // container user, which trips libgit2's ownership check.
        if std::env::var_os("GITHUB_ACTIONS").is_some() {
            unsafe { git2::opts::set_verify_owner_validation(false)? };
        }

        let inner = git2::Repository::discover(path.as_std_path())
            .with_context(|| format!("no git repository at or above {path}"))?;
        Ok(Self { inner })
    }

    fn workdir(&self) -> Result<PathBuf> {
        let workdir = self
            .inner
            .workdir()
            .context("repository has no working tree")?;
        Ok(std::fs::canonicalize(workdir)?)
    }

    fn relative_to_workdir(&self, file: &Utf8Path) -> Result<PathBuf> {
        let absolute = std::fs::canonicalize(file.as_std_path())
            .with_context(|| format!("can't resolve {file}"))?;
        Ok(absolute
            .strip_prefix(self.workdir()?)
            .with_context(|| format!("{file} is outside the repository working tree"))?
            .to_path_buf())
    }

    /// An anonymous remote sharing origin's URL, with the token spliced
    /// in for HTTPS operations (the `oauth2` form GitHub expects).
    fn authenticated_remote(&self, token: &str) -> Result<git2::Remote<'_>> {
        let origin = self.inner.find_remote("origin")?;
        let url = origin.url().context("origin remote URL is not UTF-8")?;
        let url = match url.strip_prefix("https://") {
            Some(rest) => format!("https://oauth2:{token}@{rest}"),
            None => url.to_string(),
        };
        Ok(self.inner.remote_anonymous(&url)?)
    }

    pub(crate) fn remote_branches(&self, token: &str) -> Result<Vec<String>> {
        let mut remote = self.authenticated_remote(token)?;
        remote
            .connect(Direction::Fetch)
            .context("can't reach origin")?;
        let branches = remote
            .list()?
            .iter()
            .filter_map(|head| head.name().strip_prefix("refs/heads/"))
            .map(String::from)
            .collect();
        Ok(branches)
    }

    /// Stages `files` and commits them to `refs/heads/<branch>` on top
    /// of the current HEAD commit. HEAD itself stays where it is.
    pub(crate) fn commit_on_branch(
        &self,
        branch: &str,
        files: &[Utf8PathBuf],
        message: &str,
    ) -> Result<()> {
        let mut index = self.inner.index()?;
        for file in files {
            index.add_path(&self.relative_to_workdir(file)?)?;
        }
        let tree_id = index.write_tree()?;
        index.write()?;

        let tree = self.inner.find_tree(tree_id)?;
        let head = self.inner.head()?.peel_to_commit()?;
        let signature = Signature::now(COMMIT_NAME, COMMIT_EMAIL)?;
        self.inner.commit(
            Some(&format!("refs/heads/{branch}")),
            &signature,
            &signature,
            message,
            &tree,
            &[&head],
        )?;
        Ok(())
    }

    pub(crate) fn push_branch(&self, branch: &str, token: &str) -> Result<()> {
        let mut remote = self.authenticated_remote(token)?;
        remote
            .push(&[format!("refs/heads/{branch}:refs/heads/{branch}")], None)
            .with_context(|| format!("couldn't push {branch}"))?;
        Ok(())
    }

    pub(crate) fn delete_remote_branch(&self, branch: &str, token: &str) -> Result<()> {
        let mut remote = self.authenticated_remote(token)?;
        remote
            .push(&[format!(":refs/heads/{branch}")], None)
            .with_context(|| format!("couldn't delete {branch}"))?;
        Ok(())
    }

    /// Puts the index and the working tree for `files` back at HEAD,
    /// undoing the applied edits now that they live on the update
    /// branch.
    pub(crate) fn restore(&self, files: &[Utf8PathBuf]) -> Result<()> {
        let head_tree = self.inner.head()?.peel_to_tree()?;
        let mut index = self.inner.index()?;
        index.read_tree(&head_tree)?;
        index.write()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        for file in files {
            checkout.path(self.relative_to_workdir(file)?);
        }
        self.inner.checkout_head(Some(&mut checkout))?;
        Ok(())
    }
}
