//! Applying a non-empty plan: file rewrites, one branch, one commit,
//! one pull request.

use anyhow::{Context as _, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    github,
    plan::{DIGEST_LEN, Plan, PlanEntry},
    vcs::Repo,
};

/// Remote branches carrying tagsweep updates. The digest suffix keeps
/// re-runs of an identical plan from piling up duplicate branches.
const BRANCH_PREFIX: &str = "tagsweep/images-";

const PR_TITLE: &str = "Update container image tags";

pub(crate) fn apply(plan: &Plan, root: &Utf8Path, slug: &str, token: &str) -> Result<()> {
    let branch = format!("{BRANCH_PREFIX}{digest}", digest = plan.digest());
    let repo = Repo::discover(root)?;

    let existing = repo.remote_branches(token)?;
    if existing.iter().any(|name| name == &branch) {
        tracing::info!("branch {branch} already exists, nothing to do");
        cleanup_stale(&repo, &existing, &branch, token);
        return Ok(());
    }

    let mut files = Vec::new();
    for (file, entries) in plan.by_file() {
        let text =
            std::fs::read_to_string(file).with_context(|| format!("couldn't reread {file}"))?;
        let updated = rewrite(&text, &entries).with_context(|| format!("couldn't rewrite {file}"))?;
        std::fs::write(file, updated).with_context(|| format!("couldn't update {file}"))?;
        files.push(file.to_path_buf());
    }

    let outcome = propose(&repo, &branch, &files, plan, slug, token);
    // The working tree goes back to HEAD whether or not the proposal
    // made it out; the changes live on the update branch.
    if let Err(err) = repo.restore(&files) {
        tracing::warn!("couldn't restore the working tree: {err:#}");
    }
    let url = outcome?;
    tracing::info!("opened {url}");

    cleanup_stale(&repo, &existing, &branch, token);
    Ok(())
}

fn propose(
    repo: &Repo,
    branch: &str,
    files: &[Utf8PathBuf],
    plan: &Plan,
    slug: &str,
    token: &str,
) -> Result<String> {
    repo.commit_on_branch(branch, files, PR_TITLE)?;
    repo.push_branch(branch, token)?;

    let client = github::Client::new(token)?;
    let base = client
        .default_branch(slug)
        .with_context(|| format!("couldn't resolve the default branch of {slug}"))?;
    client.open_pull_request(slug, branch, &base, PR_TITLE, &plan.description())
}

/// Replaces each entry's captured value on its recorded line. A line
/// that no longer contains the expected value means the tree changed
/// under us; that's an apply failure, not a silent mis-edit.
pub(crate) fn rewrite(text: &str, entries: &[&PlanEntry]) -> Result<String> {
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    for entry in entries {
        let line = lines
            .get_mut(entry.reference.line - 1)
            .with_context(|| format!("line {} is out of range", entry.reference.line))?;
        if !line.contains(&entry.reference.raw_value) {
            bail!(
                "line {} no longer contains `{}`",
                entry.reference.line,
                entry.reference.raw_value
            );
        }
        *line = line.replacen(&entry.reference.raw_value, &entry.new_raw_value, 1);
    }
    Ok(lines.join("\n"))
}

/// Deletes leftover update branches from earlier plans.
fn cleanup_stale(repo: &Repo, existing: &[String], keep: &str, token: &str) {
    for name in existing {
        if name == keep {
            continue;
        }
        let Some(digest) = name.strip_prefix(BRANCH_PREFIX) else {
            continue;
        };
        if digest.len() != DIGEST_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }
        tracing::warn!("cleaning up stale branch {name}");
        if let Err(err) = repo.delete_remote_branch(name, token) {
            tracing::warn!("couldn't delete {name}: {err:#}");
        }
    }
}
