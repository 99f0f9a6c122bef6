//! A very minimal GitHub API client for the pull-request step.
//!
//! Built on blocking reqwest; the two calls made per run don't justify
//! an async runtime or a full octocrab dependency.

use std::time::Duration;

use anyhow::{Context as _, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct Client {
    http: reqwest::blocking::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct PullRequest {
    html_url: String,
}

impl Client {
    pub(crate) fn new(token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("tagsweep"));
        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("token is not a valid header value")?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let http = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(TIMEOUT)
            .build()?;

        // Actions exposes GITHUB_API_URL, which also covers GHES hosts.
        let api_base =
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self { http, api_base })
    }

    pub(crate) fn default_branch(&self, slug: &str) -> Result<String> {
        let info: RepoInfo = self
            .http
            .get(format!("{api}/repos/{slug}", api = self.api_base))
            .send()?
            .error_for_status()?
            .json()?;
        Ok(info.default_branch)
    }

    /// Opens a pull request for `head` and returns its URL.
    pub(crate) fn open_pull_request(
        &self,
        slug: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String> {
        let pull: PullRequest = self
            .http
            .post(format!("{api}/repos/{slug}/pulls", api = self.api_base))
            .json(&serde_json::json!({
                "title": title,
                "head": head,
                "base": base,
                "body": body,
            }))
            .send()?
            .error_for_status()
            .with_context(|| format!("couldn't open a pull request for {head}"))?
            .json()?;
        Ok(pull.html_url)
    }
}
