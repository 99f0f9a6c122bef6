//! Tag listing against the Docker Hub registry.
//!
//! Built on blocking reqwest; a run makes a handful of sequential
//! lookups and doesn't justify an async runtime. Every failure here is
//! per-reference: the planner logs it and moves on.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const AUTH_URL: &str = "https://auth.docker.io/token";
const AUTH_SERVICE: &str = "registry.docker.io";
const REGISTRY_URL: &str = "https://index.docker.io";

/// Bounds every registry call; a timeout is just another lookup
/// failure.
const TIMEOUT: Duration = Duration::from_secs(30);

/// The one registry operation the planner consumes.
pub(crate) trait TagSource {
    fn list_tags(&self, repository: &str) -> Result<Vec<String>, LookupError>;
}

#[derive(Debug, Error)]
pub(crate) enum LookupError {
    #[error("`{0}` is not hosted on a supported registry")]
    UnsupportedRegistry(String),

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("offline mode is enabled")]
    Offline,
}

/// Anonymous-pull client for the Docker Hub v2 API.
pub(crate) struct DockerHub {
    http: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct TagPage {
    #[serde(default)]
    tags: Vec<String>,
}

impl DockerHub {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent("tagsweep")
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    fn pull_token(&self, repository: &str) -> Result<String, LookupError> {
        let scope = format!("repository:{repository}:pull");
        let response: TokenResponse = self
            .http
            .get(AUTH_URL)
            .query(&[("service", AUTH_SERVICE), ("scope", scope.as_str())])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(response.token)
    }
}

impl TagSource for DockerHub {
    fn list_tags(&self, repository: &str) -> Result<Vec<String>, LookupError> {
        let repository = hub_repository(repository)?;
        let token = self.pull_token(&repository)?;

        let mut url = format!("{REGISTRY_URL}/v2/{repository}/tags/list");
        let mut tags = Vec::new();
        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .send()?
                .error_for_status()?;
            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page);
            let page: TagPage = response.json()?;
            tags.extend(page.tags);

            match next {
                Some(path) => url = format!("{REGISTRY_URL}{path}"),
                None => break,
            }
        }

        Ok(tags)
    }
}

/// Normalizes a repository for Docker Hub: bare names live under
/// `library/`, and references pinning another registry are unsupported.
/// The host heuristic matches moby's: a first path segment containing a
/// dot or a colon, or equal to `localhost`, names a registry.
pub(crate) fn hub_repository(repository: &str) -> Result<String, LookupError> {
    match repository.split_once('/') {
        None => Ok(format!("library/{repository}")),
        Some((head, _)) => {
            if head.contains('.') || head.contains(':') || head == "localhost" {
                Err(LookupError::UnsupportedRegistry(repository.to_string()))
            } else {
                Ok(repository.to_string())
            }
        }
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
fn next_page(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        params.contains(r#"rel="next""#).then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

/// Treats every lookup as failed. Used by `--offline` runs and by
/// tests that need a deterministic empty plan.
pub(crate) struct Offline;

impl TagSource for Offline {
    fn list_tags(&self, _repository: &str) -> Result<Vec<String>, LookupError> {
        Err(LookupError::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_repositories_are_official_images() {
        assert_eq!(hub_repository("nginx").expect("supported"), "library/nginx");
        assert_eq!(
            hub_repository("portainer/portainer-ce").expect("supported"),
            "portainer/portainer-ce"
        );
    }

    #[test]
    fn foreign_registries_are_unsupported() {
        for repository in [
            "ghcr.io/owner/app",
            "registry.example.com:5000/app",
            "localhost/app",
        ] {
            assert!(matches!(
                hub_repository(repository),
                Err(LookupError::UnsupportedRegistry(_))
            ));
        }
    }

    #[test]
    fn next_page_follows_only_next_links() {
        assert_eq!(
            next_page(r#"</v2/library/nginx/tags/list?last=1.27&n=100>; rel="next""#),
            Some("/v2/library/nginx/tags/list?last=1.27&n=100".into())
        );
        assert_eq!(
            next_page(r#"</v2/library/nginx/tags/list?n=100>; rel="prev""#),
            None
        );
        assert_eq!(next_page("garbage"), None);
    }

    #[test]
    fn offline_source_always_fails() {
        assert!(matches!(
            Offline.list_tags("nginx"),
            Err(LookupError::Offline)
        ));
    }
}
