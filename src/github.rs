use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{MirrorError, Result};

/// Page size requested from every listing endpoint (the API maximum)
pub const PER_PAGE: u32 = 100;

/// The subset of a GitHub repository object that mirroring needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub clone_url: String,
    pub fork: bool,
}

/// Endpoint used to enumerate the user's repositories
///
/// Both strategies share the same pagination loop and fork filter; they only
/// differ in the route, the query and the shape of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStrategy {
    /// `GET /search/repositories?q=user:{username}`
    #[default]
    Search,
    /// `GET /users/{username}/repos?type=all`
    User,
}

impl FromStr for ListingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "search" => Ok(ListingStrategy::Search),
            "user" => Ok(ListingStrategy::User),
            other => Err(format!(
                "unknown listing strategy `{}` (expected `search` or `user`)",
                other
            )),
        }
    }
}

impl fmt::Display for ListingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStrategy::Search => f.write_str("search"),
            ListingStrategy::User => f.write_str("user"),
        }
    }
}

#[derive(Deserialize)]
struct Identity {
    login: String,
}

#[derive(Deserialize)]
struct SearchPage {
    items: Vec<RepositoryDescriptor>,
}

#[derive(Serialize)]
struct PageQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    page: u32,
    per_page: u32,
}

/// Read-only GitHub API client authenticated with a personal token
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    /// Create a client from the loaded configuration
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = config.http_timeout();

        let client = Octocrab::builder()
            .base_uri(config.api_base_url.as_str())
            .map_err(|e| {
                MirrorError::Config(format!(
                    "invalid api_base_url {}: {}",
                    config.api_base_url, e
                ))
            })?
            .personal_token(config.github_api_key.clone())
            // A failing page aborts the listing, it is never retried
            .add_retry_config(RetryConfig::None)
            .set_connect_timeout(Some(timeout))
            .set_read_timeout(Some(timeout))
            .build()?;

        Ok(Self { client })
    }

    /// Resolve the login of the user the token belongs to
    pub async fn get_identity(&self) -> Result<String> {
        let identity: Identity = self
            .client
            .get("/user", None::<&()>)
            .await
            .map_err(|e| MirrorError::Api(format!("failed to fetch /user: {}", e)))?;

        info!("Authenticated as GitHub user: {}", identity.login);
        Ok(identity.login)
    }

    /// List every non-fork repository owned by `username`
    ///
    /// Pages are requested from 1 upwards until one comes back empty. A single
    /// failing page aborts the whole listing; no partial result is returned.
    pub async fn list_repositories(
        &self,
        username: &str,
        strategy: ListingStrategy,
    ) -> Result<Vec<RepositoryDescriptor>> {
        debug!("Listing repositories for {} via {} strategy", username, strategy);

        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let items = self.fetch_page(username, strategy, page).await?;
            if items.is_empty() {
                break;
            }

            debug!("Page {} returned {} repositories", page, items.len());
            repositories.extend(without_forks(items));
            page += 1;
        }

        info!(
            "Found {} non-fork repositories for {} across {} pages",
            repositories.len(),
            username,
            page - 1
        );
        Ok(repositories)
    }

    async fn fetch_page(
        &self,
        username: &str,
        strategy: ListingStrategy,
        page: u32,
    ) -> Result<Vec<RepositoryDescriptor>> {
        let page_error =
            |e: octocrab::Error| MirrorError::Api(format!("failed to fetch page {}: {}", page, e));

        match strategy {
            ListingStrategy::User => {
                let route = format!("/users/{}/repos", username);
                let query = PageQuery {
                    q: None,
                    kind: Some("all"),
                    page,
                    per_page: PER_PAGE,
                };
                self.client
                    .get(route, Some(&query))
                    .await
                    .map_err(page_error)
            }
            ListingStrategy::Search => {
                // Search leaves forks out unless asked for them; the client-side
                // filter still applies so both strategies behave the same.
                let q = format!("user:{}", username);
                let query = PageQuery {
                    q: Some(&q),
                    kind: None,
                    page,
                    per_page: PER_PAGE,
                };
                let body: SearchPage = self
                    .client
                    .get("/search/repositories", Some(&query))
                    .await
                    .map_err(page_error)?;
                Ok(body.items)
            }
        }
    }
}

/// Drop forked repositories, keeping API order
pub fn without_forks(items: Vec<RepositoryDescriptor>) -> Vec<RepositoryDescriptor> {
    items
        .into_iter()
        .filter(|repo| {
            if repo.fork {
                debug!("Excluding fork repository: {}", repo.name);
            }
            !repo.fork
        })
        .collect()
}
