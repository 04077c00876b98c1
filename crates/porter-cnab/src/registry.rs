//! Listing tags from an OCI distribution registry

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use porter_core::reference::{OciReference, DEFAULT_DOMAIN};
use reqwest::header::{HeaderValue, AUTHORIZATION, LINK, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// Host serving the registry API for docker.io references
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// Lists the tags of a repository
#[async_trait]
pub trait TagLister: Send + Sync {
    async fn list_tags(&self, reference: &OciReference) -> Result<Vec<String>>;
}

/// Client for the `/v2/<name>/tags/list` endpoint of OCI registries
pub struct RegistryClient {
    client: reqwest::Client,
    /// Use plain http for every registry
    insecure: bool,
    /// Raw token, sent as a bearer token or exchanged for one
    auth_token: Option<String>,
    /// Bearer token obtained from the registry's token service
    bearer_token: RwLock<Option<String>>,
}

impl RegistryClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("porter/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            insecure: false,
            auth_token: None,
            bearer_token: RwLock::new(None),
        })
    }

    /// Talk to every registry over plain http
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Base URL of the registry API for a reference's domain. Loopback
    /// registries are assumed to serve http.
    fn base_url(&self, domain: &str) -> Result<Url> {
        let host = if domain == DEFAULT_DOMAIN {
            DOCKER_HUB_API
        } else {
            domain
        };
        let loopback = host.starts_with("localhost") || host.starts_with("127.0.0.1");
        let scheme = if self.insecure || loopback { "http" } else { "https" };
        Url::parse(&format!("{}://{}/", scheme, host))
            .with_context(|| format!("invalid registry host {}", host))
    }

    fn cached_bearer(&self) -> Option<String> {
        self.bearer_token.read().ok().and_then(|t| t.clone())
    }

    async fn send(&self, url: &Url) -> Result<Response> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = self.cached_bearer().or_else(|| self.auth_token.clone()) {
            request = request.header(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
        }
        request
            .send()
            .await
            .with_context(|| format!("Failed to connect to registry at {}", url))
    }

    /// GET, answering a bearer challenge once
    async fn get(&self, url: &Url) -> Result<Response> {
        let response = self.send(url).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_bearer_challenge)
        else {
            return Ok(response);
        };

        let token = self.fetch_token(&challenge).await?;
        if let Ok(mut cached) = self.bearer_token.write() {
            *cached = Some(token);
        }
        self.send(url).await
    }

    async fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        let mut token_url = Url::parse(&challenge.realm)
            .with_context(|| format!("invalid token realm {}", challenge.realm))?;
        {
            let mut query = token_url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = &challenge.scope {
                query.append_pair("scope", scope);
            }
        }
        debug!("Requesting registry token from: {}", token_url);

        let mut request = self.client.get(token_url.clone());
        if let Some(token) = &self.auth_token {
            request = request.basic_auth("token", Some(token));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to request token from {}", token_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("token request failed ({}): {}", status, body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        token
            .token
            .or(token.access_token)
            .ok_or_else(|| anyhow!("token response from {} did not contain a token", token_url))
    }
}

#[async_trait]
impl TagLister for RegistryClient {
    /// Every tag of the reference's repository, following pagination
    async fn list_tags(&self, reference: &OciReference) -> Result<Vec<String>> {
        let base = self.base_url(reference.domain())?;
        let mut url = base
            .join(&format!("v2/{}/tags/list", reference.path()))
            .with_context(|| format!("invalid repository {}", reference.path()))?;
        let mut all_tags = Vec::new();

        loop {
            debug!("Listing tags from: {}", url);
            let response = self.get(&url).await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "Registry returned {} for {}: {}",
                    status,
                    url,
                    if body.is_empty() {
                        "(no response body)".to_string()
                    } else {
                        body
                    }
                ));
            }

            let next = response
                .headers()
                .get(LINK)
                .and_then(|h| h.to_str().ok())
                .and_then(|link| parse_link_header(link, &url));

            let page: TagsResponse = response
                .json()
                .await
                .context("Failed to parse tags response")?;
            all_tags.extend(page.tags);

            match next {
                Some(next) => url = next,
                None => break,
            }
        }

        trace!("Found {} tags total", all_tags.len());
        Ok(all_tags)
    }
}

/// Target of the `rel="next"` link, resolved against the current page
fn parse_link_header(link: &str, current: &Url) -> Option<Url> {
    link.split(',')
        .map(str::trim)
        .filter(|part| part.contains("rel=\"next\""))
        .find_map(|part| {
            let start = part.find('<')?;
            let end = part.find('>')?;
            current.join(&part[start + 1..end]).ok()
        })
}

#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

/// Parse `Bearer realm="...",service="...",scope="..."`
fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let params = header.strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for param in split_params(params) {
        let (key, value) = param.split_once('=')?;
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }
    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

/// Split on commas outside of quotes; scopes may contain commas
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}
