//! Retrieval of compatibility specifications from OCI registries
//!
//! The specification is attached to an image as a referrer artifact:
//! the image manifest is resolved to a digest, the referrers of that digest
//! are listed, and the YAML layer of the compatibility artifact is downloaded
//! and decoded. Registries without the referrers API are queried through the
//! `sha256-<hex>` referrers tag fallback.
//!
//! Access is anonymous. Registries that answer with a `Bearer` challenge are
//! asked for a pull token without credentials, and the token is reused for
//! later requests to the same repository.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};

use crate::error::{CompatError, Result};
use crate::reference::ImageReference;
use crate::specification::CompatibilitySpec;

/// Artifact type of the compatibility artifact referring to an image
pub const ARTIFACT_TYPE: &str = "application/vnd.nfd.image-compatibility.v1alpha1";

/// Media type of the layer carrying the specification document
pub const SPEC_MEDIA_TYPE: &str = "application/vnd.nfd.image-compatibility.spec.v1alpha1+yaml";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.docker.distribution.manifest.list.v2+json";

const INDEX_ACCEPT: &str = "application/vnd.oci.image.index.v1+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

static CHALLENGE_PARAM_REGEX: OnceLock<Regex> = OnceLock::new();

fn challenge_param_regex() -> &'static Regex {
    CHALLENGE_PARAM_REGEX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_]+)=(?:"([^"]*)"|([^,\s]*))"#)
            .expect("Failed to compile challenge parameter regex")
    })
}

/// Retrieves and decodes the compatibility specification of an image
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self, reference: &ImageReference) -> Result<CompatibilitySpec>;
}

/// Configuration for the registry client
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// Talk to the registry over plain HTTP
    pub plain_http: bool,
    /// User agent string
    pub user_agent: String,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 10000,
            plain_http: false,
            user_agent: format!("node-compat/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// OCI content descriptor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Image index, also the shape of a referrers response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

/// Image or artifact manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// Parameters of a `WWW-Authenticate: Bearer` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a challenge header; `None` for other schemes or a missing realm
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for captures in challenge_param_regex().captures_iter(params) {
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map(|m| m.as_str().to_string());
            match captures[1].to_ascii_lowercase().as_str() {
                "realm" => realm = value,
                "service" => service = value,
                "scope" => scope = value,
                _ => {}
            }
        }

        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            service,
            scope,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Async client for the OCI distribution API
pub struct RegistryClient {
    client: Client,
    config: RegistryClientConfig,
    /// Anonymous pull tokens by `<host>/<repository>`
    tokens: RwLock<HashMap<String, String>>,
}

impl RegistryClient {
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(CompatError::from)?;

        Ok(Self {
            client,
            config,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RegistryClientConfig {
        &self.config
    }

    /// Base URL of the distribution API for a reference
    pub fn base_url(&self, reference: &ImageReference) -> String {
        let scheme = if self.config.plain_http { "http" } else { "https" };
        format!(
            "{}://{}/v2/{}",
            scheme,
            reference.api_host(),
            reference.repository()
        )
    }

    /// Resolve the image manifest digest the reference points at
    pub async fn resolve_digest(&self, reference: &ImageReference) -> Result<String> {
        if let Some(digest) = reference.digest() {
            return Ok(digest.to_string());
        }

        let url = format!(
            "{}/manifests/{}",
            self.base_url(reference),
            reference.manifest_reference()
        );
        let (body, headers) = self.get_bytes(reference, &url, MANIFEST_ACCEPT).await?;

        let digest = headers
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| sha256_digest(&body));
        tracing::debug!(%reference, %digest, "resolved image digest");
        Ok(digest)
    }

    /// List the descriptors of artifacts referring to `digest`
    pub async fn referrers(
        &self,
        reference: &ImageReference,
        digest: &str,
    ) -> Result<Vec<Descriptor>> {
        let base = self.base_url(reference);
        let url = format!("{}/referrers/{}?artifactType={}", base, digest, ARTIFACT_TYPE);

        let (body, source_url) = match self.get_bytes(reference, &url, INDEX_ACCEPT).await {
            Ok((body, _)) => (body, url),
            Err(CompatError::HttpStatus { status: 404, .. }) => {
                let tag = referrers_tag(digest);
                tracing::debug!(%reference, %tag, "referrers API unavailable, using tag fallback");
                let fallback = format!("{}/manifests/{}", base, tag);
                match self.get_bytes(reference, &fallback, INDEX_ACCEPT).await {
                    Ok((body, _)) => (body, fallback),
                    Err(CompatError::HttpStatus { status: 404, .. }) => return Ok(Vec::new()),
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let index: ImageIndex =
            serde_json::from_slice(&body).map_err(|e| CompatError::ManifestDecode {
                url: source_url,
                details: e.to_string(),
            })?;
        Ok(index.manifests)
    }

    /// Download a blob and verify its digest
    pub async fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blobs/{}", self.base_url(reference), digest);
        let (body, _) = self.get_bytes(reference, &url, "*/*").await?;
        verify_digest(digest, &body)?;
        Ok(body)
    }

    async fn fetch_manifest(&self, reference: &ImageReference, digest: &str) -> Result<Manifest> {
        let url = format!("{}/manifests/{}", self.base_url(reference), digest);
        let (body, _) = self.get_bytes(reference, &url, MANIFEST_ACCEPT).await?;
        verify_digest(digest, &body)?;
        serde_json::from_slice(&body).map_err(|e| CompatError::ManifestDecode {
            url,
            details: e.to_string(),
        })
    }

    async fn get_bytes(
        &self,
        reference: &ImageReference,
        url: &str,
        accept: &str,
    ) -> Result<(Vec<u8>, HeaderMap)> {
        let response = self.get_authorized(reference, url, accept).await?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(CompatError::from)?;
        Ok((bytes.to_vec(), headers))
    }

    /// GET `url`, answering a bearer challenge with an anonymous pull token
    async fn get_authorized(
        &self,
        reference: &ImageReference,
        url: &str,
        accept: &str,
    ) -> Result<Response> {
        let key = token_key(reference);
        let cached = self.tokens.read().await.get(&key).cloned();

        let response = self
            .get_response_with_retry(url, || self.get_request(url, accept, cached.as_deref()))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(url, response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse);
        let Some(challenge) = challenge else {
            return Err(status_error(url, response.status()));
        };

        let token = self.anonymous_token(reference, &challenge).await?;
        self.tokens.write().await.insert(key, token.clone());

        let response = self
            .get_response_with_retry(url, || self.get_request(url, accept, Some(&token)))
            .await?;
        ensure_success(url, response)
    }

    /// Request a pull token from the challenge realm without credentials
    async fn anonymous_token(
        &self,
        reference: &ImageReference,
        challenge: &BearerChallenge,
    ) -> Result<String> {
        let realm = challenge.realm.as_str();
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository()));
        let mut query = Vec::with_capacity(2);
        if let Some(service) = challenge.service.as_deref() {
            query.push(("service", service));
        }
        query.push(("scope", scope.as_str()));

        tracing::debug!(realm, %scope, "requesting anonymous registry token");
        let response = self
            .get_response_with_retry(realm, || self.client.get(realm).query(&query))
            .await?;

        let auth_error = |details: String| CompatError::Authentication {
            realm: realm.to_string(),
            details,
        };
        if !response.status().is_success() {
            return Err(auth_error(format!(
                "token endpoint answered HTTP {}",
                response.status().as_u16()
            )));
        }

        let body = response.bytes().await.map_err(CompatError::from)?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| auth_error(e.to_string()))?;
        parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| auth_error("token response carries no token".to_string()))
    }

    fn get_request(&self, url: &str, accept: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url).header(ACCEPT, accept);
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send the request built by `build`, retrying transport failures and 5xx
    ///
    /// Any other response, including 4xx, is returned to the caller.
    async fn get_response_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            match self.make_request(url, build()).await {
                Ok(response) if !response.status().is_server_error() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if attempt < self.config.retry_attempts {
                        tracing::debug!(url, status = status.as_u16(), attempt, "retrying request");
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(status_error(url, status));
                }
                Err(error) => {
                    if attempt < self.config.retry_attempts && is_retryable_error(&error) {
                        tracing::debug!(url, %error, attempt, "retrying request");
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn make_request(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        tracing::debug!(url, "GET");

        timeout(Duration::from_secs(self.config.timeout_seconds), request.send())
            .await
            .map_err(|_| CompatError::Timeout {
                url: url.to_string(),
                timeout_seconds: self.config.timeout_seconds,
            })?
            .map_err(CompatError::from)
    }

    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.backoff_delay(attempt)).await;
    }

    /// Exponential backoff delay for a retry attempt, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }
}

#[async_trait]
impl SpecFetcher for RegistryClient {
    async fn fetch(&self, reference: &ImageReference) -> Result<CompatibilitySpec> {
        let subject = self.resolve_digest(reference).await?;

        let referrers = self.referrers(reference, &subject).await?;
        let artifact = select_artifact(&referrers).ok_or_else(|| CompatError::ArtifactNotFound {
            reference: reference.to_string(),
            details: format!("no referrer of {} has artifact type {}", subject, ARTIFACT_TYPE),
        })?;

        let manifest = self.fetch_manifest(reference, &artifact.digest).await?;
        let layer = select_spec_layer(&manifest).ok_or_else(|| CompatError::ArtifactNotFound {
            reference: reference.to_string(),
            details: format!(
                "artifact {} has no layer of media type {}",
                artifact.digest, SPEC_MEDIA_TYPE
            ),
        })?;

        let blob = self.fetch_blob(reference, &layer.digest).await?;
        let spec = CompatibilitySpec::from_yaml(&blob)?;
        tracing::debug!(
            %reference,
            artifact = %artifact.digest,
            groups = spec.compatibilities.len(),
            "fetched compatibility specification"
        );
        Ok(spec)
    }
}

/// First referrer carrying the compatibility artifact type
///
/// Registries may ignore the `artifactType` query filter, so it is applied
/// again here.
pub fn select_artifact(referrers: &[Descriptor]) -> Option<&Descriptor> {
    referrers
        .iter()
        .find(|d| d.artifact_type.as_deref() == Some(ARTIFACT_TYPE))
}

/// First layer holding the specification document
pub fn select_spec_layer(manifest: &Manifest) -> Option<&Descriptor> {
    manifest
        .layers
        .iter()
        .find(|l| l.media_type == SPEC_MEDIA_TYPE)
}

/// Tag under which referrers are indexed on registries without the referrers API
pub fn referrers_tag(digest: &str) -> String {
    digest.replacen(':', "-", 1)
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Check content against a `sha256:` digest; other algorithms are not verified
pub fn verify_digest(expected: &str, data: &[u8]) -> Result<()> {
    if !expected.starts_with("sha256:") {
        return Ok(());
    }
    let actual = sha256_digest(data);
    if actual != expected {
        return Err(CompatError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn token_key(reference: &ImageReference) -> String {
    format!("{}/{}", reference.api_host(), reference.repository())
}

fn ensure_success(url: &str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(url, response.status()))
    }
}

fn status_error(url: &str, status: StatusCode) -> CompatError {
    CompatError::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        message: format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}

fn is_retryable_error(error: &CompatError) -> bool {
    match error {
        CompatError::Http(reqwest_error) => {
            reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
        }
        CompatError::Timeout { .. } => true,
        _ => false,
    }
}
