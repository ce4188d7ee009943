//! OpenStack Swift backend.
//!
//! Speaks TempAuth (v1) and Keystone (v2/v3) for authentication and uploads
//! objects with a single streaming PUT, so memory stays bounded by the pipe
//! regardless of archive size. Credentials come from the YAML `params` block
//! with environment variables filling any unset field.

use std::io;
use std::sync::{Arc, Mutex};
use std::{env, fmt};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{Storage, WriteParams};
use crate::pipe::PipeReader;

const ENV_USERNAME: &str = "SWIFT_STORAGE_USERNAME";
const ENV_API_KEY: &str = "SWIFT_STORAGE_API_KEY";
const ENV_AUTH_URL: &str = "SWIFT_STORAGE_AUTH_URL";
const ENV_REGION: &str = "SWIFT_STORAGE_REGION";
const ENV_USER_AGENT: &str = "SWIFT_STORAGE_USER_AGENT";
const ENV_AUTH_VERSION: &str = "SWIFT_STORAGE_AUTH_VERSION";
const ENV_DOMAIN: &str = "SWIFT_STORAGE_DOMAIN";
const ENV_TENANT: &str = "SWIFT_STORAGE_TENANT";

const MIN_SUPPORTED_AUTH_VERSION: u8 = 1;
const MAX_SUPPORTED_AUTH_VERSION: u8 = 3;

/// Swift parameters as they appear in the configuration file. Every field is
/// optional here; [`resolve`](Self::resolve) fills the gaps from the
/// environment and validates the result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SwiftSettings {
    pub container: Option<String>,
    pub user_name: Option<String>,
    pub api_key: Option<String>,
    pub auth_url: Option<String>,
    pub region: Option<String>,
    pub user_agent: Option<String>,
    pub auth_version: Option<u8>,
    pub domain: Option<String>,
    pub tenant: Option<String>,
}

impl SwiftSettings {
    /// Resolve the settings into a validated client configuration,
    /// consulting the `SWIFT_STORAGE_*` environment variables for any field
    /// the configuration leaves unset.
    pub fn resolve(&self) -> Result<SwiftConfig> {
        let user_name = from_config_or_env(&self.user_name, ENV_USERNAME).ok_or_else(|| {
            anyhow!("swift user name is not configured (set {} or params.user-name)", ENV_USERNAME)
        })?;
        let api_key = from_config_or_env(&self.api_key, ENV_API_KEY).ok_or_else(|| {
            anyhow!("swift api key is not configured (set {} or params.api-key)", ENV_API_KEY)
        })?;
        let auth_url = from_config_or_env(&self.auth_url, ENV_AUTH_URL).ok_or_else(|| {
            anyhow!("swift auth url is not configured (set {} or params.auth-url)", ENV_AUTH_URL)
        })?;

        let auth_version = match self.auth_version {
            Some(version) => version,
            None => {
                let raw = env::var(ENV_AUTH_VERSION).ok().filter(|v| !v.is_empty()).ok_or_else(
                    || anyhow!("swift auth version is not configured (set {} or params.auth-version)", ENV_AUTH_VERSION),
                )?;
                raw.parse::<u8>()
                    .map_err(|_| anyhow!("{} must be an integer", ENV_AUTH_VERSION))?
            }
        };
        if !(MIN_SUPPORTED_AUTH_VERSION..=MAX_SUPPORTED_AUTH_VERSION).contains(&auth_version) {
            bail!(
                "swift auth version {} is outside the supported range {}-{}",
                auth_version,
                MIN_SUPPORTED_AUTH_VERSION,
                MAX_SUPPORTED_AUTH_VERSION
            );
        }

        Ok(SwiftConfig {
            user_name,
            api_key,
            auth_url,
            region: from_config_or_env(&self.region, ENV_REGION),
            user_agent: from_config_or_env(&self.user_agent, ENV_USER_AGENT),
            auth_version,
            domain: from_config_or_env(&self.domain, ENV_DOMAIN),
            tenant: from_config_or_env(&self.tenant, ENV_TENANT),
        })
    }

    /// Seed write parameters from the configuration; the object name is
    /// injected later by the caller.
    pub fn write_params(&self) -> SwiftWriteParams {
        SwiftWriteParams {
            container: self.container.clone().unwrap_or_default(),
            ..SwiftWriteParams::default()
        }
    }
}

fn from_config_or_env(value: &Option<String>, var: &str) -> Option<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| env::var(var).ok().filter(|v| !v.is_empty()))
}

/// Validated Swift client configuration.
#[derive(Clone)]
pub struct SwiftConfig {
    pub user_name: String,
    pub api_key: String,
    pub auth_url: String,
    pub region: Option<String>,
    pub user_agent: Option<String>,
    pub auth_version: u8,
    pub domain: Option<String>,
    pub tenant: Option<String>,
}

impl fmt::Debug for SwiftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftConfig")
            .field("user_name", &self.user_name)
            .field("api_key", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("region", &self.region)
            .field("auth_version", &self.auth_version)
            .field("domain", &self.domain)
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Upload metadata for a Swift object: destination container, optional MD5
/// hash checked server-side via the ETag header, optional content type, and
/// the object name injected from the derived backup name.
#[derive(Debug, Clone, Default)]
pub struct SwiftWriteParams {
    pub container: String,
    pub hash: Option<String>,
    pub content_type: Option<String>,
    pub object_name: Option<String>,
}

#[derive(Clone)]
struct SwiftSession {
    token: String,
    storage_url: String,
}

/// Swift storage client.
pub struct SwiftStorage {
    config: SwiftConfig,
    client: reqwest::Client,
    session: Mutex<Option<SwiftSession>>,
}

impl SwiftStorage {
    pub fn new(config: SwiftConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder.build().context("build http client")?;

        Ok(Self {
            config,
            client,
            session: Mutex::new(None),
        })
    }

    fn session(&self) -> Result<SwiftSession> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("not authenticated to swift storage"))
    }

    async fn establish_session(&self) -> Result<SwiftSession> {
        match self.config.auth_version {
            1 => self.auth_v1().await,
            2 => self.auth_v2().await,
            3 => self.auth_v3().await,
            // resolve() already enforces the range; keep the failure explicit
            other => bail!("unsupported swift auth version {}", other),
        }
    }

    /// TempAuth: credentials in request headers, session in response headers.
    async fn auth_v1(&self) -> Result<SwiftSession> {
        let response = self
            .client
            .get(&self.config.auth_url)
            .header("X-Auth-User", &self.config.user_name)
            .header("X-Auth-Key", &self.config.api_key)
            .send()
            .await
            .context("reach swift auth endpoint")?;

        check_auth_status(response.status())?;

        Ok(SwiftSession {
            token: header_string(&response, "X-Auth-Token")?,
            storage_url: header_string(&response, "X-Storage-Url")?,
        })
    }

    /// Keystone v2: password credentials in a JSON body, object-store
    /// endpoint from the service catalog.
    async fn auth_v2(&self) -> Result<SwiftSession> {
        let url = format!("{}/tokens", self.config.auth_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "auth": {
                "passwordCredentials": {
                    "username": self.config.user_name,
                    "password": self.config.api_key,
                },
                "tenantName": self.config.tenant,
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("reach swift auth endpoint")?;
        check_auth_status(response.status())?;

        let decoded: V2AuthResponse = response.json().await.context("decode auth response")?;
        let storage_url =
            object_store_endpoint_v2(&decoded.access.service_catalog, self.config.region.as_deref())?;

        Ok(SwiftSession {
            token: decoded.access.token.id,
            storage_url,
        })
    }

    /// Keystone v3: token in the X-Subject-Token response header, endpoint
    /// from the catalog filtered to the public interface.
    async fn auth_v3(&self) -> Result<SwiftSession> {
        let url = format!("{}/auth/tokens", self.config.auth_url.trim_end_matches('/'));
        let domain = self.config.domain.clone().unwrap_or_else(|| "Default".to_string());

        let mut body = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.config.user_name,
                            "domain": { "name": domain },
                            "password": self.config.api_key,
                        }
                    }
                }
            }
        });
        if let Some(tenant) = &self.config.tenant {
            body["auth"]["scope"] = serde_json::json!({
                "project": { "name": tenant, "domain": { "name": domain } }
            });
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("reach swift auth endpoint")?;
        check_auth_status(response.status())?;

        let token = header_string(&response, "X-Subject-Token")?;
        let decoded: V3AuthResponse = response.json().await.context("decode auth response")?;
        let storage_url =
            object_store_endpoint_v3(&decoded.token.catalog, self.config.region.as_deref())?;

        Ok(SwiftSession { token, storage_url })
    }
}

#[async_trait]
impl Storage for SwiftStorage {
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let session = tokio::select! {
            result = self.establish_session() => result?,
            _ = cancel.cancelled() => bail!("authentication cancelled"),
        };

        debug!("authenticated to swift, storage url {}", session.storage_url);
        *self.session.lock().unwrap() = Some(session);
        Ok(())
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        source: PipeReader,
        params: &WriteParams,
    ) -> Result<()> {
        let WriteParams::Swift(params) = params;
        let session = self.session()?;

        let object_name = params
            .object_name
            .as_deref()
            .ok_or_else(|| anyhow!("backup name was not set on write params"))?;
        if params.container.is_empty() {
            bail!("swift container is not configured (set --swift-container or params.container)");
        }

        let url = object_url(&session.storage_url, &params.container, object_name);
        debug!("uploading to {}", url);

        // Keep the upstream error aside: when the producer fails, the
        // transport reports a generic body error, but the caller must see
        // the producer's own failure.
        let upstream_failure: Arc<Mutex<Option<io::Error>>> = Arc::new(Mutex::new(None));
        let capture = Arc::clone(&upstream_failure);
        let body_stream = source.into_byte_stream().map(move |item| {
            if let Err(err) = &item {
                *capture.lock().unwrap() = Some(io::Error::new(err.kind(), err.to_string()));
            }
            item
        });

        let mut request = self
            .client
            .put(&url)
            .header("X-Auth-Token", &session.token)
            .body(reqwest::Body::wrap_stream(body_stream));
        if let Some(hash) = &params.hash {
            request = request.header("ETag", hash);
        }
        if let Some(content_type) = &params.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let sent = tokio::select! {
            result = request.send() => result,
            _ = cancel.cancelled() => bail!("upload cancelled"),
        };

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                if let Some(upstream) = upstream_failure.lock().unwrap().take() {
                    return Err(anyhow!(upstream)).context("upload aborted by upstream failure");
                }
                return Err(err).context("put object");
            }
        };

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => bail!("swift auth token was rejected"),
            StatusCode::UNPROCESSABLE_ENTITY => {
                bail!("swift rejected the object: content hash mismatch")
            }
            status => bail!("swift returned unexpected status {} for {}", status, url),
        }
    }
}

fn check_auth_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        bail!("swift credentials were rejected ({})", status);
    }
    if !status.is_success() {
        bail!("swift auth endpoint returned {}", status);
    }
    Ok(())
}

fn header_string(response: &reqwest::Response, name: &str) -> Result<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("auth response is missing the {} header", name))
}

fn object_url(storage_url: &str, container: &str, object_name: &str) -> String {
    format!(
        "{}/{}/{}",
        storage_url.trim_end_matches('/'),
        container,
        object_name.trim_start_matches('/')
    )
}

#[derive(Deserialize)]
struct V2AuthResponse {
    access: V2Access,
}

#[derive(Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Service>,
}

#[derive(Deserialize)]
struct V2Token {
    id: String,
}

#[derive(Deserialize)]
struct V2Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Deserialize)]
struct V2Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
    #[serde(default)]
    region: Option<String>,
}

fn object_store_endpoint_v2(catalog: &[V2Service], region: Option<&str>) -> Result<String> {
    catalog
        .iter()
        .filter(|service| service.service_type == "object-store")
        .flat_map(|service| &service.endpoints)
        .find(|endpoint| region.is_none() || endpoint.region.as_deref() == region)
        .map(|endpoint| endpoint.public_url.clone())
        .ok_or_else(|| no_endpoint_error(region))
}

#[derive(Deserialize)]
struct V3AuthResponse {
    token: V3Token,
}

#[derive(Deserialize)]
struct V3Token {
    #[serde(default)]
    catalog: Vec<V3Service>,
}

#[derive(Deserialize)]
struct V3Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Deserialize)]
struct V3Endpoint {
    url: String,
    interface: String,
    #[serde(default)]
    region: Option<String>,
}

fn object_store_endpoint_v3(catalog: &[V3Service], region: Option<&str>) -> Result<String> {
    catalog
        .iter()
        .filter(|service| service.service_type == "object-store")
        .flat_map(|service| &service.endpoints)
        .filter(|endpoint| endpoint.interface == "public")
        .find(|endpoint| region.is_none() || endpoint.region.as_deref() == region)
        .map(|endpoint| endpoint.url.clone())
        .ok_or_else(|| no_endpoint_error(region))
}

fn no_endpoint_error(region: Option<&str>) -> anyhow::Error {
    match region {
        Some(region) => anyhow!(
            "service catalog has no object-store endpoint in region {}",
            region
        ),
        None => anyhow!("service catalog has no object-store endpoint"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe;

    fn test_config() -> SwiftConfig {
        SwiftConfig {
            user_name: "tester".to_string(),
            api_key: "secret".to_string(),
            auth_url: "https://auth.example.test/v1.0".to_string(),
            region: None,
            user_agent: None,
            auth_version: 1,
            domain: None,
            tenant: None,
        }
    }

    #[test]
    fn settings_resolution_consults_the_environment() {
        // Env-dependent assertions live in one test: the variables are
        // process-global and tests run in parallel.
        for var in [
            ENV_USERNAME,
            ENV_API_KEY,
            ENV_AUTH_URL,
            ENV_REGION,
            ENV_USER_AGENT,
            ENV_AUTH_VERSION,
            ENV_DOMAIN,
            ENV_TENANT,
        ] {
            env::remove_var(var);
        }

        // Nothing configured at all: the user name is reported first.
        let err = SwiftSettings::default().resolve().unwrap_err();
        assert!(err.to_string().contains(ENV_USERNAME));

        env::set_var(ENV_USERNAME, "env-user");
        env::set_var(ENV_API_KEY, "env-key");
        env::set_var(ENV_AUTH_URL, "https://auth.example.test/v2.0");
        env::set_var(ENV_AUTH_VERSION, "2");
        env::set_var(ENV_TENANT, "env-tenant");

        let resolved = SwiftSettings::default().resolve().unwrap();
        assert_eq!(resolved.user_name, "env-user");
        assert_eq!(resolved.api_key, "env-key");
        assert_eq!(resolved.auth_version, 2);
        assert_eq!(resolved.tenant.as_deref(), Some("env-tenant"));

        // Configuration values win over the environment.
        let settings = SwiftSettings {
            user_name: Some("config-user".to_string()),
            ..SwiftSettings::default()
        };
        assert_eq!(settings.resolve().unwrap().user_name, "config-user");

        // A non-integer version in the environment is rejected.
        env::set_var(ENV_AUTH_VERSION, "latest");
        let err = SwiftSettings::default().resolve().unwrap_err();
        assert!(err.to_string().contains("must be an integer"));

        for var in [
            ENV_USERNAME,
            ENV_API_KEY,
            ENV_AUTH_URL,
            ENV_AUTH_VERSION,
            ENV_TENANT,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn auth_version_must_be_in_supported_range() {
        let settings = SwiftSettings {
            user_name: Some("u".to_string()),
            api_key: Some("k".to_string()),
            auth_url: Some("https://auth.example.test".to_string()),
            auth_version: Some(4),
            ..SwiftSettings::default()
        };
        let err = settings.resolve().unwrap_err();
        assert!(err.to_string().contains("outside the supported range"));

        let settings = SwiftSettings {
            auth_version: Some(0),
            ..settings
        };
        assert!(settings.resolve().is_err());

        let settings = SwiftSettings {
            user_name: Some("u".to_string()),
            api_key: Some("k".to_string()),
            auth_url: Some("https://auth.example.test".to_string()),
            auth_version: Some(3),
            ..SwiftSettings::default()
        };
        assert_eq!(settings.resolve().unwrap().auth_version, 3);
    }

    #[test]
    fn write_params_seed_from_settings() {
        let settings = SwiftSettings {
            container: Some("backups".to_string()),
            ..SwiftSettings::default()
        };
        let params = settings.write_params();
        assert_eq!(params.container, "backups");
        assert!(params.object_name.is_none());
        assert!(params.hash.is_none());
    }

    #[test]
    fn object_url_joins_without_doubled_slashes() {
        assert_eq!(
            object_url("https://store.example.test/v1/acct/", "backups", "/tmp/a.txt.tar.zst"),
            "https://store.example.test/v1/acct/backups/tmp/a.txt.tar.zst"
        );
        assert_eq!(
            object_url("https://store.example.test/v1/acct", "backups", "nightly.tar.gz"),
            "https://store.example.test/v1/acct/backups/nightly.tar.gz"
        );
    }

    #[test]
    fn v2_catalog_selects_the_object_store_endpoint() {
        let catalog = vec![
            V2Service {
                service_type: "compute".to_string(),
                endpoints: vec![V2Endpoint {
                    public_url: "https://compute.example.test".to_string(),
                    region: None,
                }],
            },
            V2Service {
                service_type: "object-store".to_string(),
                endpoints: vec![
                    V2Endpoint {
                        public_url: "https://store-a.example.test".to_string(),
                        region: Some("region-a".to_string()),
                    },
                    V2Endpoint {
                        public_url: "https://store-b.example.test".to_string(),
                        region: Some("region-b".to_string()),
                    },
                ],
            },
        ];

        assert_eq!(
            object_store_endpoint_v2(&catalog, None).unwrap(),
            "https://store-a.example.test"
        );
        assert_eq!(
            object_store_endpoint_v2(&catalog, Some("region-b")).unwrap(),
            "https://store-b.example.test"
        );
        let err = object_store_endpoint_v2(&catalog, Some("region-c")).unwrap_err();
        assert!(err.to_string().contains("region-c"));
    }

    #[test]
    fn v3_catalog_only_considers_public_interfaces() {
        let catalog = vec![V3Service {
            service_type: "object-store".to_string(),
            endpoints: vec![
                V3Endpoint {
                    url: "https://internal.example.test".to_string(),
                    interface: "internal".to_string(),
                    region: None,
                },
                V3Endpoint {
                    url: "https://public.example.test".to_string(),
                    interface: "public".to_string(),
                    region: None,
                },
            ],
        }];

        assert_eq!(
            object_store_endpoint_v3(&catalog, None).unwrap(),
            "https://public.example.test"
        );
    }

    #[tokio::test]
    async fn write_requires_authentication_first() {
        let storage = SwiftStorage::new(test_config()).unwrap();
        let (_writer, reader) = pipe::in_memory(CancellationToken::new());
        let params = WriteParams::Swift(SwiftWriteParams {
            container: "backups".to_string(),
            object_name: Some("backup.tar.zst".to_string()),
            ..SwiftWriteParams::default()
        });

        let err = storage
            .write(&CancellationToken::new(), reader, &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not authenticated"));
    }

    #[tokio::test]
    async fn write_requires_an_object_name() {
        let storage = SwiftStorage::new(test_config()).unwrap();
        *storage.session.lock().unwrap() = Some(SwiftSession {
            token: "token".to_string(),
            storage_url: "https://store.example.test/v1/acct".to_string(),
        });

        let (_writer, reader) = pipe::in_memory(CancellationToken::new());
        let params = WriteParams::Swift(SwiftWriteParams {
            container: "backups".to_string(),
            ..SwiftWriteParams::default()
        });

        let err = storage
            .write(&CancellationToken::new(), reader, &params)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backup name was not set"));
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
