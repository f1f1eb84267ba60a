//! `EtcdClient`: the HTTP `KeyValueStore`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeResponse;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;
use tether_kv_types::validate_key;
use tether_kv_types::validate_write_command;
use tether_traits::KeyValueStore;
use tracing::debug;
use tracing::trace;

use crate::config::ClientConfig;
use crate::wire::ETCD_INDEX_HEADER;
use crate::wire::ErrorBody;
use crate::wire::Params;
use crate::wire::delete_params;
use crate::wire::read_params;
use crate::wire::watch_params;
use crate::wire::write_params;

/// `KeyValueStore` backed by an etcd v2 `/v2/keys` endpoint.
#[derive(Clone, Debug)]
pub struct EtcdClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
    watch_timeout: Duration,
}

/// Per-request data needed to interpret the response.
struct RequestContext<'a> {
    key: &'a str,
    wait_index: Option<u64>,
    timeout: Duration,
}

impl EtcdClient {
    /// Build a new HTTP client targeting the configured endpoint.
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let base_url = config.endpoint_url().context("parse store endpoint")?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("build reqwest client")?;
        debug!(endpoint = %base_url, "etcd client created");
        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout(),
            watch_timeout: config.watch_timeout(),
        })
    }

    /// Build a client from `TETHER_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::load().context("load client configuration")?;
        Self::new(&config)
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v2/keys/{segments...}`, each segment percent-encoded.
    fn keys_url(&self, key: &str) -> Result<Url, KeyValueStoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| KeyValueStoreError::Failed {
                reason: format!("endpoint {} cannot be a base URL", self.base_url),
            })?;
            segments.pop_if_empty().push("v2").push("keys");
            for segment in key.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        ctx: RequestContext<'_>,
    ) -> Result<NodeResponse, KeyValueStoreError> {
        let resp = builder.send().await.map_err(|err| transport_error(&err, ctx.timeout))?;
        Self::decode_response(resp, &ctx).await
    }

    async fn decode_response(resp: Response, ctx: &RequestContext<'_>) -> Result<NodeResponse, KeyValueStoreError> {
        let status = resp.status();
        let etcd_index = resp
            .headers()
            .get(ETCD_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = resp.bytes().await.map_err(|err| transport_error(&err, ctx.timeout))?;

        if status.is_success() {
            // A long poll the server closed without an event.
            if body.is_empty() {
                return Err(KeyValueStoreError::Timeout {
                    duration_ms: ctx.timeout.as_millis() as u64,
                });
            }
            let mut response: NodeResponse = serde_json::from_slice(&body).map_err(|err| KeyValueStoreError::Failed {
                reason: format!("decode response for {}: {}", ctx.key, err),
            })?;
            response.etcd_index = etcd_index.unwrap_or(response.node.modified_index);
            trace!(key = ctx.key, action = %response.action, index = response.etcd_index, "store response");
            return Ok(response);
        }

        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(error) => Err(error.into_error(ctx.key, ctx.wait_index)),
            Err(_) => {
                let reason = String::from_utf8_lossy(&body).into_owned();
                Err(match status {
                    StatusCode::NOT_FOUND => KeyValueStoreError::NotFound {
                        key: ctx.key.to_string(),
                    },
                    _ if status.is_server_error() => KeyValueStoreError::Unavailable {
                        reason: format!("{}: {}", status, reason),
                    },
                    _ => KeyValueStoreError::Failed {
                        reason: format!("{}: {}", status, reason),
                    },
                })
            }
        }
    }

    fn request(&self, method: Method, url: Url, params: &Params, timeout: Duration) -> RequestBuilder {
        let builder = self.client.request(method.clone(), url).timeout(timeout);
        match method {
            Method::PUT | Method::POST => builder.form(params),
            _ => builder.query(params),
        }
    }
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> KeyValueStoreError {
    if err.is_timeout() {
        KeyValueStoreError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() || err.is_request() {
        KeyValueStoreError::Unavailable {
            reason: err.to_string(),
        }
    } else {
        KeyValueStoreError::Failed {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl KeyValueStore for EtcdClient {
    async fn read(&self, request: ReadRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        let url = self.keys_url(&key)?;
        let builder = self.request(Method::GET, url, &read_params(&request), self.request_timeout);
        self.execute(builder, RequestContext {
            key: &key,
            wait_index: None,
            timeout: self.request_timeout,
        })
        .await
    }

    async fn write(&self, request: WriteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        validate_write_command(&request.command)?;
        let (method, key, params) = write_params(&request.command);
        let key = validate_key(key)?;
        let url = self.keys_url(&key)?;
        let builder = self.request(method, url, &params, self.request_timeout);
        self.execute(builder, RequestContext {
            key: &key,
            wait_index: None,
            timeout: self.request_timeout,
        })
        .await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        let url = self.keys_url(&key)?;
        let builder = self.request(Method::DELETE, url, &delete_params(&request), self.request_timeout);
        self.execute(builder, RequestContext {
            key: &key,
            wait_index: None,
            timeout: self.request_timeout,
        })
        .await
    }

    async fn watch(&self, request: WatchRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        let url = self.keys_url(&key)?;
        let timeout = request.timeout_ms.map(Duration::from_millis).unwrap_or(self.watch_timeout);
        let builder = self.request(Method::GET, url, &watch_params(&request), timeout);
        self.execute(builder, RequestContext {
            key: &key,
            wait_index: request.wait_index,
            timeout,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> EtcdClient {
        EtcdClient::new(&ClientConfig {
            endpoint: endpoint.to_string(),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn keys_url_encodes_segments() {
        let c = client("http://127.0.0.1:2379");
        assert_eq!(c.keys_url("/locks/a b").unwrap().as_str(), "http://127.0.0.1:2379/v2/keys/locks/a%20b");
        assert_eq!(c.keys_url("/").unwrap().as_str(), "http://127.0.0.1:2379/v2/keys");
    }

    #[test]
    fn keys_url_keeps_base_path() {
        let c = client("http://proxy:8080/etcd/");
        assert_eq!(c.keys_url("/e").unwrap().as_str(), "http://proxy:8080/etcd/v2/keys/e");
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = EtcdClient::new(&ClientConfig {
            endpoint: "::nope".to_string(),
            ..ClientConfig::default()
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("parse store endpoint"));
    }
}
