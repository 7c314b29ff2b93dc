use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use unisync_core::{ApiContext, ApiError, ExternalApi, ExternalResource, ResourceType};
use url::Url;

use crate::config::ClientConfig;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<EnvelopeError>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl Envelope {
    fn error_message(&self) -> String {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        if messages.is_empty() {
            "request failed".to_string()
        } else {
            messages.join("; ")
        }
    }
}

pub struct HttpExternalApi {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl HttpExternalApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "invalid base URL: {}",
                config.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    fn collection(ctx: &ApiContext, resource_type: ResourceType) -> Result<Vec<String>, ApiError> {
        let zone = ctx.zone_scope.as_deref().filter(|z| !z.is_empty());
        let account = || vec!["accounts".to_string(), ctx.account_scope.clone()];
        let zoned = |z: &str| vec!["zones".to_string(), z.to_string()];

        let (mut segments, leaf) = match resource_type {
            ResourceType::Rule => (zone.map_or_else(account, zoned), "rules"),
            ResourceType::Ruleset => (zone.map_or_else(account, zoned), "rulesets"),
            ResourceType::List => (account(), "lists"),
            ResourceType::DnsRecord => {
                let zone = zone.ok_or_else(|| {
                    ApiError::InvalidRequest("DNS records require a zone scope".into())
                })?;
                (zoned(zone), "dns_records")
            }
        };
        if segments[1].is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "missing {} scope",
                segments[0].trim_end_matches('s')
            )));
        }
        segments.push(leaf.to_string());
        Ok(segments)
    }

    fn url(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: Option<&str>,
    ) -> Result<Url, ApiError> {
        let mut segments = Self::collection(ctx, resource_type)?;
        segments.extend(id.map(str::to_string));

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest("invalid base URL".into()))?
            .pop_if_empty()
            .extend(&segments);
        Ok(url)
    }

    fn request(&self, ctx: &ApiContext, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        let token = self.config.credentials.get(&ctx.credentials_ref).ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "no credentials configured for reference {:?}",
                ctx.credentials_ref
            ))
        })?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Sends `request` and unwraps the envelope's `result`.
    async fn send(
        &self,
        resource_type: ResourceType,
        id: Option<&str>,
        request: RequestBuilder,
    ) -> Result<Option<Value>, ApiError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let retry_after = retry_after_secs(&response);
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        debug!(resource_type = %resource_type, status = status.as_u16(), bytes = body.len(),
            "External API response");

        let envelope = if body.is_empty() {
            None
        } else {
            serde_json::from_slice::<Envelope>(&body).ok()
        };
        let message = || {
            envelope.as_ref().map_or_else(
                || String::from_utf8_lossy(&body).into_owned(),
                Envelope::error_message,
            )
        };

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found(resource_type.as_str(), id.unwrap_or_default()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(resource_type = %resource_type, retry_after_secs = ?retry_after,
                "Rate limited by external API");
            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status.is_server_error() {
            return Err(ApiError::Unavailable {
                status: status.as_u16(),
                message: message(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: message(),
            });
        }

        if body.is_empty() {
            return Ok(None);
        }
        let Some(envelope) = envelope else {
            return Err(ApiError::InvalidResponse(
                "response body is not a result envelope".into(),
            ));
        };
        if !envelope.success {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: envelope.error_message(),
            });
        }
        Ok(envelope.result)
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.config.request_timeout_ms)
        } else if error.is_decode() {
            ApiError::InvalidResponse(error.to_string())
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn to_resource(value: Value) -> Result<ExternalResource, ApiError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::InvalidResponse("result carries no id".into()))?
        .to_string();
    let mut resource = ExternalResource::new(id);
    if let Some(name) = value.get("name").and_then(Value::as_str) {
        resource = resource.with_name(name);
    }
    Ok(resource.with_body(value))
}

fn require_result(result: Option<Value>) -> Result<Value, ApiError> {
    result.ok_or_else(|| ApiError::InvalidResponse("response carries no result".into()))
}

#[async_trait]
impl ExternalApi for HttpExternalApi {
    async fn create(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        params: &Value,
    ) -> Result<ExternalResource, ApiError> {
        let url = self.url(ctx, resource_type, None)?;
        let request = self.request(ctx, Method::POST, url)?.json(params);
        to_resource(require_result(self.send(resource_type, None, request).await?)?)
    }

    async fn update(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
        params: &Value,
    ) -> Result<ExternalResource, ApiError> {
        let url = self.url(ctx, resource_type, Some(id))?;
        let request = self.request(ctx, Method::PUT, url)?.json(params);
        to_resource(require_result(self.send(resource_type, Some(id), request).await?)?)
    }

    async fn delete(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(ctx, resource_type, Some(id))?;
        let request = self.request(ctx, Method::DELETE, url)?;
        self.send(resource_type, Some(id), request).await?;
        Ok(())
    }

    async fn get(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<ExternalResource, ApiError> {
        let url = self.url(ctx, resource_type, Some(id))?;
        let request = self.request(ctx, Method::GET, url)?;
        to_resource(require_result(self.send(resource_type, Some(id), request).await?)?)
    }

    async fn list_by_name(
        &self,
        ctx: &ApiContext,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<Vec<ExternalResource>, ApiError> {
        let url = self.url(ctx, resource_type, None)?;
        let request = self.request(ctx, Method::GET, url)?.query(&[("name", name)]);
        let listed = match self.send(resource_type, None, request).await? {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ApiError::InvalidResponse(
                    "list result is not an array".into(),
                ));
            }
        };

        let mut resources = Vec::with_capacity(listed.len());
        for item in listed {
            let resource = to_resource(item)?;
            // The service may match by prefix; only exact names count.
            if resource.name.as_deref() == Some(name) {
                resources.push(resource);
            }
        }
        Ok(resources)
    }
}
