use anyhow::{Context, Result};
use serde_json::Value;

pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    pub async fn list(&self, resource_type: Option<&str>) -> Result<Value> {
        let mut req = self.http.get(self.api_url("sync-states"));
        if let Some(rt) = resource_type {
            req = req.query(&[("type", rt)]);
        }
        let resp = req.send().await.context("Failed to connect to server")?;
        handle_response(resp).await
    }

    /// Record URL with both segments escaped; placeholder names may contain `/`.
    fn state_url(&self, resource_type: &str, name: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_url("sync-states"))
            .with_context(|| format!("Invalid server URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Invalid server URL: {}", self.base_url))?
            .push(resource_type)
            .push(name);
        Ok(url)
    }

    pub async fn get(&self, resource_type: &str, name: &str) -> Result<Value> {
        let url = self.state_url(resource_type, name)?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    pub async fn register(&self, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.api_url("sources"))
            .json(body)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    pub async fn unregister(&self, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .delete(self.api_url("sources"))
            .json(body)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    pub async fn health(&self) -> Result<(u16, String)> {
        let url = format!("{}/healthz", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to connect to server")?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        anyhow::bail!("{}", error_message(status.as_u16(), &body));
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).context("Failed to parse response JSON")
}

/// Renders the server's `{error, category}` body, falling back to the raw text.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body)
        && let Some(error) = json.get("error").and_then(|v| v.as_str())
    {
        return match json.get("category").and_then(|v| v.as_str()) {
            Some(category) => format!("HTTP {status} ({category}): {error}"),
            None => format!("HTTP {status}: {error}"),
        };
    }
    format!("HTTP {status}: {body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_uses_category() {
        let body = r#"{"error":"SyncState not found: Rule/x","category":"not_found"}"#;
        assert_eq!(
            error_message(404, body),
            "HTTP 404 (not_found): SyncState not found: Rule/x"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message(502, "bad gateway"), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_state_url_escapes_placeholder_names() {
        let client = AdminClient::new("http://localhost:8080");
        let url = client.state_url("Rule", "pending-team/a-www").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/sync-states/Rule/pending-team%2Fa-www"
        );
        let url = client.state_url("Rule", "pending-a%2Fb").unwrap();
        assert!(url.as_str().ends_with("/Rule/pending-a%252Fb"));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = AdminClient::new("http://localhost:8080/");
        assert_eq!(
            client.api_url("sync-states"),
            "http://localhost:8080/api/sync-states"
        );
    }
}
