//! HTTP utilities for Azure Resource Manager REST calls

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// A failed ARM call, decoded from the `{"error": {"code", "message"}}` envelope
#[derive(Debug, Clone, thiserror::Error)]
#[error("API request failed: {status}{}", describe(.code, .message))]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Option<String>,
    pub message: Option<String>,
}

fn describe(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(" ({code}: {message})"),
        (Some(code), None) => format!(" ({code})"),
        (None, Some(message)) => format!(" ({message})"),
        (None, None) => String::new(),
    }
}

impl ApiError {
    fn from_body(status: StatusCode, body: &Value) -> Self {
        let error = body.get("error");
        let field = |name: &str| {
            error
                .and_then(|e| e.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Self {
            status,
            code: field("code"),
            message: field("message"),
        }
    }
}

/// Raw ARM response with the headers that drive long-running operations
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub body: Value,
    /// `Azure-AsyncOperation` status monitor URL
    pub async_operation: Option<String>,
    /// `Location` URL for 202-style operations
    pub location: Option<String>,
    pub retry_after: Option<Duration>,
}

impl ArmResponse {
    /// Whether the caller must poll before the result is final
    ///
    /// `Location` is only a polling handle on 202; a 201 with `Location`
    /// already carries the created resource.
    pub fn is_pending(&self) -> bool {
        match self.status {
            StatusCode::CREATED => self.async_operation.is_some(),
            StatusCode::ACCEPTED => self.async_operation.is_some() || self.location.is_some(),
            _ => false,
        }
    }

    fn into_result(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(ApiError::from_body(self.status, &self.body).into())
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, "retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// HTTP client wrapper for ARM calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("azkv/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Underlying reqwest client, shared with the token endpoint
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request without judging its status
    async fn execute(&self, request: RequestBuilder) -> Result<ArmResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();

        let response = request
            .header(CLIENT_REQUEST_ID_HEADER, &request_id)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("Not found [request {}]", request_id);
        } else if !status.is_success() {
            tracing::error!(
                "API error: {} [request {}] - {}",
                status,
                request_id,
                sanitize_for_log(&body)
            );
        }

        // Error envelopes are decoded best-effort; a non-JSON body must not
        // hide the status code
        let body = if body.trim().is_empty() {
            Value::Null
        } else if status.is_success() {
            serde_json::from_str(&body).context("Failed to parse response JSON")?
        } else {
            serde_json::from_str(&body).unwrap_or(Value::Null)
        };

        Ok(ArmResponse {
            status,
            body,
            async_operation: header_str(&headers, ASYNC_OPERATION_HEADER),
            location: header_str(&headers, "location"),
            retry_after: parse_retry_after(&headers),
        })
    }

    /// Make a GET request and return the full response
    pub async fn get_response(&self, url: &str, token: &str) -> Result<ArmResponse> {
        tracing::debug!("GET {}", url);
        self.execute(self.client.get(url).bearer_auth(token))
            .await?
            .into_result()
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        Ok(self.get_response(url, token).await?.body)
    }

    /// Make a GET request where 404 means "does not exist"
    pub async fn get_optional(&self, url: &str, token: &str) -> Result<Option<Value>> {
        tracing::debug!("GET {}", url);
        let response = self.execute(self.client.get(url).bearer_auth(token)).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(response.into_result()?.body))
    }

    /// Make a PUT request with a JSON body
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse> {
        tracing::debug!("PUT {}", url);
        self.execute(self.client.put(url).bearer_auth(token).json(body))
            .await?
            .into_result()
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, token: &str) -> Result<ArmResponse> {
        tracing::debug!("DELETE {}", url);
        self.execute(self.client.delete(url).bearer_auth(token))
            .await?
            .into_result()
    }
}

/// Remediation hint for a failed call, if the failure is a recognizable ARM error
pub fn error_hint(error: &anyhow::Error) -> Option<&'static str> {
    let api_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ApiError>())?;

    let hint = match api_error.status.as_u16() {
        401 => "Authentication failed. Check AZURE_CLIENT_ID/AZURE_SECRET/AZURE_TENANT or your credentials profile.",
        403 => "Permission denied. Check the role assignments of your principal on the subscription.",
        404 => "Resource not found. Check the subscription and resource group names.",
        409 => "Resource conflict. A soft-deleted vault with this name may need create_mode: recover.",
        429 => "Rate limit exceeded. Please try again later.",
        400 => "Invalid request. Check your parameters.",
        500..=599 => "Azure service temporarily unavailable. Please try again.",
        _ => return None,
    };

    Some(hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_decodes_envelope() {
        let body = json!({
            "error": {"code": "VaultAlreadyExists", "message": "The vault name 'kv1' is already in use."}
        });
        let err = ApiError::from_body(StatusCode::CONFLICT, &body);

        assert_eq!(err.code.as_deref(), Some("VaultAlreadyExists"));
        assert_eq!(
            err.to_string(),
            "API request failed: 409 Conflict (VaultAlreadyExists: The vault name 'kv1' is already in use.)"
        );
    }

    #[test]
    fn test_api_error_without_envelope() {
        let err = ApiError::from_body(StatusCode::BAD_GATEWAY, &Value::Null);
        assert_eq!(err.to_string(), "API request failed: 502 Bad Gateway");
    }

    #[test]
    fn test_error_hint_walks_context_chain() {
        let err = anyhow::Error::from(ApiError {
            status: StatusCode::FORBIDDEN,
            code: Some("AuthorizationFailed".into()),
            message: None,
        })
        .context("Error creating the Key Vault instance");

        assert!(error_hint(&err).unwrap().starts_with("Permission denied"));
        assert!(error_hint(&anyhow::anyhow!("plain failure")).is_none());
    }

    #[test]
    fn test_sanitize_truncates_and_strips_control_chars() {
        let long = "x".repeat(500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));

        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn test_pending_requires_handle() {
        let response = ArmResponse {
            status: StatusCode::CREATED,
            body: Value::Null,
            async_operation: None,
            location: None,
            retry_after: None,
        };
        assert!(!response.is_pending());

        let response = ArmResponse {
            async_operation: Some("https://example.com/op".into()),
            ..response
        };
        assert!(response.is_pending());
    }

    #[test]
    fn test_location_only_pends_on_accepted() {
        let created = ArmResponse {
            status: StatusCode::CREATED,
            body: json!({"id": "/vaults/kv1"}),
            async_operation: None,
            location: Some("https://example.com/vaults/kv1".into()),
            retry_after: None,
        };
        assert!(!created.is_pending());

        let accepted = ArmResponse {
            status: StatusCode::ACCEPTED,
            ..created
        };
        assert!(accepted.is_pending());
    }
}
