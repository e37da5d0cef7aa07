//! Workspace API client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use loreweave_core::error::SyncError;
use loreweave_core::external::{
    ApiContext, Block, ExternalPage, PageBatch, PropertyValue, WorkspaceClient,
};

/// Header carrying the workspace protocol version.
const PROTOCOL_HEADER: &str = "Workspace-Version";

/// The protocol version this client speaks.
const PROTOCOL_VERSION: &str = "2024-09-01";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`WorkspaceClient`] over the workspace's JSON API.
#[derive(Debug, Clone)]
pub struct HttpWorkspaceClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreatePageBody<'a> {
    container_id: &'a str,
    properties: &'a BTreeMap<String, PropertyValue>,
}

#[derive(Serialize)]
struct UpdatePageBody<'a> {
    properties: &'a BTreeMap<String, PropertyValue>,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponseBody {
    pages: Vec<ExternalPage>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ChildrenResponseBody {
    blocks: Vec<Block>,
}

impl HttpWorkspaceClient {
    /// Builds a client against the given API base URL (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` when the underlying HTTP client cannot
    /// be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        ctx: &ApiContext,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(ctx.credential.expose())
            .header(PROTOCOL_HEADER, PROTOCOL_VERSION)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<T, SyncError> {
        let response = request
            .send()
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        let response = check_status(response, resource).await?;
        response
            .json()
            .await
            .map_err(|err| SyncError::MalformedPayload(err.to_string()))
    }
}

/// Maps the response status onto [`SyncError`], returning the response
/// unchanged on success.
async fn check_status(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(SyncError::AuthExpired),
        404 => Err(SyncError::NotFoundExternal(resource.to_owned())),
        429 => Err(SyncError::RateLimited {
            retry_after: parse_retry_after(&response),
        }),
        400 | 422 => {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::MalformedPayload(body))
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::Transport(format!("status {code}: {body}")))
        }
    }
}

/// Parses `Retry-After` as whole seconds; an absent or unparseable header
/// yields `None` and the caller falls back to its own backoff.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl WorkspaceClient for HttpWorkspaceClient {
    async fn create_page(
        &self,
        ctx: &ApiContext,
        container_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError> {
        tracing::debug!(container_id, "creating workspace page");
        let request = self.request(reqwest::Method::POST, ctx, "/v1/pages").json(
            &CreatePageBody {
                container_id,
                properties: &properties,
            },
        );
        Self::send(request, container_id).await
    }

    async fn update_page(
        &self,
        ctx: &ApiContext,
        page_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError> {
        tracing::debug!(page_id, "updating workspace page");
        let request = self
            .request(reqwest::Method::PATCH, ctx, &format!("/v1/pages/{page_id}"))
            .json(&UpdatePageBody {
                properties: &properties,
            });
        Self::send(request, page_id).await
    }

    async fn fetch_page(&self, ctx: &ApiContext, page_id: &str) -> Result<ExternalPage, SyncError> {
        let request = self.request(reqwest::Method::GET, ctx, &format!("/v1/pages/{page_id}"));
        Self::send(request, page_id).await
    }

    async fn query_container(
        &self,
        ctx: &ApiContext,
        container_id: &str,
        cursor: Option<&str>,
    ) -> Result<PageBatch, SyncError> {
        let request = self
            .request(
                reqwest::Method::POST,
                ctx,
                &format!("/v1/containers/{container_id}/query"),
            )
            .json(&QueryBody { cursor });
        let body: QueryResponseBody = Self::send(request, container_id).await?;
        Ok(PageBatch {
            pages: body.pages,
            next_cursor: body.next_cursor,
        })
    }

    async fn block_children(
        &self,
        ctx: &ApiContext,
        block_id: &str,
    ) -> Result<Vec<Block>, SyncError> {
        let request = self.request(
            reqwest::Method::GET,
            ctx,
            &format!("/v1/blocks/{block_id}/children"),
        );
        let body: ChildrenResponseBody = Self::send(request, block_id).await?;
        Ok(body.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_response(status: u16) -> reqwest::Response {
        reqwest::Response::from(::http::Response::builder().status(status).body("").unwrap())
    }

    fn mock_response_with_retry_after(status: u16, value: &str) -> reqwest::Response {
        reqwest::Response::from(
            ::http::Response::builder()
                .status(status)
                .header("Retry-After", value)
                .body("")
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_success_status_passes_through() {
        let response = mock_response(200);
        assert!(check_status(response, "page-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_expired() {
        for status in [401, 403] {
            let err = check_status(mock_response(status), "page-1")
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::AuthExpired));
        }
    }

    #[tokio::test]
    async fn test_not_found_names_the_resource() {
        let err = check_status(mock_response(404), "page-9")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFoundExternal(id) if id == "page-9"));
    }

    #[tokio::test]
    async fn test_rate_limited_parses_retry_after() {
        let err = check_status(mock_response_with_retry_after(429, "30"), "page-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_tolerates_missing_header() {
        let err = check_status(mock_response(429), "page-1").await.unwrap_err();
        assert!(matches!(err, SyncError::RateLimited { retry_after: None }));
    }

    #[tokio::test]
    async fn test_rate_limited_tolerates_unparseable_header() {
        let err = check_status(mock_response_with_retry_after(429, "Wed, 21 Oct"), "page-1")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RateLimited { retry_after: None }));
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_malformed_payload() {
        for status in [400, 422] {
            let err = check_status(mock_response(status), "page-1")
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::MalformedPayload(_)));
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_transport() {
        let err = check_status(mock_response(503), "page-1").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }
}
