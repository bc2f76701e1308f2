//! Remote Org API client
//!
//! Wraps the endpoints the CLI talks to: the paginated hierarchy snapshot,
//! the correction batch endpoint, change-request lookup, and batch
//! preflight. Every call sends the caller's token in the Authorization
//! header; callers that require a token check for one before any request
//! is made.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::docs::{ApiErrorBody, BatchCommandResult, BatchRequest, FixResults};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SNAPSHOT_PAGE_LIMIT: u32 = 10_000;

/// One item of the hierarchy snapshot. `new_values` carries an
/// entity-specific shape, decoded by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub new_values: Value,
}

/// Accumulated result of following snapshot cursors to exhaustion
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotResult {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    pub results: Vec<BatchCommandResult>,
    #[serde(default)]
    pub events_enqueued: u64,
}

#[derive(Debug, Serialize)]
struct PreflightRequest<'a> {
    effective_date: &'a str,
    commands: &'a [crate::docs::BatchCommand],
}

#[derive(Debug)]
pub struct OrgApiClient {
    http_client: reqwest::Client,
    base_url: reqwest::Url,
    authorization: String,
    request_id_header: Option<String>,
}

impl OrgApiClient {
    /// The token may be empty here; commands that need one enforce that
    /// themselves via [`require_authorization`](Self::require_authorization).
    pub fn new(
        base_url: &str,
        authorization: &str,
        request_id_header: Option<&str>,
    ) -> Result<Self> {
        let base_url = base_url.trim();
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|_| Error::usage(format!("invalid --base-url: {base_url:?}")))?;
        if !parsed.has_host() {
            return Err(Error::usage(format!("invalid --base-url: {base_url:?}")));
        }
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            base_url: parsed,
            authorization: authorization.trim().to_string(),
            request_id_header: request_id_header.map(str::to_string),
        })
    }

    pub fn require_authorization(&self, flag: &str) -> Result<()> {
        if self.authorization.is_empty() {
            return Err(Error::usage(format!("{flag} is required")));
        }
        Ok(())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| Error::usage(format!("invalid api path: {path}")))?;
        let mut req = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");
        if !self.authorization.is_empty() {
            req = req.header("Authorization", &self.authorization);
        }
        if let Some(header) = &self.request_id_header {
            req = req.header(header, Uuid::new_v4().to_string());
        }
        Ok(req)
    }

    /// Non-2xx responses carry a structured error body when the service
    /// produced the failure; anything else becomes a bare status error.
    async fn decode_error(context: &str, resp: reqwest::Response) -> Error {
        let status = resp.status();
        match resp.json::<ApiErrorBody>().await {
            Ok(body) if !body.code.trim().is_empty() => Error::Api {
                message: format!("{context} failed: {}", body.message),
                code: body.code,
            },
            _ => Error::Api {
                message: format!("{context} failed: http status={status}"),
                code: status.as_u16().to_string(),
            },
        }
    }

    /// Fetch the full hierarchy snapshot at `effective_date`, following
    /// cursors until the service reports no more pages. No retry: a failed
    /// page fails the whole read.
    pub async fn get_snapshot_all(
        &self,
        effective_date: NaiveDate,
        include: &[&str],
    ) -> Result<SnapshotResult> {
        let mut all = SnapshotResult::default();
        let mut cursor = String::new();
        loop {
            let mut req = self.request(reqwest::Method::GET, "/org/api/snapshot")?.query(&[
                ("effective_date", effective_date.to_string()),
                ("include", include.join(",")),
                ("limit", SNAPSHOT_PAGE_LIMIT.to_string()),
            ]);
            if !cursor.is_empty() {
                req = req.query(&[("cursor", cursor.as_str())]);
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(Self::decode_error("snapshot", resp).await);
            }
            let page: SnapshotResult = resp.json().await?;
            tracing::debug!(page_items = page.items.len(), "snapshot page fetched");

            if all.tenant_id.is_none() {
                all.tenant_id = page.tenant_id;
                all.effective_date = page.effective_date;
                all.generated_at = page.generated_at;
            }
            all.items.extend(page.items);

            match page.next_cursor {
                Some(next) if !next.trim().is_empty() => cursor = next,
                _ => break,
            }
        }
        Ok(all)
    }

    /// Submit a correction batch. A structured API error is folded into
    /// the returned [`FixResults`] so the caller can persist it; transport
    /// errors fail the call.
    pub async fn post_batch(&self, batch: &BatchRequest) -> Result<FixResults> {
        let resp = self
            .request(reqwest::Method::POST, "/org/api/batch")?
            .json(batch)
            .send()
            .await?;
        if !resp.status().is_success() {
            if let Ok(body) = resp.json::<ApiErrorBody>().await {
                if !body.code.trim().is_empty() {
                    return Ok(FixResults {
                        ok: false,
                        events_enqueued: 0,
                        batch_results: None,
                        error: Some(body),
                    });
                }
            }
            return Err(Error::DbWrite("batch failed: unreadable error response".into()));
        }
        let out: BatchResponse = resp.json().await?;
        Ok(FixResults {
            ok: true,
            events_enqueued: out.events_enqueued,
            batch_results: Some(out.results),
            error: None,
        })
    }

    /// Fetch the stored payload of a change request.
    pub async fn get_change_request(&self, id: Uuid) -> Result<Value> {
        if id.is_nil() {
            return Err(Error::usage("--change-request-id is invalid"));
        }
        #[derive(Deserialize)]
        struct ChangeRequestResponse {
            payload: Value,
        }
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/org/api/change-requests/{id}"),
            )?
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::decode_error("change-request get", resp).await);
        }
        let out: ChangeRequestResponse = resp.json().await?;
        Ok(out.payload)
    }

    /// Preflight a batch without executing it; the raw response body is
    /// preserved for the manifest.
    pub async fn post_preflight(&self, batch: &BatchRequest) -> Result<Value> {
        let req = PreflightRequest {
            effective_date: batch.effective_date.trim(),
            commands: &batch.commands,
        };
        let resp = self
            .request(reqwest::Method::POST, "/org/api/preflight")?
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::decode_error("preflight", resp).await);
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_scheme_is_a_usage_error() {
        let err = OrgApiClient::new("localhost:3200", "t", None).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn empty_authorization_fails_the_requirement_check() {
        let client = OrgApiClient::new("http://localhost:3200", "  ", None).unwrap();
        let err = client.require_authorization("--auth-token").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));

        let client = OrgApiClient::new("http://localhost:3200", "Bearer abc", None).unwrap();
        assert!(client.require_authorization("--auth-token").is_ok());
    }

    #[test]
    fn snapshot_items_decode_from_wire_shape() {
        let result: SnapshotResult = serde_json::from_value(serde_json::json!({
            "tenant_id": "6a3c9f1e-0000-0000-0000-000000000001",
            "effective_date": "2025-06-01",
            "generated_at": "2025-06-01T12:00:00Z",
            "items": [
                {
                    "entity_type": "org_node",
                    "entity_id": "6a3c9f1e-0000-0000-0000-000000000002",
                    "new_values": {"org_node_id": "6a3c9f1e-0000-0000-0000-000000000002", "is_root": true, "code": "ROOT", "status": "active"}
                }
            ],
            "next_cursor": null
        }))
        .unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].entity_type, "org_node");
        assert!(result.next_cursor.is_none());
    }
}
