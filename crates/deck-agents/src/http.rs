//! HTTP collaborators: the planning service and the slide-editing service.
//!
//! - planner: `POST {url}/plan` and `POST {url}/revise`, answering with a
//!   plan document
//! - slide tool: `POST {url}/slides:apply` with one [`SlideBatch`]

use std::time::Duration;

use async_trait::async_trait;
use deck_coordination::slides::SlideBatch;
use deck_coordination::{
    LayoutExplanation, Plan, PlanningCollaborator, PlanningError, SlideReceipt, SlideTool,
    ToolError,
};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::plan_file::PlanDocument;

/// Longest slice of an error body kept in a tool error
const MAX_ERROR_BODY: usize = 200;

/// Map a non-success status from the slide service to a tool error.
///
/// 404/410/422 mean the deck or the request itself is wrong, so retrying is
/// pointless. 408, 429 and 5xx are transient. Any other client error is
/// treated as fatal.
pub fn classify_status(status: StatusCode, body: &str) -> ToolError {
    let message = format!("slide service returned {}: {}", status, truncate(body));
    match status.as_u16() {
        404 | 410 | 422 => ToolError::Fatal(message),
        408 | 429 => ToolError::Recoverable(message),
        s if s >= 500 => ToolError::Recoverable(message),
        _ => ToolError::Fatal(message),
    }
}

fn truncate(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

// ============================================================================
// Planner
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    content: &'a str,
    layouts: &'a [LayoutExplanation],
}

#[derive(Serialize)]
struct ReviseRequest<'a> {
    plan_id: &'a str,
    plan: PlanDocument,
    feedback: &'a str,
}

pub struct HttpPlanner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlanner {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        join(&self.base_url, path)
    }

    async fn request<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        plan_id: Option<&str>,
    ) -> Result<Plan, PlanningError> {
        let url = self.endpoint(path);
        debug!(%url, "Calling planner");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PlanningError::Unavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", url, status, truncate(&body));
            warn!(%url, %status, "Planner request failed");
            return Err(
                if status.is_server_error()
                    || status == StatusCode::TOO_MANY_REQUESTS
                    || status == StatusCode::REQUEST_TIMEOUT
                {
                    PlanningError::Unavailable(message)
                } else {
                    PlanningError::InvalidPlan(message)
                },
            );
        }

        let document: PlanDocument = response
            .json()
            .await
            .map_err(|e| PlanningError::InvalidPlan(e.to_string()))?;
        document
            .into_plan(plan_id)
            .map_err(|e| PlanningError::InvalidPlan(e.to_string()))
    }
}

#[async_trait]
impl PlanningCollaborator for HttpPlanner {
    async fn generate_plan(
        &self,
        content: &str,
        layouts: &[LayoutExplanation],
    ) -> Result<Plan, PlanningError> {
        self.request("plan", &GenerateRequest { content, layouts }, None)
            .await
    }

    async fn revise_plan(&self, plan: &Plan, feedback: &str) -> Result<Plan, PlanningError> {
        let body = ReviseRequest {
            plan_id: &plan.id,
            plan: PlanDocument::from_plan(plan),
            feedback,
        };
        self.request("revise", &body, Some(&plan.id)).await
    }
}

// ============================================================================
// Slide tool
// ============================================================================

pub struct HttpSlideTool {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSlideTool {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn endpoint(&self) -> String {
        join(&self.base_url, "slides:apply")
    }
}

#[async_trait]
impl SlideTool for HttpSlideTool {
    async fn apply(&self, batch: &SlideBatch) -> Result<SlideReceipt, ToolError> {
        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| ToolError::Recoverable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // The batch is applied at this point; a missing receipt is not a failure
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<SlideReceipt>(&body) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                debug!(slide = %batch.slide_object_id, error = %e, "No receipt in response");
                Ok(SlideReceipt {
                    slide_object_id: batch.slide_object_id.clone(),
                    revision: None,
                })
            }
        }
    }
}
