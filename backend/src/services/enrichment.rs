//! Optional third-party lead enrichment.
//!
//! The collaborator returns opaque JSON that is merged into the lead's
//! `ai_analysis` field. No correctness guarantees are made over its
//! output; failures are logged and ignored.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use leadflow_shared::Lead;

#[derive(Clone)]
pub struct EnrichmentService {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl EnrichmentService {
    pub fn new(endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Ask the collaborator for a free-form analysis of the lead.
    pub async fn analyze(&self, lead: &Lead) -> Option<Value> {
        let endpoint = self.endpoint.as_ref()?;

        let body = json!({
            "email": lead.email,
            "name": lead.name,
            "company": lead.company,
            "job_title": lead.job_title,
            "custom_fields": lead.custom_fields,
        });

        match self.client.post(endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                response.json::<Value>().await.ok()
            }
            Ok(response) => {
                warn!("enrichment endpoint returned {}", response.status());
                None
            }
            Err(err) => {
                warn!("enrichment request failed: {}", err);
                None
            }
        }
    }
}
