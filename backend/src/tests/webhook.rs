// Webhook action handler against a local mock endpoint.

use std::time::Duration;

use serde_json::Map;
use sqlx::PgPool;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::lead_fixture;
use crate::leads::LeadRepository;
use crate::workflows::{ActionDispatcher, ActionError, LiveDispatcher, RunContext};

// The webhook path never touches the database; a lazy pool satisfies
// the repository without a running Postgres.
fn dispatcher(timeout: Duration) -> LiveDispatcher {
    let pool = PgPool::connect_lazy("postgresql://localhost/leadflow_unused")
        .expect("lazy pool");
    LiveDispatcher::new(LeadRepository::new(pool), None, timeout)
}

fn context() -> RunContext {
    let lead = lead_fixture();
    let mut trigger = Map::new();
    trigger.insert("country".to_string(), "BR".into());
    RunContext {
        automation_id: uuid::Uuid::new_v4(),
        workspace_id: lead.workspace_id,
        lead,
        trigger,
    }
}

#[tokio::test]
async fn webhook_posts_lead_and_trigger_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/intake"))
        .and(body_partial_json(serde_json::json!({
            "lead": { "email": "ana@empresa.com.br" },
            "trigger": { "country": "BR" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context();
    let url = format!("{}/crm/intake", server.uri());
    dispatcher(Duration::from_secs(5))
        .send_webhook(&ctx, &url)
        .await
        .expect("webhook should succeed");
}

#[tokio::test]
async fn non_success_response_fails_the_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ctx = context();
    let err = dispatcher(Duration::from_secs(5))
        .send_webhook(&ctx, &server.uri())
        .await
        .expect_err("500 must fail the action");
    assert!(matches!(err, ActionError::Webhook(_)));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn slow_endpoint_hits_the_bounded_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let ctx = context();
    let err = dispatcher(Duration::from_millis(200))
        .send_webhook(&ctx, &server.uri())
        .await
        .expect_err("timeout must fail the action");
    assert!(matches!(err, ActionError::Webhook(_)));
}
