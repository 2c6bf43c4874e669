pub mod repository;
pub mod webhook;

// Shared test setup. Database-backed tests run only when
// TEST_DATABASE_URL is set; each test fetches a pool and returns early
// otherwise, so the suite stays green on machines without Postgres.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use leadflow_shared::Lead;

pub async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping database test");
            return None;
        }
    };
    let pool = PgPool::connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    Some(pool)
}

pub async fn seed_workspace(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO workspaces (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("test workspace {}", id))
        .execute(pool)
        .await
        .expect("failed to seed workspace");
    id
}

pub fn lead_fixture() -> Lead {
    Lead {
        id: Uuid::new_v4(),
        workspace_id: Uuid::new_v4(),
        email: "ana@empresa.com.br".to_string(),
        name: Some("Ana Souza".to_string()),
        phone: None,
        company: Some("Empresa Ltda".to_string()),
        job_title: Some("CEO".to_string()),
        score: 70,
        score_reason: "Scored on: corporate email (+10)".to_string(),
        status: "Qualified".to_string(),
        tags: vec!["decision-maker".to_string()],
        custom_fields: json!({}),
        source_type: "form".to_string(),
        source_id: None,
        utm: None,
        ai_analysis: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}
