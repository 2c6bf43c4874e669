//! Lead persistence: (workspace_id, email)-unique upserts and the
//! append-only event log.
//!
//! The find-then-insert sequence races under concurrent duplicate
//! submissions; the UNIQUE constraint on (workspace_id, email) is the
//! authoritative guard and a violation is recovered as "already
//! exists", never surfaced as an error.

use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use leadflow_shared::{Lead, LeadEvent, LeadEventType, LeadSourceType};

use super::extractor::ExtractedSubmission;
use super::scoring::{self, QUALIFIED_THRESHOLD};
use crate::pagination::PaginationParams;

#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub source_type: LeadSourceType,
    pub source_id: Option<Uuid>,
    pub utm: Option<Value>,
}

/// Fields accepted for a dashboard-entered lead.
#[derive(Debug, Clone)]
pub struct ManualLead {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug)]
pub enum FindOrCreateOutcome {
    /// No email in the submission; nothing to key a lead on.
    SkippedNoIdentity,
    /// Lead already existed; a form_submit event was appended,
    /// fields and score intentionally untouched.
    Existing(Lead),
    Created(Lead),
}

#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deduplicate-or-create a lead from an extracted submission.
    pub async fn find_or_create(
        &self,
        workspace_id: Uuid,
        extracted: &ExtractedSubmission,
        raw_submission: &Map<String, Value>,
        source: &SourceMeta,
    ) -> Result<FindOrCreateOutcome, sqlx::Error> {
        let email = match &extracted.fields.email {
            Some(email) => email.to_lowercase(),
            None => return Ok(FindOrCreateOutcome::SkippedNoIdentity),
        };

        if let Some(lead) = self.find_by_email(workspace_id, &email).await? {
            self.append_form_submit(&lead, raw_submission, source).await?;
            return Ok(FindOrCreateOutcome::Existing(lead));
        }

        self.insert_or_recover(workspace_id, &email, extracted, raw_submission, source)
            .await
    }

    /// Insert a new lead; a unique violation means another submission
    /// created it between our find and insert, so take the update path.
    pub(crate) async fn insert_or_recover(
        &self,
        workspace_id: Uuid,
        email: &str,
        extracted: &ExtractedSubmission,
        raw_submission: &Map<String, Value>,
        source: &SourceMeta,
    ) -> Result<FindOrCreateOutcome, sqlx::Error> {
        match self
            .insert_new(workspace_id, email, extracted, raw_submission, source)
            .await
        {
            Ok(lead) => Ok(FindOrCreateOutcome::Created(lead)),
            Err(err) if is_unique_violation(&err) => {
                let lead = self
                    .find_by_email(workspace_id, email)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                self.append_form_submit(&lead, raw_submission, source).await?;
                Ok(FindOrCreateOutcome::Existing(lead))
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_new(
        &self,
        workspace_id: Uuid,
        email: &str,
        extracted: &ExtractedSubmission,
        raw_submission: &Map<String, Value>,
        source: &SourceMeta,
    ) -> Result<Lead, sqlx::Error> {
        let fields = &extracted.fields;
        let result = scoring::score(
            Some(email),
            fields.company.as_deref(),
            fields.job_title.as_deref(),
            raw_submission,
        );

        let status = if result.score >= QUALIFIED_THRESHOLD {
            "Qualified"
        } else {
            "New"
        };
        let tags: Vec<String> = result.tags.iter().cloned().collect();

        let mut tx = self.pool.begin().await?;

        let lead: Lead = sqlx::query_as(
            r#"
            INSERT INTO leads
                (id, workspace_id, email, name, company, job_title, score, score_reason,
                 status, tags, custom_fields, source_type, source_id, utm)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(email)
        .bind(&fields.name)
        .bind(&fields.company)
        .bind(&fields.job_title)
        .bind(result.score)
        .bind(&result.reason)
        .bind(status)
        .bind(&tags)
        .bind(Value::Object(extracted.custom_fields.clone()))
        .bind(source.source_type.as_str())
        .bind(source.source_id)
        .bind(&source.utm)
        .fetch_one(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            lead.id,
            LeadEventType::Created,
            json!({
                "source_type": source.source_type.as_str(),
                "source_id": source.source_id,
                "submission": Value::Object(raw_submission.clone()),
            }),
        )
        .await?;

        insert_event(
            &mut tx,
            lead.id,
            LeadEventType::ScoreCalculated,
            json!({
                "score": result.score,
                "reason": result.reason,
                "tags": tags,
            }),
        )
        .await?;

        // Every submission logs a form_submit, including the one that
        // created the lead: two concurrent duplicates leave one row and
        // two form_submit events either way.
        insert_event(
            &mut tx,
            lead.id,
            LeadEventType::FormSubmit,
            json!({
                "source_id": source.source_id,
                "submission": Value::Object(raw_submission.clone()),
            }),
        )
        .await?;

        tx.commit().await?;

        info!(lead_id = %lead.id, score = result.score, "lead created");
        Ok(lead)
    }

    async fn append_form_submit(
        &self,
        lead: &Lead,
        raw_submission: &Map<String, Value>,
        source: &SourceMeta,
    ) -> Result<(), sqlx::Error> {
        self.append_event(
            lead.id,
            LeadEventType::FormSubmit,
            json!({
                "source_id": source.source_id,
                "submission": Value::Object(raw_submission.clone()),
            }),
        )
        .await
    }

    pub async fn find_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM leads WHERE workspace_id = $1 AND email = $2")
            .bind(workspace_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<Lead, sqlx::Error> {
        sqlx::query_as("SELECT * FROM leads WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(lead_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Paginated lead list with optional substring search and status filter.
    pub async fn list(
        &self,
        workspace_id: Uuid,
        params: &PaginationParams,
        search: Option<&str>,
        status: Option<&str>,
    ) -> Result<(Vec<Lead>, i64), sqlx::Error> {
        let mut query = sqlx::QueryBuilder::new("SELECT * FROM leads WHERE workspace_id = ");
        let mut count = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM leads WHERE workspace_id = ");

        for builder in [&mut query, &mut count] {
            builder.push_bind(workspace_id);
            if let Some(search) = search {
                let pattern = format!("%{}%", search.trim());
                builder.push(" AND (email ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR name ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR company ILIKE ");
                builder.push_bind(pattern);
                builder.push(")");
            }
            if let Some(status) = status {
                builder.push(" AND status = ");
                builder.push_bind(status.to_string());
            }
        }

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(params.limit());
        query.push(" OFFSET ");
        query.push_bind(params.offset());

        let leads = query.build_query_as().fetch_all(&self.pool).await?;
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        Ok((leads, total))
    }

    /// Event history, newest first, for audit display.
    pub async fn events(&self, lead_id: Uuid) -> Result<Vec<LeadEvent>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM lead_events WHERE lead_id = $1 ORDER BY seq DESC")
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn append_event(
        &self,
        lead_id: Uuid,
        event_type: LeadEventType,
        payload: Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO lead_events (id, lead_id, event_type, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(lead_id)
        .bind(event_type.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set-union tag addition; duplicates never accumulate.
    pub async fn add_tags(&self, lead_id: Uuid, tags: &[String]) -> Result<Lead, sqlx::Error> {
        let lead: Lead = sqlx::query_as(
            r#"
            UPDATE leads
            SET tags = (SELECT COALESCE(array_agg(DISTINCT t ORDER BY t), '{}') FROM unnest(tags || $2) AS t),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(lead_id)
        .bind(tags)
        .fetch_one(&self.pool)
        .await?;

        self.append_event(lead_id, LeadEventType::TagsAdded, json!({ "tags": tags }))
            .await?;
        Ok(lead)
    }

    pub async fn remove_tag(&self, lead_id: Uuid, tag: &str) -> Result<Lead, sqlx::Error> {
        let lead: Lead = sqlx::query_as(
            "UPDATE leads SET tags = array_remove(tags, $2), updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(lead_id)
        .bind(tag)
        .fetch_one(&self.pool)
        .await?;

        self.append_event(lead_id, LeadEventType::TagRemoved, json!({ "tag": tag }))
            .await?;
        Ok(lead)
    }

    pub async fn set_status(&self, lead_id: Uuid, status: &str) -> Result<Lead, sqlx::Error> {
        let previous: (String,) = sqlx::query_as("SELECT status FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_one(&self.pool)
            .await?;

        let lead: Lead = sqlx::query_as(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(lead_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        self.append_event(
            lead_id,
            LeadEventType::StatusChanged,
            json!({ "from": previous.0, "to": status }),
        )
        .await?;
        Ok(lead)
    }

    /// Manual score override from the dashboard.
    pub async fn override_score(
        &self,
        lead_id: Uuid,
        score: i32,
        reason: &str,
    ) -> Result<Lead, sqlx::Error> {
        let score = score.clamp(0, 100);
        let lead: Lead = sqlx::query_as(
            "UPDATE leads SET score = $2, score_reason = $3, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(lead_id)
        .bind(score)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        self.append_event(
            lead_id,
            LeadEventType::ScoreManualUpdate,
            json!({ "score": score, "reason": reason, "at": Utc::now() }),
        )
        .await?;
        Ok(lead)
    }

    /// Merge opaque enrichment output into the lead.
    pub async fn merge_ai_analysis(
        &self,
        lead_id: Uuid,
        analysis: Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE leads SET ai_analysis = $2, updated_at = NOW() WHERE id = $1")
            .bind(lead_id)
            .bind(&analysis)
            .execute(&self.pool)
            .await?;

        self.append_event(lead_id, LeadEventType::AiAnalysis, analysis)
            .await
    }

    /// Manual lead entry from the dashboard. The same uniqueness guard
    /// applies, but here a duplicate email is the caller's error rather
    /// than a dedup path; `None` signals the conflict.
    pub async fn create_manual(
        &self,
        workspace_id: Uuid,
        entry: &ManualLead,
    ) -> Result<Option<Lead>, sqlx::Error> {
        let email = entry.email.trim().to_lowercase();
        let result = scoring::score(
            Some(&email),
            entry.company.as_deref(),
            entry.job_title.as_deref(),
            &Map::new(),
        );
        let status = if result.score >= QUALIFIED_THRESHOLD {
            "Qualified"
        } else {
            "New"
        };
        let tags: Vec<String> = result.tags.iter().cloned().collect();

        let mut tx = self.pool.begin().await?;

        let inserted: Result<Lead, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO leads
                (id, workspace_id, email, name, phone, company, job_title,
                 score, score_reason, status, tags, source_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(&email)
        .bind(&entry.name)
        .bind(&entry.phone)
        .bind(&entry.company)
        .bind(&entry.job_title)
        .bind(result.score)
        .bind(&result.reason)
        .bind(status)
        .bind(&tags)
        .bind(LeadSourceType::Manual.as_str())
        .fetch_one(&mut *tx)
        .await;

        let lead = match inserted {
            Ok(lead) => lead,
            Err(err) if is_unique_violation(&err) => return Ok(None),
            Err(err) => return Err(err),
        };

        insert_event(
            &mut tx,
            lead.id,
            LeadEventType::Created,
            json!({ "source_type": LeadSourceType::Manual.as_str() }),
        )
        .await?;
        insert_event(
            &mut tx,
            lead.id,
            LeadEventType::ScoreCalculated,
            json!({ "score": result.score, "reason": result.reason, "tags": tags }),
        )
        .await?;

        tx.commit().await?;

        info!(lead_id = %lead.id, "lead created manually");
        Ok(Some(lead))
    }

    /// Explicit user deletion; events go with the lead via cascade.
    pub async fn delete(&self, workspace_id: Uuid, lead_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM leads WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(lead_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    lead_id: Uuid,
    event_type: LeadEventType,
    payload: Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO lead_events (id, lead_id, event_type, payload) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(lead_id)
    .bind(event_type.as_str())
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
