//! Selects which automations fire for an incoming event.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use leadflow_shared::Automation;

/// Active form-submission automations for a workspace whose trigger
/// filter admits the given form. The SQL narrows by workspace, active
/// flag and trigger type; the form filter in `trigger_config` is
/// applied in process.
pub async fn matching_automations(
    pool: &PgPool,
    workspace_id: Uuid,
    form_id: Uuid,
) -> Result<Vec<Automation>, sqlx::Error> {
    let automations = sqlx::query_as::<_, Automation>(
        "SELECT * FROM automations
         WHERE workspace_id = $1 AND is_active = TRUE AND trigger_type = 'form_submission'
         ORDER BY created_at",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    Ok(automations
        .into_iter()
        .filter(|a| trigger_admits_form(&a.trigger_config, form_id))
        .collect())
}

/// A trigger with no `formId` fires for every form in the workspace;
/// one with a `formId` fires only for that form. Unparseable ids never
/// match.
pub fn trigger_admits_form(trigger_config: &Value, form_id: Uuid) -> bool {
    match trigger_config.get("formId").and_then(Value::as_str) {
        None | Some("") => true,
        Some(raw) => Uuid::parse_str(raw).map(|id| id == form_id).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_trigger_config_admits_every_form() {
        let form_id = Uuid::new_v4();
        assert!(trigger_admits_form(&json!({}), form_id));
        assert!(trigger_admits_form(&json!({"formId": ""}), form_id));
    }

    #[test]
    fn form_filter_admits_only_the_named_form() {
        let form_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let config = json!({"formId": form_id.to_string()});
        assert!(trigger_admits_form(&config, form_id));
        assert!(!trigger_admits_form(&config, other));
    }

    #[test]
    fn garbage_form_id_never_matches() {
        assert!(!trigger_admits_form(
            &json!({"formId": "not-a-uuid"}),
            Uuid::new_v4()
        ));
    }
}
