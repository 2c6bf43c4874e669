//! Canonical field extraction from raw form submissions.
//!
//! Resolution runs in two stages, first non-empty result wins: the form
//! schema (semantic field types, then label/fieldName synonyms), then a
//! case-insensitive synonym scan over the submission keys themselves.
//! Everything not claimed by a canonical field is kept verbatim as
//! custom fields.

use leadflow_shared::FormField;
use serde_json::{Map, Value};

/// The four fields every lead is normalized onto. Each is optional;
/// a submission with none of them still persists as a raw submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalFields {
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedSubmission {
    pub fields: CanonicalFields,
    /// Unmapped submission keys, value untouched. Keys containing a
    /// canonical synonym are excluded even when extraction did not use
    /// them; the substring match intentionally over-excludes (a field named
    /// "company_size" is swallowed by "company").
    pub custom_fields: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    Email,
    Name,
    Company,
    JobTitle,
}

const ALL_CANONICAL: [Canonical; 4] = [
    Canonical::Email,
    Canonical::Name,
    Canonical::Company,
    Canonical::JobTitle,
];

impl Canonical {
    /// Key/label synonyms, English and Portuguese, lowercase.
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Email => &["email", "e-mail", "mail"],
            Self::Name => &["name", "nome"],
            Self::Company => &["company", "empresa", "organization", "organizacao"],
            Self::JobTitle => &["job title", "jobtitle", "job_title", "cargo", "position", "funcao"],
        }
    }

    /// Semantic schema field type, when the form builder declares one.
    fn semantic_type(self) -> Option<&'static str> {
        match self {
            Self::Email => Some("email"),
            _ => None,
        }
    }
}

/// Extract canonical fields and partition the rest into custom fields.
pub fn extract(
    submission: &Map<String, Value>,
    schema: Option<&[FormField]>,
) -> ExtractedSubmission {
    let fields = CanonicalFields {
        email: resolve(Canonical::Email, submission, schema),
        name: resolve(Canonical::Name, submission, schema),
        company: resolve(Canonical::Company, submission, schema),
        job_title: resolve(Canonical::JobTitle, submission, schema),
    };

    let custom_fields = submission
        .iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ExtractedSubmission {
        fields,
        custom_fields,
    }
}

/// Schema lookup always runs first; the synonym scan is the fallback.
fn resolve(
    target: Canonical,
    submission: &Map<String, Value>,
    schema: Option<&[FormField]>,
) -> Option<String> {
    schema
        .and_then(|fields| resolve_from_schema(target, submission, fields))
        .or_else(|| resolve_from_keys(target, submission))
}

fn resolve_from_schema(
    target: Canonical,
    submission: &Map<String, Value>,
    schema: &[FormField],
) -> Option<String> {
    let field = schema.iter().find(|f| schema_field_matches(target, f))?;

    // The declared fieldName is how the submission map is usually keyed;
    // older forms keyed entries by the field id instead.
    let by_name = field
        .extra_attributes
        .field_name
        .as_deref()
        .and_then(|name| submission.get(name));

    by_name
        .or_else(|| submission.get(&field.id))
        .and_then(value_as_text)
}

fn schema_field_matches(target: Canonical, field: &FormField) -> bool {
    if let Some(semantic) = target.semantic_type() {
        if field.field_type.to_lowercase().contains(semantic) {
            return true;
        }
    }

    let label = field
        .extra_attributes
        .label
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let field_name = field
        .extra_attributes
        .field_name
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    target
        .synonyms()
        .iter()
        .any(|syn| label.contains(syn) || field_name.contains(syn))
}

fn resolve_from_keys(target: Canonical, submission: &Map<String, Value>) -> Option<String> {
    for (key, value) in submission {
        let key = key.to_lowercase();
        if target.synonyms().iter().any(|syn| key.contains(syn)) {
            if let Some(text) = value_as_text(value) {
                return Some(text);
            }
        }
    }
    None
}

/// A key is reserved (and excluded from custom fields) when it contains
/// any canonical synonym, case-insensitively.
fn is_reserved_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ALL_CANONICAL
        .iter()
        .any(|c| c.synonyms().iter().any(|syn| key.contains(syn)))
}

fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::{FormFieldAttributes, FormField};
    use serde_json::json;

    fn submission(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn schema_field(id: &str, field_type: &str, name: Option<&str>, label: Option<&str>) -> FormField {
        FormField {
            id: id.to_string(),
            field_type: field_type.to_string(),
            extra_attributes: FormFieldAttributes {
                field_name: name.map(str::to_string),
                label: label.map(str::to_string),
            },
        }
    }

    #[test]
    fn schema_email_type_wins_over_key_scan() {
        let sub = submission(&[
            ("contact", json!("ceo@corp.com")),
            ("email", json!("decoy@other.com")),
        ]);
        let schema = vec![schema_field("f1", "EmailField", Some("contact"), Some("Contact"))];

        let out = extract(&sub, Some(&schema));
        assert_eq!(out.fields.email.as_deref(), Some("ceo@corp.com"));
    }

    #[test]
    fn schema_value_falls_back_to_field_id() {
        let sub = submission(&[("f9", json!("Jane Roe"))]);
        let schema = vec![schema_field("f9", "TextField", Some("full_name"), Some("Nome completo"))];

        let out = extract(&sub, Some(&schema));
        assert_eq!(out.fields.name.as_deref(), Some("Jane Roe"));
    }

    #[test]
    fn synonym_fallback_without_schema() {
        let sub = submission(&[
            ("E-Mail", json!("a@b.com")),
            ("Empresa", json!("Acme")),
            ("Cargo", json!("CTO")),
        ]);

        let out = extract(&sub, None);
        assert_eq!(out.fields.email.as_deref(), Some("a@b.com"));
        assert_eq!(out.fields.company.as_deref(), Some("Acme"));
        assert_eq!(out.fields.job_title.as_deref(), Some("CTO"));
    }

    #[test]
    fn unmapped_keys_become_custom_fields() {
        let sub = submission(&[
            ("email", json!("a@b.com")),
            ("favorite_color", json!("green")),
            ("team_size", json!(12)),
        ]);

        let out = extract(&sub, None);
        assert!(out.custom_fields.contains_key("favorite_color"));
        assert!(out.custom_fields.contains_key("team_size"));
        assert!(!out.custom_fields.contains_key("email"));
    }

    #[test]
    fn reserved_substring_swallows_similar_custom_keys() {
        // "company_size" contains "company" and is swallowed even though
        // it was never mapped to the company field.
        let sub = submission(&[
            ("company", json!("Acme")),
            ("company_size", json!("50-100")),
        ]);

        let out = extract(&sub, None);
        assert_eq!(out.fields.company.as_deref(), Some("Acme"));
        assert!(!out.custom_fields.contains_key("company_size"));
    }

    #[test]
    fn blank_values_are_treated_as_absent() {
        let sub = submission(&[("email", json!("   ")), ("name", json!(null))]);
        let out = extract(&sub, None);
        assert_eq!(out.fields.email, None);
        assert_eq!(out.fields.name, None);
    }
}
