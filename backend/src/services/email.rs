use crate::config::SmtpConfig;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info};

static MERGE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").unwrap());

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    pub async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;
        let to = to_email.parse::<Mailbox>()?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(Box::new(e))
            }
        }
    }
}

/// Replace `{{path.to.field}}` merge tags with values from the render
/// context. Unresolved tags are left in place so a broken template is
/// visible in the delivered mail rather than silently blanked.
pub fn render_merge_tags(template: &str, context: &Value) -> String {
    let mut result = template.to_string();

    for cap in MERGE_TAG_REGEX.captures_iter(template) {
        let path = &cap[1];
        if let Some(value) = get_nested_value(context, path) {
            let replacement = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => value.to_string(),
            };
            result = result.replace(&cap[0], &replacement);
        }
    }

    result
}

fn get_nested_value(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_merge_tags() {
        let context = json!({
            "lead": {"name": "Maria", "score": 70},
            "trigger": {"country": "BR"}
        });
        let rendered = render_merge_tags(
            "Hi {{lead.name}}, score {{lead.score}}, from {{ trigger.country }}",
            &context,
        );
        assert_eq!(rendered, "Hi Maria, score 70, from BR");
    }

    #[test]
    fn unresolved_tags_are_left_intact() {
        let rendered = render_merge_tags("Hello {{lead.missing}}", &json!({"lead": {}}));
        assert_eq!(rendered, "Hello {{lead.missing}}");
    }
}
