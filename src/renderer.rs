use std::{collections::HashMap, path::PathBuf};

use anyhow::{Error, Result, anyhow};
use tracing::{debug, warn};

use crate::models::channel::Channel;

/// File-based template renderer. Templates live under
/// `{template_dir}/{channel}/{template_code}{ext}` with the extension fixed
/// per channel, and use `{{variable}}` placeholders.
#[derive(Clone)]
pub struct TemplateRenderer {
    template_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
        }
    }

    /// Render a template for a channel. Fails when the template file is
    /// missing or a placeholder has no matching variable.
    pub async fn render(
        &self,
        channel: Channel,
        template_code: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<String, Error> {
        let path = self.template_path(channel, template_code);

        let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
            anyhow!(
                "Failed to load template '{}' for channel {}: {}",
                template_code,
                channel,
                e
            )
        })?;

        let rendered = replace_variables(&template, data)?;

        debug!(
            template_code,
            channel = %channel,
            variable_count = data.len(),
            "Template rendered"
        );

        Ok(rendered)
    }

    pub async fn template_exists(&self, channel: Channel, template_code: &str) -> bool {
        tokio::fs::try_exists(self.template_path(channel, template_code))
            .await
            .unwrap_or(false)
    }

    fn template_path(&self, channel: Channel, template_code: &str) -> PathBuf {
        self.template_dir
            .join(channel.short_name())
            .join(format!("{}{}", template_code, channel.template_extension()))
    }
}

fn replace_variables(
    template: &str,
    variables: &HashMap<String, serde_json::Value>,
) -> Result<String, Error> {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);

        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            _ => {
                return Err(anyhow!("Unsupported variable type for key '{}'", key));
            }
        };

        result = result.replace(&placeholder, &replacement);
    }

    if let Some(start) = result.find("{{") {
        if let Some(end) = result[start..].find("}}") {
            let missing_var = &result[start..start + end + 2];

            warn!(
                missing_variable = %missing_var,
                "Template contains unreplaced variable"
            );

            return Err(anyhow!("Missing variable in template: {}", missing_var));
        }
    }

    Ok(result)
}
