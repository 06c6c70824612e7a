//! HTML page rendering
//!
//! Login and privacy pages rendered with minijinja from templates embedded
//! in the binary.

use crate::{MyqHomeError, Result};
use minijinja::Environment;
use std::sync::Arc;

pub const LOGIN_TEMPLATE: &str = "login";
pub const PRIVACY_TEMPLATE: &str = "privacy-policy";

/// Template renderer for HTML pages using minijinja
#[derive(Clone)]
pub struct TemplateRenderer {
    env: Arc<Environment<'static>>,
}

impl TemplateRenderer {
    /// Create a renderer with the embedded page templates loaded
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        // Auto-escape HTML for security
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::Html);

        env.add_template(
            LOGIN_TEMPLATE,
            include_str!("../../static/pages/login.html"),
        )
        .map_err(|e| MyqHomeError::config(format!("Invalid login template: {}", e)))?;
        env.add_template(
            PRIVACY_TEMPLATE,
            include_str!("../../static/pages/privacy-policy.html"),
        )
        .map_err(|e| MyqHomeError::config(format!("Invalid privacy template: {}", e)))?;

        Ok(Self { env: Arc::new(env) })
    }

    /// Render a template with JSON data
    pub fn render_json(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| MyqHomeError::config(format!("Template '{}' not found", name)))?;

        template.render(data).map_err(|e| {
            MyqHomeError::config(format!("Failed to render template '{}': {}", name, e))
        })
    }
}

#[cfg(test)]
mod template_test {
    include!("template_test.rs");
}
