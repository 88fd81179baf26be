//! Errors raised while loading vessel templates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("malformed template JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("template '{template}': {reason}")]
    Invalid { template: String, reason: String },
}
