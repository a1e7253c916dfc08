//! Error types for cfgagent-renderer.

use thiserror::Error;

/// All errors that can arise from template rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error (syntax error, undefined variable, ...).
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),
}

impl RenderError {
    /// Message plus the nested cause chain; tera keeps the useful detail
    /// (line, undefined variable) in its own `source()`.
    pub fn detail(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self).and_then(std::error::Error::source);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
