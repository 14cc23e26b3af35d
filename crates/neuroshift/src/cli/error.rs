//! Helpful error types for CLI commands
//!
//! Every error says what went wrong and, where possible, what to run next.

use std::fmt;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Job id that is not a UUID
    pub fn invalid_job_id(raw: &str, reason: impl fmt::Display) -> Self {
        Self::new(format!("Invalid job id: '{}'", raw))
            .with_context(reason.to_string())
            .with_suggestion("TRY: neuroshift history   # List saved analytics and their ids")
    }

    /// No saved analytic with this id
    pub fn analytic_not_found(job_id: &str) -> Self {
        Self::new(format!("Analytic '{}' not found", job_id))
            .with_suggestion("TRY: neuroshift history   # List saved analytics and their ids")
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\n\n{}", context)?;
        }
        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                write!(f, "\n{}", suggestion)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
