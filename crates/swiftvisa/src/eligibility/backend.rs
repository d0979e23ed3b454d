use super::domain::{EligibilityResult, NormalizedProfile};
use async_trait::async_trait;
use std::time::Duration;

/// Capability that turns a normalized profile into a verdict.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn evaluate(&self, profile: NormalizedProfile)
        -> Result<EligibilityResult, InvocationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("failed to encode worker request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to start worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {stream} stream failed: {source}")]
    Stream {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("worker exited with {}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("worker produced unreadable output: {source}")]
    MalformedOutput {
        #[source]
        source: serde_json::Error,
        stderr: String,
    },
    #[error("worker did not finish within {after:?} and was terminated")]
    Timeout { after: Duration },
    #[error("worker capacity of {limit} concurrent invocations exhausted")]
    Overloaded { limit: usize },
}

impl InvocationError {
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::Encode(_) => "encode",
            InvocationError::Spawn { .. } => "spawn",
            InvocationError::Stream { .. } => "stream",
            InvocationError::NonZeroExit { .. } => "non_zero_exit",
            InvocationError::MalformedOutput { .. } => "malformed_output",
            InvocationError::Timeout { .. } => "timeout",
            InvocationError::Overloaded { .. } => "overloaded",
        }
    }

    /// Operator-facing diagnostic: captured stderr where the worker produced
    /// some, otherwise the error description.
    pub fn details(&self) -> String {
        match self {
            InvocationError::NonZeroExit { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.clone()
            }
            InvocationError::MalformedOutput { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            InvocationError::NonZeroExit { stderr, .. }
            | InvocationError::MalformedOutput { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status code (terminated by signal)".to_string(),
    }
}
