use lostfound_core::ShapeError;
use thiserror::Error;

use crate::engine::TransportError;
use crate::parse::OutputError;
use crate::template::TemplateError;

/// Why one flow invocation failed. Nothing is retried inside this crate.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unknown flow '{0}'")]
    UnknownFlow(String),
    #[error("{flow}: invalid input: {source}")]
    InputValidation { flow: String, source: ShapeError },
    #[error("{flow}: could not render prompt: {source}")]
    Template { flow: String, source: TemplateError },
    #[error("{flow}: model call failed: {source}")]
    Transport { flow: String, source: TransportError },
    #[error("{flow}: invalid model reply: {source}")]
    OutputValidation { flow: String, source: OutputError },
}

impl FlowError {
    pub fn flow(&self) -> &str {
        match self {
            FlowError::UnknownFlow(flow)
            | FlowError::InputValidation { flow, .. }
            | FlowError::Template { flow, .. }
            | FlowError::Transport { flow, .. }
            | FlowError::OutputValidation { flow, .. } => flow,
        }
    }

    /// Transport failures may succeed on a later attempt; everything else
    /// will fail the same way again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FlowError::Transport { .. })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("flow '{flow}' has an invalid template: {source}")]
    Template { flow: String, source: TemplateError },
    #[error("flow '{0}' is already registered")]
    Duplicate(String),
}
