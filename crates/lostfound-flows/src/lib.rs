pub mod engine;
mod error;
pub mod flows;
mod parse;
pub mod prompt;
mod runner;
pub mod template;

pub use engine::{LlmClient, ModelClient, ModelRequest, ModelResponse, TimeoutClient, TransportError};
pub use error::{FlowError, RegistryError};
pub use flows::{FlowDefinition, Registry};
pub use parse::{coerce, coerce_with_sentinel, Coerced, OutputError};
pub use prompt::ContentPart;
pub use runner::{FlowRunner, Outcome, Stage};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeItemInput {
    pub photo_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescription {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectLocationInput {
    pub photo_data_uri: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationTags {
    pub location_tags: Vec<String>,
    pub suggested_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInput {
    pub photo_data_uri: String,
    pub lost_item_descriptions: Vec<String>,
}

/// Answer of the image-matching flow. `NoMatch` is a valid result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum MatchOutcome {
    Matched {
        description: String,
        /// Position of `description` among the supplied candidates, if it is one of them
        #[serde(rename = "candidateIndex")]
        candidate_index: Option<usize>,
    },
    NoMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateInput {
    pub text: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub translated_text: String,
}

pub type StandardRunner = FlowRunner<TimeoutClient<LlmClient>>;

/// A runner over the standard flows, talking to the model configured in
/// `settings` and giving up after its `timeoutSecs`.
pub fn standard_runner(settings: lostfound_core::AiSettings) -> Result<StandardRunner, RegistryError> {
    let registry = Registry::standard()?;
    Ok(FlowRunner::new(
        std::sync::Arc::new(registry),
        LlmClient::with_timeout(settings),
    ))
}
