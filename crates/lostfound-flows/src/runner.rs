use std::fmt;
use std::sync::Arc;

use lostfound_core::{Payload, ShapeError, Violation};
use serde_json::json;

use crate::engine::{ModelClient, ModelRequest};
use crate::error::FlowError;
use crate::flows::{
    Registry, DETECT_ITEM_LOCATION, GENERATE_ITEM_DESCRIPTION, IMAGE_MATCHING, TRANSLATE_TEXT,
};
use crate::parse::{self, Coerced, OutputError};
use crate::prompt;
use crate::{
    DescribeItemInput, DetectLocationInput, ItemDescription, LocationTags, MatchInput,
    MatchOutcome, TranslateInput, Translation,
};

/// Where an invocation is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    ValidatingInput,
    Rendering,
    AwaitingModel,
    ValidatingOutput,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Pending => "pending",
            Stage::ValidatingInput => "validating input",
            Stage::Rendering => "rendering",
            Stage::AwaitingModel => "awaiting model",
            Stage::ValidatingOutput => "validating output",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        })
    }
}

/// Stage bookkeeping for one call; transitions go to the debug log.
struct Invocation<'a> {
    flow: &'a str,
    stage: Stage,
}

impl<'a> Invocation<'a> {
    fn start(flow: &'a str) -> Self {
        Self {
            flow,
            stage: Stage::Pending,
        }
    }

    fn advance(&mut self, next: Stage) {
        log::debug!("[lostfound-flows] {}: {} -> {}", self.flow, self.stage, next);
        self.stage = next;
    }

    fn fail(&self, err: FlowError) -> FlowError {
        log::warn!(
            "[lostfound-flows] {}: {} -> {}: {}",
            self.flow,
            self.stage,
            Stage::Failed,
            err
        );
        err
    }
}

/// Terminal result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Output(Payload),
    /// The model explicitly answered "nothing matches".
    NoMatch,
}

/// Runs registered flows against an injected model client.
///
/// Holds no per-call state, so one runner can serve any number of concurrent
/// invocations.
pub struct FlowRunner<C> {
    registry: Arc<Registry>,
    client: C,
}

impl<C: ModelClient> FlowRunner<C> {
    pub fn new(registry: Arc<Registry>, client: C) -> Self {
        Self { registry, client }
    }

    /// Validate `input`, render the prompt, call the model once and validate
    /// the reply.
    pub async fn run(&self, name: &str, input: &serde_json::Value) -> Result<Outcome, FlowError> {
        let flow = self
            .registry
            .get(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))?;
        let mut inv = Invocation::start(flow.name());

        inv.advance(Stage::ValidatingInput);
        let payload = flow.input().validate(input).map_err(|source| {
            inv.fail(FlowError::InputValidation {
                flow: name.to_string(),
                source,
            })
        })?;

        inv.advance(Stage::Rendering);
        let parts = prompt::render(flow.template(), &payload).map_err(|source| {
            inv.fail(FlowError::Template {
                flow: name.to_string(),
                source,
            })
        })?;
        let request = ModelRequest {
            flow: name.to_string(),
            system: prompt::system_prompt(&flow),
            parts,
            output_schema: flow.output_schema(),
        };

        inv.advance(Stage::AwaitingModel);
        log::info!("[lostfound-flows] {name}: sending {} content parts", request.parts.len());
        let response = self.client.generate(&request).await.map_err(|source| {
            inv.fail(FlowError::Transport {
                flow: name.to_string(),
                source,
            })
        })?;
        log::debug!("[lostfound-flows] {name}: raw reply:\n{}", response.text);

        inv.advance(Stage::ValidatingOutput);
        let coerced = match flow.no_match_field() {
            Some(field) => parse::coerce_with_sentinel(&response.text, flow.output(), field),
            None => parse::coerce(&response.text, flow.output()).map(Coerced::Payload),
        };
        let outcome = match coerced {
            Ok(Coerced::Payload(payload)) => Outcome::Output(payload),
            Ok(Coerced::Sentinel) => Outcome::NoMatch,
            Err(source) => {
                return Err(inv.fail(FlowError::OutputValidation {
                    flow: name.to_string(),
                    source,
                }))
            }
        };

        inv.advance(Stage::Succeeded);
        Ok(outcome)
    }

    async fn run_for_output(&self, name: &str, input: serde_json::Value) -> Result<Payload, FlowError> {
        match self.run(name, &input).await? {
            Outcome::Output(payload) => Ok(payload),
            Outcome::NoMatch => Err(FlowError::OutputValidation {
                flow: name.to_string(),
                source: OutputError::UnexpectedSentinel,
            }),
        }
    }

    pub async fn generate_item_description(
        &self,
        input: &DescribeItemInput,
    ) -> Result<ItemDescription, FlowError> {
        let flow = GENERATE_ITEM_DESCRIPTION;
        let payload = self
            .run_for_output(flow, json!({ "photoDataUri": input.photo_data_uri }))
            .await?;
        Ok(ItemDescription {
            name: text_field(flow, &payload, "name")?,
            description: text_field(flow, &payload, "description")?,
        })
    }

    pub async fn detect_item_location(
        &self,
        input: &DetectLocationInput,
    ) -> Result<LocationTags, FlowError> {
        let flow = DETECT_ITEM_LOCATION;
        let payload = self
            .run_for_output(
                flow,
                json!({
                    "photoDataUri": input.photo_data_uri,
                    "description": input.description,
                }),
            )
            .await?;
        Ok(LocationTags {
            location_tags: list_field(flow, &payload, "locationTags")?,
            suggested_options: list_field(flow, &payload, "suggestedOptions")?,
        })
    }

    /// Ask the model which candidate description, if any, the photo shows.
    ///
    /// `candidate_index` is filled in only when the reply repeats a candidate
    /// verbatim; no scoring happens here.
    pub async fn match_lost_item(&self, input: &MatchInput) -> Result<MatchOutcome, FlowError> {
        let flow = IMAGE_MATCHING;
        let outcome = self
            .run(
                flow,
                &json!({
                    "photoDataUri": input.photo_data_uri,
                    "lostItemDescriptions": input.lost_item_descriptions,
                }),
            )
            .await?;
        match outcome {
            Outcome::NoMatch => Ok(MatchOutcome::NoMatch),
            Outcome::Output(payload) => {
                let description = text_field(flow, &payload, "matchingItemDescription")?;
                let candidate_index = input
                    .lost_item_descriptions
                    .iter()
                    .position(|c| *c == description);
                Ok(MatchOutcome::Matched {
                    description,
                    candidate_index,
                })
            }
        }
    }

    pub async fn translate_text(&self, input: &TranslateInput) -> Result<Translation, FlowError> {
        let flow = TRANSLATE_TEXT;
        let payload = self
            .run_for_output(
                flow,
                json!({ "text": input.text, "targetLanguage": input.target_language }),
            )
            .await?;
        Ok(Translation {
            translated_text: text_field(flow, &payload, "translatedText")?,
        })
    }

    /// Translate a batch concurrently. Results keep the order of `texts`; the
    /// first failure fails the whole batch.
    pub async fn translate_all(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<Translation>, FlowError> {
        let inputs: Vec<TranslateInput> = texts
            .iter()
            .map(|text| TranslateInput {
                text: text.clone(),
                target_language: target_language.to_string(),
            })
            .collect();
        futures::future::try_join_all(inputs.iter().map(|input| self.translate_text(input))).await
    }
}

fn missing(flow: &str, field: &str) -> FlowError {
    FlowError::OutputValidation {
        flow: flow.to_string(),
        source: OutputError::Shape(ShapeError {
            violations: vec![Violation::Missing {
                field: field.to_string(),
            }],
        }),
    }
}

fn text_field(flow: &str, payload: &Payload, field: &str) -> Result<String, FlowError> {
    payload
        .text(field)
        .map(str::to_string)
        .ok_or_else(|| missing(flow, field))
}

fn list_field(flow: &str, payload: &Payload, field: &str) -> Result<Vec<String>, FlowError> {
    payload
        .text_list(field)
        .map(<[String]>::to_vec)
        .ok_or_else(|| missing(flow, field))
}
