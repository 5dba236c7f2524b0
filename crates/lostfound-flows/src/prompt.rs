use lostfound_core::{DataUri, FieldKind, Payload, Value};

use crate::flows::FlowDefinition;
use crate::template::{BodySegment, Segment, Template, TemplateError};

/// One ordered unit of a rendered prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Media(DataUri),
}

/// Accumulates parts, merging adjacent text.
#[derive(Default)]
struct Parts(Vec<ContentPart>);

impl Parts {
    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(ContentPart::Text(prev)) => prev.push_str(text),
            _ => self.0.push(ContentPart::Text(text.to_string())),
        }
    }

    fn media(&mut self, uri: &DataUri) {
        self.0.push(ContentPart::Media(uri.clone()));
    }
}

/// Fill `template` from a validated payload.
///
/// An optional field the payload leaves out renders as nothing. A payload value
/// of the wrong kind (one validated against some other shape) is an error.
pub fn render(template: &Template, payload: &Payload) -> Result<Vec<ContentPart>, TemplateError> {
    let mut parts = Parts::default();

    for segment in template.segments() {
        match segment {
            Segment::Text(text) => parts.text(text),
            Segment::Field(name) => match payload.get(name) {
                Some(Value::Text(text)) => parts.text(text),
                Some(other) => return Err(mismatch(name, "text substitution", FieldKind::Text, other)),
                None => {}
            },
            Segment::Media(name) => match payload.get(name) {
                Some(Value::Image(uri)) => parts.media(uri),
                Some(other) => {
                    return Err(mismatch(name, "media attachment", FieldKind::ImageDataUri, other))
                }
                None => {}
            },
            Segment::Each { field, body } => match payload.get(field) {
                Some(Value::TextList(items)) => {
                    for item in items {
                        for piece in body {
                            match piece {
                                BodySegment::Text(text) => parts.text(text),
                                BodySegment::Item => parts.text(item),
                            }
                        }
                    }
                }
                Some(other) => return Err(mismatch(field, "each block", FieldKind::TextList, other)),
                None => {}
            },
        }
    }

    Ok(parts.0)
}

fn mismatch(field: &str, usage: &'static str, expected: FieldKind, found: &Value) -> TemplateError {
    TemplateError::KindMismatch {
        field: field.to_string(),
        usage,
        expected,
        actual: found.kind(),
    }
}

/// System instructions shared by every flow: answer with one JSON object that
/// fits the flow's output schema.
pub fn system_prompt(flow: &FlowDefinition) -> String {
    let schema = serde_json::to_string_pretty(&flow.output_schema())
        .unwrap_or_else(|_| "{}".to_string());
    let mut out = format!(
        "You are the assistant behind a campus Lost & Found board. \
Follow the user's instructions and answer with ONLY a single JSON object, no prose and no code fences. \
The object must conform to this JSON Schema:\n{schema}"
    );
    if let Some(field) = flow.no_match_field() {
        out.push_str(&format!(
            "\n\nIf nothing qualifies, answer {{\"{field}\": null}}. Never invent a value."
        ));
    }
    out
}

pub const DESCRIBE_ITEM: &str = "\
You are an expert at identifying and describing objects.

Analyze the following image and generate a concise name and a detailed description for the item shown. \
The description should highlight key features, colors, and any unique marks.

Photo: {{media url=photoDataUri}}

Return the name and description in a JSON format.";

pub const DETECT_LOCATION: &str = "\
You are an AI assistant designed to detect the location of a lost item from its description and image, \
and suggest standardized tags and options.

Analyze the following information to identify the location of the lost item and suggest relevant tags and options:

Description: {{{description}}}
Photo: {{media url=photoDataUri}}

Based on the description and image, extract standardized location tags and suggest options for categorizing \
the lost item. Return the location tags and suggested options in a JSON format.

Example:
{\"locationTags\": [\"park\", \"bench\", \"near the entrance\"], \"suggestedOptions\": [\"lost\", \"found\", \"item\", \"location\"]}";

pub const MATCH_LOST_ITEM: &str = "\
You are an AI assistant that matches a found item image with descriptions of lost items.

Given a photo of a found item and a list of descriptions of lost items, determine which description best matches \
the found item in the photo.
If there is a clear match, return the description of the matching lost item, copied exactly as listed.
If there are multiple potential matches, return the description that is the most likely match.
If there is no reasonable match, return null.

Here are the descriptions of the lost items:
{{#each lostItemDescriptions}}- {{{this}}}
{{/each}}
Here is the photo of the found item:
{{media url=photoDataUri}}";

pub const TRANSLATE_TEXT: &str = "\
You are a translator for messages exchanged between people who lost and found items.

Translate the following message into {{targetLanguage}}. Keep names, places and numbers as they are, \
and keep the tone of the original.

Message: {{{text}}}

Return the translation in a JSON format.";
