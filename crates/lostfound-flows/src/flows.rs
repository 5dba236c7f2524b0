use std::collections::HashMap;
use std::sync::Arc;

use lostfound_core::{FieldKind, Shape};

use crate::error::RegistryError;
use crate::prompt;
use crate::template::Template;

pub const GENERATE_ITEM_DESCRIPTION: &str = "generateItemDescription";
pub const DETECT_ITEM_LOCATION: &str = "detectItemLocation";
pub const IMAGE_MATCHING: &str = "imageMatchingForLostItems";
pub const TRANSLATE_TEXT: &str = "translateText";

const PHOTO_HINT: &str = "A photo of the item, as a data URI that must include a MIME type and use Base64 \
encoding. Expected format: 'data:<mimetype>;base64,<encoded_data>'.";

/// A named prompt with fixed input and output shapes.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    name: String,
    input: Shape,
    output: Shape,
    template: Template,
    no_match_field: Option<String>,
}

impl FlowDefinition {
    /// Build a flow, resolving `template` against `input` up front.
    pub fn new(name: &str, input: Shape, output: Shape, template: &str) -> Result<Self, RegistryError> {
        let template = Template::new(template, &input).map_err(|source| RegistryError::Template {
            flow: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            input,
            output,
            template,
            no_match_field: None,
        })
    }

    /// Treat an explicitly empty `field` in the reply as "no match".
    pub fn with_no_match(mut self, field: &str) -> Self {
        self.no_match_field = Some(field.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &Shape {
        &self.input
    }

    pub fn output(&self) -> &Shape {
        &self.output
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn no_match_field(&self) -> Option<&str> {
        self.no_match_field.as_deref()
    }

    /// Response schema sent to the model. The no-match field, if any, also
    /// admits `null` so the sentinel stays expressible under strict
    /// structured output.
    pub fn output_schema(&self) -> serde_json::Value {
        let mut schema = self.output.json_schema();
        if let Some(field) = self.no_match_field() {
            if let Some(prop) = schema["properties"].get_mut(field) {
                prop["type"] = serde_json::json!(["string", "null"]);
            }
        }
        schema
    }
}

/// Flow definitions by name. Built once at start-up, then only read.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    flows: HashMap<String, Arc<FlowDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flow: FlowDefinition) -> Result<(), RegistryError> {
        if self.flows.contains_key(flow.name()) {
            return Err(RegistryError::Duplicate(flow.name().to_string()));
        }
        self.flows.insert(flow.name().to_string(), Arc::new(flow));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<FlowDefinition>> {
        self.flows.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// The four Lost & Found flows.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(generate_item_description()?)?;
        registry.register(detect_item_location()?)?;
        registry.register(image_matching()?)?;
        registry.register(translate_text()?)?;
        Ok(registry)
    }
}

fn generate_item_description() -> Result<FlowDefinition, RegistryError> {
    FlowDefinition::new(
        GENERATE_ITEM_DESCRIPTION,
        Shape::new().required("photoDataUri", FieldKind::ImageDataUri, PHOTO_HINT),
        Shape::new()
            .required(
                "name",
                FieldKind::Text,
                "A concise and descriptive name for the item in the image.",
            )
            .required(
                "description",
                FieldKind::Text,
                "A detailed description of the item in the image, including any distinguishing features.",
            ),
        prompt::DESCRIBE_ITEM,
    )
}

fn detect_item_location() -> Result<FlowDefinition, RegistryError> {
    FlowDefinition::new(
        DETECT_ITEM_LOCATION,
        Shape::new()
            .required("photoDataUri", FieldKind::ImageDataUri, PHOTO_HINT)
            .required("description", FieldKind::Text, "The description of the lost item."),
        Shape::new()
            .required(
                "locationTags",
                FieldKind::TextList,
                "Standardized location tags extracted from the description and image.",
            )
            .required(
                "suggestedOptions",
                FieldKind::TextList,
                "Suggested options for categorizing the lost item.",
            ),
        prompt::DETECT_LOCATION,
    )
}

fn image_matching() -> Result<FlowDefinition, RegistryError> {
    let flow = FlowDefinition::new(
        IMAGE_MATCHING,
        Shape::new()
            .required("photoDataUri", FieldKind::ImageDataUri, PHOTO_HINT)
            .required(
                "lostItemDescriptions",
                FieldKind::TextList,
                "A list of descriptions of lost items.",
            ),
        Shape::new().required(
            "matchingItemDescription",
            FieldKind::Text,
            "The description of the lost item that best matches the found item image, or null if no match is found.",
        ),
        prompt::MATCH_LOST_ITEM,
    )?;
    Ok(flow.with_no_match("matchingItemDescription"))
}

fn translate_text() -> Result<FlowDefinition, RegistryError> {
    FlowDefinition::new(
        TRANSLATE_TEXT,
        Shape::new()
            .required("text", FieldKind::Text, "The message to translate.")
            .required(
                "targetLanguage",
                FieldKind::Text,
                "The language to translate into, e.g. 'Spanish'.",
            ),
        Shape::new().required("translatedText", FieldKind::Text, "The translated message."),
        prompt::TRANSLATE_TEXT,
    )
}
