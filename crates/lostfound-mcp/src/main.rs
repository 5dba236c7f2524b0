use std::sync::Arc;

use lostfound_core::catalog::{self, Item, ItemStatus, Message, Threads, User};
use lostfound_core::AiSettings;
use lostfound_flows::{
    DescribeItemInput, DetectLocationInput, FlowError, MatchInput, MatchOutcome, RegistryError,
    StandardRunner,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DescribeItemRequest {
    /// Photo of the item as a data URI: 'data:<mimetype>;base64,<encoded_data>'
    photo_data_uri: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DetectLocationRequest {
    /// Photo of the item as a data URI: 'data:<mimetype>;base64,<encoded_data>'
    photo_data_uri: String,
    /// What the reporter wrote about the item and where it was lost or found
    description: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MatchFoundItemRequest {
    /// Photo of the found item as a data URI: 'data:<mimetype>;base64,<encoded_data>'
    photo_data_uri: String,
    /// Candidate descriptions to match against. Default: every listed item as "<name>: <description>".
    lost_item_descriptions: Option<Vec<String>>,
    /// Only consider listed items with this status ("Lost", "Found", "Claimed"). Ignored when lost_item_descriptions is given.
    status: Option<ItemStatus>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct TranslateMessagesRequest {
    /// Messages to translate, in conversation order
    texts: Vec<String>,
    /// Language name, e.g. "Spanish". "original" returns the messages untouched.
    target_language: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListItemsRequest {
    /// Only list items with this status ("Lost", "Found", "Claimed")
    status: Option<ItemStatus>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetItemRequest {
    /// Item id, e.g. "3"
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ItemMessagesRequest {
    /// Item whose conversation to return
    item_id: String,
    /// Also translate every message into this language. Omit or use "original" for none.
    target_language: Option<String>,
}

// --- Responses ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslatedMessage {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadMessage<'a> {
    #[serde(flatten)]
    message: &'a Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_text: Option<String>,
}

// --- Server ---

#[derive(Clone)]
pub struct LostFoundServer {
    runner: Arc<StandardRunner>,
    settings: AiSettings,
    items: Arc<Vec<Item>>,
    users: Arc<Vec<User>>,
    threads: Arc<Threads>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LostFoundServer {
    pub fn new(settings: AiSettings) -> Result<Self, RegistryError> {
        let runner = lostfound_flows::standard_runner(settings.clone())?;
        Ok(Self {
            runner: Arc::new(runner),
            settings,
            items: Arc::new(catalog::seed_items()),
            users: Arc::new(catalog::seed_users()),
            threads: Arc::new(catalog::seed_threads()),
            tool_router: Self::tool_router(),
        })
    }

    fn ensure_configured(&self) -> Option<CallToolResult> {
        if lostfound_core::ai_configured(&self.settings) {
            None
        } else {
            Some(CallToolResult::error(vec![Content::text(
                "AI is not configured. Set provider, model and API key in ~/.lostfound/settings.json \
or via LOSTFOUND_PROVIDER / LOSTFOUND_MODEL / LOSTFOUND_API_KEY.",
            )]))
        }
    }

    #[tool(description = "List the items on the Lost & Found board")]
    fn list_items(
        &self,
        Parameters(req): Parameters<ListItemsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let items: Vec<&Item> = self
            .items
            .iter()
            .filter(|item| req.status.map_or(true, |s| item.status == s))
            .collect();
        Ok(json_result(&items))
    }

    #[tool(description = "Get one item with the user who posted it. Returns {item, owner}; owner is null when unknown.")]
    fn get_item(
        &self,
        Parameters(req): Parameters<GetItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        match catalog::find_item(&self.items, &self.users, &req.id) {
            Some(detail) => Ok(json_result(&detail)),
            None => Ok(CallToolResult::error(vec![Content::text(format!(
                "No item with id '{}'",
                req.id
            ))])),
        }
    }

    #[tool(
        description = "Board statistics: totals, counts per status and per category, and the claim rate as a percentage with one decimal."
    )]
    fn get_item_stats(&self) -> Result<CallToolResult, McpError> {
        Ok(json_result(&catalog::item_stats(&self.items)))
    }

    #[tool(
        description = "Get the conversation about an item, oldest first. With target_language, every message also carries translatedText; if any translation fails, none are returned."
    )]
    async fn get_item_messages(
        &self,
        Parameters(req): Parameters<ItemMessagesRequest>,
    ) -> Result<CallToolResult, McpError> {
        if !self.items.iter().any(|item| item.id == req.item_id) {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "No item with id '{}'",
                req.item_id
            ))]));
        }
        let thread = catalog::messages_for(&self.threads, &req.item_id);
        let target = req
            .target_language
            .filter(|lang| !lang.eq_ignore_ascii_case("original"));
        let Some(target) = target.filter(|_| !thread.is_empty()) else {
            return Ok(json_result(&thread_messages(thread, None)));
        };
        if let Some(err) = self.ensure_configured() {
            return Ok(err);
        }
        let texts: Vec<String> = thread.iter().map(|m| m.text.clone()).collect();
        match self.runner.translate_all(&texts, &target).await {
            Ok(translations) => {
                let translated = translations.into_iter().map(|t| t.translated_text).collect();
                Ok(json_result(&thread_messages(thread, Some(translated))))
            }
            Err(e) => Ok(flow_error(e)),
        }
    }

    #[tool(description = "Get the AI provider settings in use. The API key is never returned, only whether one is set.")]
    fn get_ai_settings(&self) -> Result<CallToolResult, McpError> {
        Ok(json_result(&masked_settings(&self.settings)))
    }

    #[tool(
        description = "Generate a concise name and a detailed description for the item shown in a photo. Returns {name, description}."
    )]
    async fn generate_item_description(
        &self,
        Parameters(req): Parameters<DescribeItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(err) = self.ensure_configured() {
            return Ok(err);
        }
        let input = DescribeItemInput {
            photo_data_uri: req.photo_data_uri,
        };
        match self.runner.generate_item_description(&input).await {
            Ok(out) => Ok(json_result(&out)),
            Err(e) => Ok(flow_error(e)),
        }
    }

    #[tool(
        description = "Suggest standardized location tags and categorization options for a lost item from its photo and description. Returns {locationTags, suggestedOptions}; either list may be empty."
    )]
    async fn detect_item_location(
        &self,
        Parameters(req): Parameters<DetectLocationRequest>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(err) = self.ensure_configured() {
            return Ok(err);
        }
        let input = DetectLocationInput {
            photo_data_uri: req.photo_data_uri,
            description: req.description,
        };
        match self.runner.detect_item_location(&input).await {
            Ok(out) => Ok(json_result(&out)),
            Err(e) => Ok(flow_error(e)),
        }
    }

    #[tool(
        description = "Match a photo of a found item against lost item descriptions. Returns {result: \"matched\", description, candidateIndex, item?} or {result: \"noMatch\"}. A noMatch result is a normal answer, not an error."
    )]
    async fn match_found_item(
        &self,
        Parameters(req): Parameters<MatchFoundItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        let candidates = req
            .lost_item_descriptions
            .unwrap_or_else(|| catalog::candidate_labels(&self.items, req.status));
        // Nothing to choose from: no match, and no model call.
        if candidates.is_empty() {
            return Ok(json_result(&match_report(&MatchOutcome::NoMatch, &self.items)));
        }
        if let Some(err) = self.ensure_configured() {
            return Ok(err);
        }
        let input = MatchInput {
            photo_data_uri: req.photo_data_uri,
            lost_item_descriptions: candidates,
        };
        match self.runner.match_lost_item(&input).await {
            Ok(outcome) => Ok(json_result(&match_report(&outcome, &self.items))),
            Err(e) => Ok(flow_error(e)),
        }
    }

    #[tool(
        description = "Translate chat messages into another language. All messages are translated concurrently; if any fails, none are returned. Returns [{text, translatedText}] in input order."
    )]
    async fn translate_messages(
        &self,
        Parameters(req): Parameters<TranslateMessagesRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.target_language.eq_ignore_ascii_case("original") {
            return Ok(json_result(&untranslated(req.texts)));
        }
        if let Some(err) = self.ensure_configured() {
            return Ok(err);
        }
        match self.runner.translate_all(&req.texts, &req.target_language).await {
            Ok(translations) => {
                let messages: Vec<TranslatedMessage> = req
                    .texts
                    .into_iter()
                    .zip(translations)
                    .map(|(text, t)| TranslatedMessage {
                        text,
                        translated_text: Some(t.translated_text),
                    })
                    .collect();
                Ok(json_result(&messages))
            }
            Err(e) => Ok(flow_error(e)),
        }
    }
}

#[tool_handler]
impl ServerHandler for LostFoundServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn json_result<T: Serialize + ?Sized>(value: &T) -> CallToolResult {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("Serialization error: {}", e));
    CallToolResult::success(vec![Content::text(json)])
}

/// Error result whose text starts with the failure class so callers can tell
/// bad input, an unreachable model and a bad reply apart.
fn flow_error(err: FlowError) -> CallToolResult {
    let class = match &err {
        FlowError::UnknownFlow(_) | FlowError::Template { .. } => "Internal error",
        FlowError::InputValidation { .. } => "Invalid input",
        FlowError::Transport { .. } => "Model unavailable (safe to retry)",
        FlowError::OutputValidation { .. } => "Invalid model reply",
    };
    CallToolResult::error(vec![Content::text(format!("{class}: {err}"))])
}

/// The match outcome plus, when the description belongs to a listed item, that item.
fn match_report(outcome: &MatchOutcome, items: &[Item]) -> serde_json::Value {
    let mut report = serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null);
    if let MatchOutcome::Matched { description, .. } = outcome {
        let item = catalog::find_by_candidate(items, description)
            .and_then(|item| serde_json::to_value(item).ok());
        if let (Some(obj), Some(item)) = (report.as_object_mut(), item) {
            obj.insert("item".into(), item);
        }
    }
    report
}

fn masked_settings(settings: &AiSettings) -> serde_json::Value {
    serde_json::json!({
        "provider": settings.provider,
        "model": settings.model,
        "timeoutSecs": settings.timeout_secs,
        "hasKey": !settings.api_key.is_empty(),
        "configured": lostfound_core::ai_configured(settings),
    })
}

/// Pair each message with its translation, if a full set was made.
fn thread_messages(thread: &[Message], translations: Option<Vec<String>>) -> Vec<ThreadMessage<'_>> {
    let mut translations = translations.map(Vec::into_iter);
    thread
        .iter()
        .map(|message| ThreadMessage {
            message,
            translated_text: translations.as_mut().and_then(Iterator::next),
        })
        .collect()
}

fn untranslated(texts: Vec<String>) -> Vec<TranslatedMessage> {
    texts
        .into_iter()
        .map(|text| TranslatedMessage {
            text,
            translated_text: None,
        })
        .collect()
}

const INSTRUCTIONS: &str = r#"lostfound is the AI helper behind a campus Lost & Found board. Items are reported as lost or found, and people chat to return them.

## Photos
Every photo parameter is a data URI: `data:<mimetype>;base64,<encoded_data>` (jpeg, png, gif or webp). Anything else is rejected before the model is called.

## Reporting an item
1. Call `generate_item_description` with the photo to draft a name and description.
2. Call `detect_item_location` with the photo and the (possibly edited) description to get location tags and category suggestions.

## Searching by image
Call `match_found_item` with a photo of a found item. Without explicit candidates it searches the board (use `status` to restrict, e.g. "Lost"). `noMatch` is a normal answer, and also what an empty candidate list gives. When the matched description belongs to a listed item, that item is included.

## Items
`list_items` shows the board, `get_item` one item with its owner, and `get_item_stats` the dashboard figures.

## Chat
`get_item_messages` returns the conversation about an item, translated when `target_language` is given. `translate_messages` translates any list of messages at once and keeps message order. Use target_language "original" to show messages untranslated.

## Errors
Error text starts with the failure class: "Invalid input" (fix the request), "Model unavailable (safe to retry)", or "Invalid model reply" (the model answered in the wrong shape)."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    // stdout carries the MCP transport; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let settings = lostfound_core::read_settings();
    log::info!(
        "[lostfound-mcp] provider {} ({}), configured: {}",
        settings.provider,
        settings.model,
        lostfound_core::ai_configured(&settings)
    );

    let service = LostFoundServer::new(settings)?
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| log::error!("[lostfound-mcp] MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
