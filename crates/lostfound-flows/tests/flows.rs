use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lostfound_core::{DataUri, DataUriError, Violation};
use lostfound_flows::flows::{
    DETECT_ITEM_LOCATION, GENERATE_ITEM_DESCRIPTION, IMAGE_MATCHING, TRANSLATE_TEXT,
};
use lostfound_flows::{
    ContentPart, DescribeItemInput, DetectLocationInput, FlowError, FlowRunner, ItemDescription,
    MatchInput, MatchOutcome, ModelClient, ModelRequest, ModelResponse, OutputError, Outcome,
    Registry, TimeoutClient, TransportError, TranslateInput,
};
use serde_json::json;

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

/// Replies per flow; a reply of `Err` simulates a transport failure.
#[derive(Default)]
struct ScriptedClient {
    replies: HashMap<String, Result<String, TransportError>>,
    delays: HashMap<String, Duration>,
    seen: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    fn reply(mut self, flow: &str, text: &str) -> Self {
        self.replies.insert(flow.to_string(), Ok(text.to_string()));
        self
    }

    fn fail(mut self, flow: &str, err: TransportError) -> Self {
        self.replies.insert(flow.to_string(), Err(err));
        self
    }

    fn delay(mut self, flow: &str, millis: u64) -> Self {
        self.delays.insert(flow.to_string(), Duration::from_millis(millis));
        self
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delays.get(&request.flow) {
            tokio::time::sleep(*delay).await;
        }
        match self.replies.get(&request.flow) {
            Some(Ok(text)) => Ok(ModelResponse { text: text.clone() }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TransportError::Request(format!("no reply scripted for {}", request.flow))),
        }
    }
}

/// Echoes the text to translate back, upper-cased, after a delay that shrinks
/// with each call so later requests finish first.
struct EchoTranslator {
    calls: Mutex<u64>,
}

#[async_trait]
impl ModelClient for EchoTranslator {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        let delay = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            40u64.saturating_sub(*calls * 10)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let ContentPart::Text(prompt) = &request.parts[0] else {
            return Err(TransportError::Empty);
        };
        let message = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Message: "))
            .unwrap_or_default();
        Ok(ModelResponse {
            text: json!({ "translatedText": message.to_uppercase() }).to_string(),
        })
    }
}

fn runner(client: ScriptedClient) -> (FlowRunner<Arc<ScriptedClient>>, Arc<ScriptedClient>) {
    let client = Arc::new(client);
    let registry = Arc::new(Registry::standard().unwrap());
    (FlowRunner::new(registry, client.clone()), client)
}

fn candidates() -> Vec<String> {
    vec![
        "Blue Student ID Card: A student ID for RGUKT with the name 'Test User'.".to_string(),
        "Classic Ray-Ban Sunglasses: A pair of black Ray-Ban Wayfarer sunglasses.".to_string(),
    ]
}

#[tokio::test]
async fn translation_passes_reply_through() {
    let (runner, client) = runner(ScriptedClient::default().reply(TRANSLATE_TEXT, r#"{"translatedText": "Hola"}"#));
    let out = runner
        .translate_text(&TranslateInput {
            text: "Hello".into(),
            target_language: "Spanish".into(),
        })
        .await
        .unwrap();
    assert_eq!(out.translated_text, "Hola");

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let ContentPart::Text(prompt) = &requests[0].parts[0] else {
        panic!("expected a text part");
    };
    assert!(prompt.contains("into Spanish."));
    assert!(prompt.contains("Message: Hello\n"));
    assert_eq!(requests[0].output_schema["required"], json!(["translatedText"]));
    assert!(requests[0].system.contains("translatedText"));
}

#[tokio::test]
async fn detection_accepts_empty_required_list() {
    let (runner, _) = runner(ScriptedClient::default().reply(
        DETECT_ITEM_LOCATION,
        r#"{"locationTags": [], "suggestedOptions": ["lost"]}"#,
    ));
    let tags = runner
        .detect_item_location(&DetectLocationInput {
            photo_data_uri: PNG.into(),
            description: "Black umbrella left at the bus stop".into(),
        })
        .await
        .unwrap();
    assert!(tags.location_tags.is_empty());
    assert_eq!(tags.suggested_options, ["lost"]);
}

#[tokio::test]
async fn detection_prompt_orders_text_and_media() {
    let (runner, client) = runner(ScriptedClient::default().reply(
        DETECT_ITEM_LOCATION,
        r#"{"locationTags": ["library"], "suggestedOptions": []}"#,
    ));
    runner
        .detect_item_location(&DetectLocationInput {
            photo_data_uri: PNG.into(),
            description: "Found on the 2nd floor".into(),
        })
        .await
        .unwrap();

    let parts = &client.requests()[0].parts;
    assert_eq!(parts.len(), 3);
    assert!(matches!(&parts[0], ContentPart::Text(t) if t.contains("Description: Found on the 2nd floor")));
    assert_eq!(parts[1], ContentPart::Media(DataUri::parse(PNG).unwrap()));
    assert!(matches!(&parts[2], ContentPart::Text(_)));
}

#[tokio::test]
async fn malformed_image_never_reaches_the_model() {
    let (runner, client) = runner(ScriptedClient::default());
    let err = runner
        .generate_item_description(&DescribeItemInput {
            photo_data_uri: "https://example.com/umbrella.png".into(),
        })
        .await
        .unwrap_err();

    let FlowError::InputValidation { flow, source } = &err else {
        panic!("expected input validation error, got {err:?}");
    };
    assert_eq!(flow, "generateItemDescription");
    assert_eq!(source.violations[0].field(), Some("photoDataUri"));
    assert!(!err.is_recoverable());
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn unsupported_image_type_is_an_input_error() {
    let (runner, client) = runner(ScriptedClient::default());
    let err = runner
        .generate_item_description(&DescribeItemInput {
            photo_data_uri: "data:image/bmp;base64,Qk0=".into(),
        })
        .await
        .unwrap_err();

    let FlowError::InputValidation { source, .. } = &err else {
        panic!("expected input validation error, got {err:?}");
    };
    assert_eq!(
        source.violations,
        vec![Violation::MalformedDataUri {
            field: "photoDataUri".into(),
            source: DataUriError::UnsupportedImage("image/bmp".into()),
        }]
    );
    assert!(!err.is_recoverable());
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn describes_item_from_photo() {
    let (runner, client) = runner(ScriptedClient::default().reply(
        GENERATE_ITEM_DESCRIPTION,
        r#"{"name": "Red Umbrella", "description": "Large bright red umbrella with a wooden handle."}"#,
    ));
    let out = runner
        .generate_item_description(&DescribeItemInput {
            photo_data_uri: PNG.into(),
        })
        .await
        .unwrap();
    assert_eq!(
        out,
        ItemDescription {
            name: "Red Umbrella".into(),
            description: "Large bright red umbrella with a wooden handle.".into(),
        }
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].flow, GENERATE_ITEM_DESCRIPTION);
    assert!(requests[0]
        .parts
        .contains(&ContentPart::Media(DataUri::parse(PNG).unwrap())));
}

#[tokio::test]
async fn slow_model_times_out_as_recoverable_transport_error() {
    let client = ScriptedClient::default()
        .reply(TRANSLATE_TEXT, r#"{"translatedText": "Hola"}"#)
        .delay(TRANSLATE_TEXT, 500);
    let limit = Duration::from_millis(20);
    let registry = Arc::new(Registry::standard().unwrap());
    let runner = FlowRunner::new(registry, TimeoutClient::new(client, limit));

    let err = runner
        .translate_text(&TranslateInput {
            text: "Hello".into(),
            target_language: "Spanish".into(),
        })
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        FlowError::Transport { source: TransportError::Timeout(d), .. } if d == limit
    ));
}

#[tokio::test]
async fn fast_model_is_not_cut_off() {
    let client = ScriptedClient::default().reply(TRANSLATE_TEXT, r#"{"translatedText": "Hola"}"#);
    let registry = Arc::new(Registry::standard().unwrap());
    let runner = FlowRunner::new(registry, TimeoutClient::new(client, Duration::from_secs(5)));
    let out = runner
        .translate_text(&TranslateInput {
            text: "Hello".into(),
            target_language: "Spanish".into(),
        })
        .await
        .unwrap();
    assert_eq!(out.translated_text, "Hola");
}

#[tokio::test]
async fn no_match_field_admits_null_in_request_schema() {
    let (runner, client) = runner(
        ScriptedClient::default().reply(IMAGE_MATCHING, r#"{"matchingItemDescription": null}"#),
    );
    runner
        .match_lost_item(&MatchInput {
            photo_data_uri: PNG.into(),
            lost_item_descriptions: candidates(),
        })
        .await
        .unwrap();
    let schema = &client.requests()[0].output_schema;
    assert_eq!(
        schema["properties"]["matchingItemDescription"]["type"],
        json!(["string", "null"])
    );
}

#[tokio::test]
async fn missing_input_fields_are_all_reported() {
    let (runner, client) = runner(ScriptedClient::default());
    let err = runner.run(DETECT_ITEM_LOCATION, &json!({})).await.unwrap_err();
    let FlowError::InputValidation { source, .. } = err else {
        panic!("expected input validation error");
    };
    assert_eq!(
        source.violations,
        vec![
            Violation::Missing {
                field: "photoDataUri".into()
            },
            Violation::Missing {
                field: "description".into()
            },
        ]
    );
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn no_match_sentinel_is_a_result() {
    let (runner, client) = runner(
        ScriptedClient::default().reply(IMAGE_MATCHING, r#"{"matchingItemDescription": null}"#),
    );
    let outcome = runner
        .match_lost_item(&MatchInput {
            photo_data_uri: PNG.into(),
            lost_item_descriptions: candidates(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, MatchOutcome::NoMatch);

    let ContentPart::Text(prompt) = &client.requests()[0].parts[0] else {
        panic!("expected a text part");
    };
    let first = prompt.find("- Blue Student ID Card").unwrap();
    let second = prompt.find("- Classic Ray-Ban Sunglasses").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn match_reports_candidate_index() {
    let reply = json!({ "matchingItemDescription": candidates()[1] }).to_string();
    let (runner, _) = runner(ScriptedClient::default().reply(IMAGE_MATCHING, &reply));
    let outcome = runner
        .match_lost_item(&MatchInput {
            photo_data_uri: PNG.into(),
            lost_item_descriptions: candidates(),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        MatchOutcome::Matched {
            description: candidates()[1].clone(),
            candidate_index: Some(1),
        }
    );
}

#[tokio::test]
async fn paraphrased_match_has_no_index() {
    let (runner, _) = runner(ScriptedClient::default().reply(
        IMAGE_MATCHING,
        r#"{"matchingItemDescription": "Some sunglasses"}"#,
    ));
    let outcome = runner
        .match_lost_item(&MatchInput {
            photo_data_uri: PNG.into(),
            lost_item_descriptions: candidates(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, MatchOutcome::Matched { candidate_index: None, .. }));
}

#[tokio::test]
async fn missing_match_field_is_validation_error_not_no_match() {
    let (runner, _) = runner(ScriptedClient::default().reply(IMAGE_MATCHING, r#"{"match": "none"}"#));
    let err = runner
        .match_lost_item(&MatchInput {
            photo_data_uri: PNG.into(),
            lost_item_descriptions: candidates(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::OutputValidation {
            source: OutputError::Shape(_),
            ..
        }
    ));
}

#[tokio::test]
async fn missing_output_field_is_not_defaulted() {
    let (runner, _) = runner(ScriptedClient::default().reply(
        GENERATE_ITEM_DESCRIPTION,
        r#"{"name": "Red Umbrella"}"#,
    ));
    let err = runner
        .generate_item_description(&DescribeItemInput {
            photo_data_uri: PNG.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::OutputValidation { .. }));
    assert!(err.to_string().contains("field 'description' is required"));
}

#[tokio::test]
async fn empty_reply_for_required_flow_is_not_no_match() {
    let (runner, _) = runner(
        ScriptedClient::default().reply(TRANSLATE_TEXT, r#"{"translatedText": null}"#),
    );
    let outcome = runner
        .run(TRANSLATE_TEXT, &json!({ "text": "Hi", "targetLanguage": "French" }))
        .await;
    assert!(matches!(outcome, Err(FlowError::OutputValidation { .. })));
}

#[tokio::test]
async fn transport_failure_is_recoverable() {
    let (runner, _) = runner(
        ScriptedClient::default().fail(TRANSLATE_TEXT, TransportError::Request("429 quota".into())),
    );
    let err = runner
        .translate_text(&TranslateInput {
            text: "Hello".into(),
            target_language: "Spanish".into(),
        })
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(err.flow(), TRANSLATE_TEXT);
    assert!(matches!(err, FlowError::Transport { .. }));
}

#[tokio::test]
async fn unknown_flow() {
    let (runner, _) = runner(ScriptedClient::default());
    let err = runner.run("summarize", &json!({})).await.unwrap_err();
    assert!(matches!(err, FlowError::UnknownFlow(name) if name == "summarize"));
}

#[tokio::test]
async fn generic_run_returns_payload() {
    let (runner, _) = runner(ScriptedClient::default().reply(
        "generateItemDescription",
        "```json\n{\"name\": \"Leather Wallet\", \"description\": \"Brown bifold\"}\n```",
    ));
    let outcome = runner
        .run("generateItemDescription", &json!({ "photoDataUri": PNG }))
        .await
        .unwrap();
    let Outcome::Output(payload) = outcome else {
        panic!("expected output");
    };
    assert_eq!(payload.text("name"), Some("Leather Wallet"));
}

#[tokio::test]
async fn interleaved_flows_match_sequential_results() {
    let script = || {
        ScriptedClient::default()
            .reply(TRANSLATE_TEXT, r#"{"translatedText": "Hola"}"#)
            .reply(DETECT_ITEM_LOCATION, r#"{"locationTags": ["bus"], "suggestedOptions": ["found"]}"#)
            .delay(TRANSLATE_TEXT, 30)
            .delay(DETECT_ITEM_LOCATION, 5)
    };
    let translate = TranslateInput {
        text: "Hello".into(),
        target_language: "Spanish".into(),
    };
    let detect = DetectLocationInput {
        photo_data_uri: PNG.into(),
        description: "On the 5th Ave bus".into(),
    };

    let (sequential, _) = runner(script());
    let seq_translation = sequential.translate_text(&translate).await.unwrap();
    let seq_tags = sequential.detect_item_location(&detect).await.unwrap();

    let (concurrent, _) = runner(script());
    let (translation, tags) = tokio::join!(
        concurrent.translate_text(&translate),
        concurrent.detect_item_location(&detect),
    );
    assert_eq!(translation.unwrap(), seq_translation);
    assert_eq!(tags.unwrap(), seq_tags);
}

#[tokio::test]
async fn batch_translation_keeps_order() {
    let registry = Arc::new(Registry::standard().unwrap());
    let runner = FlowRunner::new(registry, EchoTranslator { calls: Mutex::new(0) });
    let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    let out = runner.translate_all(&texts, "Shouting").await.unwrap();
    let got: Vec<&str> = out.iter().map(|t| t.translated_text.as_str()).collect();
    assert_eq!(got, ["ONE", "TWO", "THREE"]);
}

#[tokio::test]
async fn batch_translation_fails_as_a_whole() {
    let (runner, _) = runner(
        ScriptedClient::default().fail(TRANSLATE_TEXT, TransportError::Timeout(Duration::from_secs(1))),
    );
    let texts = vec!["one".to_string(), "two".to_string()];
    assert!(runner.translate_all(&texts, "Spanish").await.is_err());
}
