use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::retry::{RetryState, Sleeper, StatusClass, TokioSleeper};
use super::transport::{HttpTransport, Transport, TransportResponse};
use crate::{
    config::GeminiConfig,
    error::{AdGenError, Result},
    models::{
        gemini::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse},
        ErrorKind, GenerationRequest, GenerationResult, ImagePayload, SceneFormat,
    },
};

pub const NO_IMAGE_MESSAGE: &str =
    "No image data found in the API response. The model may have refused the request.";
pub const CANCELLED_MESSAGE: &str = "Generation was cancelled.";
const DEFAULT_OUTPUT_MIME: &str = "image/png";

/// Sends one product photo + scene to Gemini and reports a single outcome.
///
/// Rate limits (429) and server errors (5xx) are retried with exponential
/// backoff; every other failure is reported once. No error ever escapes
/// `submit`: callers only see a [`GenerationResult`].
#[derive(Clone)]
pub struct AdRequestClient {
    config: GeminiConfig,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl AdRequestClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    pub fn with_transport(
        config: GeminiConfig,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            transport,
            sleeper,
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub async fn generate_ad(&self, image: ImagePayload, scene: &SceneFormat) -> GenerationResult {
        self.submit(GenerationRequest::new(image, scene)).await
    }

    pub async fn submit(&self, request: GenerationRequest) -> GenerationResult {
        self.submit_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Like [`submit`](Self::submit), but gives up as soon as `cancel` fires,
    /// dropping any in-flight request or pending backoff.
    pub async fn submit_with_cancellation(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();

        if let Err(e) = self.validate(&request) {
            log::warn!("[req:{}] Rejected generation request: {}", request_id, e);
            return e.into();
        }

        let started = Instant::now();
        log::info!(
            "[req:{}] Generating ad for scene '{}' with model {}",
            request_id,
            request.scene_id.as_deref().unwrap_or("custom"),
            self.config.model
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("[req:{}] Generation cancelled", request_id);
                GenerationResult::failure(ErrorKind::Cancelled, CANCELLED_MESSAGE)
            }
            outcome = self.run(&request, &request_id) => match outcome {
                Ok(result) => result,
                Err(e) => {
                    log::error!("[req:{}] Generation failed: {}", request_id, e);
                    e.into()
                }
            },
        };

        match &result {
            GenerationResult::Success {
                image_bytes,
                mime_type,
            } => log::info!(
                "[req:{}] Generated {} ({} bytes) in {}ms",
                request_id,
                mime_type,
                image_bytes.len(),
                started.elapsed().as_millis()
            ),
            GenerationResult::Failure { reason, kind } => log::warn!(
                "[req:{}] Generation ended with {}: {}",
                request_id,
                kind,
                reason
            ),
        }

        result
    }

    fn validate(&self, request: &GenerationRequest) -> Result<()> {
        if request.image.is_empty() {
            return Err(AdGenError::InvalidInput(
                "Please upload a product image first.".into(),
            ));
        }
        if request.instruction_text.trim().is_empty() {
            return Err(AdGenError::InvalidInput(
                "Please select an ad format first.".into(),
            ));
        }
        if request.image.len() > self.config.max_image_bytes {
            return Err(AdGenError::InvalidInput(format!(
                "The image is too large ({} bytes, limit {} bytes).",
                request.image.len(),
                self.config.max_image_bytes
            )));
        }
        Ok(())
    }

    async fn run(&self, request: &GenerationRequest, request_id: &str) -> Result<GenerationResult> {
        let body = serde_json::to_value(GenerateContentRequest::from(request))
            .map_err(|e| AdGenError::SerializationError(e.to_string()))?;
        let url = self.config.endpoint_url();

        let response = self.send_with_retry(&url, &body, request_id).await?;
        self.decode(response, request_id)
    }

    async fn send_with_retry(
        &self,
        url: &str,
        body: &Value,
        request_id: &str,
    ) -> Result<TransportResponse> {
        let mut state = RetryState::new(&self.config.retry);
        let mut attempt = 0;
        let mut last_response = None;

        while state.begin_attempt() {
            attempt += 1;
            log::debug!(
                "[req:{}] Attempt {}/{} to {}",
                request_id,
                attempt,
                self.config.retry.max_attempts.max(1),
                url
            );

            let response = self.transport.post_json(url, body).await?;
            match StatusClass::of(response.status) {
                StatusClass::Ok => return Ok(response),
                StatusClass::Fatal => {
                    log::debug!(
                        "[req:{}] Status {} is not retryable",
                        request_id,
                        response.status
                    );
                    return Ok(response);
                }
                StatusClass::Transient => {
                    if let Some(delay) = state.next_delay() {
                        log::warn!(
                            "[req:{}] Status {} on attempt {}, retrying in {}ms",
                            request_id,
                            response.status,
                            attempt,
                            delay.as_millis()
                        );
                        self.sleeper.sleep(delay).await;
                    } else {
                        log::warn!(
                            "[req:{}] Status {} on final attempt {}, giving up",
                            request_id,
                            response.status,
                            attempt
                        );
                    }
                    last_response = Some(response);
                }
            }
        }

        last_response.ok_or_else(|| AdGenError::RequestError("No request attempt was made".into()))
    }

    fn decode(&self, response: TransportResponse, request_id: &str) -> Result<GenerationResult> {
        if !response.is_ok() {
            let reason = ErrorEnvelope::message_from(&response.body).unwrap_or_else(|| {
                format!("API request failed with status {}", response.status)
            });
            log::error!(
                "[req:{}] Gemini API error ({}): {}",
                request_id,
                response.status,
                reason
            );
            return Ok(GenerationResult::failure(ErrorKind::ApiError, reason));
        }

        // Any JSON that is not an object carries no candidates.
        let body: Value = serde_json::from_slice(&response.body)?;
        let parsed = if body.is_object() {
            serde_json::from_value::<GenerateContentResponse>(body)?
        } else {
            GenerateContentResponse::default()
        };

        if let Some(image) = parsed.first_image() {
            let image_bytes = STANDARD.decode(image.data.trim()).map_err(|e| {
                AdGenError::ResponseError(format!("Invalid base64 image data: {}", e))
            })?;
            let mime_type = image
                .mime_type
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_OUTPUT_MIME)
                .to_string();
            return Ok(GenerationResult::Success {
                image_bytes,
                mime_type,
            });
        }

        let reason = parsed.first_text().unwrap_or(NO_IMAGE_MESSAGE);
        log::debug!("[req:{}] Response carried no image part", request_id);
        Ok(GenerationResult::failure(ErrorKind::ModelRefusal, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::{find_scene, ImageMimeType};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses in order and records what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, url: &str, body: &Value) -> Result<TransportResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AdGenError::RequestError("no scripted response".into())))
        }
    }

    /// Never resolves; stands in for a hung connection.
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn post_json(&self, _url: &str, _body: &Value) -> Result<TransportResponse> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    struct ForeverSleeper;

    #[async_trait]
    impl Sleeper for ForeverSleeper {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await
        }
    }

    fn config() -> GeminiConfig {
        GeminiConfig::new()
            .with_base_url("http://gemini.test/v1beta")
            .with_model("gemini-test")
            .with_api_key("test-key")
    }

    fn client(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> AdRequestClient {
        AdRequestClient::with_transport(config(), transport, sleeper)
    }

    fn request() -> GenerationRequest {
        let image = ImagePayload::new("image/png", vec![0x89, b'P', b'N', b'G']).unwrap();
        GenerationRequest::new(image, find_scene("billboard").unwrap())
    }

    fn ok(status: u16, body: Value) -> Result<TransportResponse> {
        Ok(TransportResponse::new(status, body.to_string()))
    }

    fn image_body(mime_type: &str, data: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is your advertisement." },
                    { "inlineData": { "mimeType": mime_type, "data": data } }
                ]}
            }]
        })
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let transport = ScriptedTransport::new(vec![ok(200, image_body("image/png", "AQID"))]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        let result = client.submit(request()).await;

        assert_eq!(
            result,
            GenerationResult::Success {
                image_bytes: vec![1, 2, 3],
                mime_type: "image/png".into()
            }
        );
        assert_eq!(transport.call_count(), 1);
        assert!(sleeper.delays().is_empty());

        let calls = transport.calls.lock().unwrap();
        let (url, body) = &calls[0];
        assert_eq!(url, "http://gemini.test/v1beta/models/gemini-test:generateContent");
        assert_eq!(
            body["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "iVBORw==");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[tokio::test]
    async fn test_retries_server_errors_with_doubling_delay() {
        let transport = ScriptedTransport::new(vec![
            ok(503, json!({ "error": { "message": "overloaded" } })),
            ok(503, json!({ "error": { "message": "overloaded" } })),
            ok(200, image_body("image/png", "AQID")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        let result = client.submit(request()).await;

        assert!(result.is_success());
        assert_eq!(transport.call_count(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let transport = ScriptedTransport::new(vec![
            ok(429, json!({ "error": { "message": "Resource has been exhausted" } })),
            ok(200, image_body("image/png", "AQID")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        assert!(client.submit(request()).await.is_success());
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error_message() {
        let transport = ScriptedTransport::new(vec![
            ok(500, json!({ "error": { "message": "first" } })),
            ok(500, json!({ "error": { "message": "second" } })),
            ok(500, json!({ "error": { "message": "Internal error encountered." } })),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        let result = client.submit(request()).await;

        assert_eq!(
            result,
            GenerationResult::Failure {
                reason: "Internal error encountered.".into(),
                kind: ErrorKind::ApiError
            }
        );
        assert_eq!(transport.call_count(), 3);
        // No wait after the final attempt.
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_without_message_use_status() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse::new(502, "<html>Bad Gateway</html>")),
            Ok(TransportResponse::new(502, "")),
            ok(502, json!({})),
        ]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::ApiError));
        assert_eq!(result.reason(), Some("API request failed with status 502"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            ok(400, json!({ "error": { "message": "API key not valid. Please pass a valid API key." } })),
            ok(200, image_body("image/png", "AQID")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::ApiError));
        assert_eq!(
            result.reason(),
            Some("API key not valid. Please pass a valid API key.")
        );
        assert_eq!(transport.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_text_only_response_is_a_refusal() {
        let transport = ScriptedTransport::new(vec![ok(
            200,
            json!({ "candidates": [{ "content": { "parts": [
                { "text": "I can't help with that request." }
            ]}}]}),
        )]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        let result = client.submit(request()).await;

        assert_eq!(
            result,
            GenerationResult::Failure {
                reason: "I can't help with that request.".into(),
                kind: ErrorKind::ModelRefusal
            }
        );
    }

    #[tokio::test]
    async fn test_empty_response_uses_default_refusal_message() {
        let transport = ScriptedTransport::new(vec![ok(
            200,
            json!({ "candidates": [{ "finishReason": "PROHIBITED_CONTENT" }] }),
        )]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::ModelRefusal));
        assert_eq!(result.reason(), Some(NO_IMAGE_MESSAGE));
    }

    #[tokio::test]
    async fn test_declared_mime_type_is_preserved() {
        let transport = ScriptedTransport::new(vec![
            ok(200, image_body("image/jpeg", "/9j/")),
            ok(
                200,
                json!({ "candidates": [{ "content": { "parts": [
                    { "inlineData": { "data": "AQID" } }
                ]}}]}),
            ),
        ]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        match client.submit(request()).await {
            GenerationResult::Success {
                image_bytes,
                mime_type,
            } => {
                assert_eq!(mime_type, "image/jpeg");
                assert_eq!(image_bytes, vec![0xFF, 0xD8, 0xFF]);
            }
            other => panic!("expected success, got {:?}", other),
        }

        match client.submit(request()).await {
            GenerationResult::Success { mime_type, .. } => assert_eq!(mime_type, "image/png"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_the_network() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone(), Arc::new(RecordingSleeper::default()));

        let empty_image = GenerationRequest {
            image: ImagePayload {
                mime_type: ImageMimeType::Png,
                bytes: Vec::new(),
            },
            ..request()
        };
        let no_scene = GenerationRequest {
            instruction_text: "   ".into(),
            scene_id: None,
            ..request()
        };

        for bad in [empty_image, no_scene] {
            let result = client.submit(bad).await;
            assert_eq!(result.kind(), Some(ErrorKind::InvalidInput));
            assert!(!result.reason().unwrap().is_empty());
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let client = AdRequestClient::with_transport(
            config().with_max_image_bytes(3),
            transport.clone(),
            Arc::new(RecordingSleeper::default()),
        );

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::InvalidInput));
        assert!(result.reason().unwrap().contains("too large"));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(AdGenError::RequestError("connection refused".into())),
            ok(200, image_body("image/png", "AQID")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(transport.clone(), sleeper.clone());

        let result = client.submit(request()).await;

        assert_eq!(
            result,
            GenerationResult::Failure {
                reason: "An error occurred: Request error: connection refused".into(),
                kind: ErrorKind::TransportError
            }
        );
        assert_eq!(transport.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_a_transport_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse::new(200, "{\"candidates\": [")),
        ]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::TransportError));
        assert!(result.reason().unwrap().starts_with("An error occurred: "));
    }

    #[tokio::test]
    async fn test_non_object_success_body_is_a_refusal() {
        for body in ["null", "[]", "\"done\""] {
            let transport = ScriptedTransport::new(vec![Ok(TransportResponse::new(200, body))]);
            let client = client(transport, Arc::new(RecordingSleeper::default()));

            let result = client.submit(request()).await;

            assert_eq!(result.kind(), Some(ErrorKind::ModelRefusal), "body {}", body);
            assert_eq!(result.reason(), Some(NO_IMAGE_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_bad_base64_is_a_transport_error() {
        let transport = ScriptedTransport::new(vec![ok(200, image_body("image/png", "!!!"))]);
        let client = client(transport, Arc::new(RecordingSleeper::default()));

        let result = client.submit(request()).await;

        assert_eq!(result.kind(), Some(ErrorKind::TransportError));
        assert!(result.reason().unwrap().contains("Invalid base64 image data"));
    }

    #[tokio::test]
    async fn test_cancel_before_submit() {
        let transport = ScriptedTransport::new(vec![ok(200, image_body("image/png", "AQID"))]);
        let client = client(transport.clone(), Arc::new(RecordingSleeper::default()));
        let token = CancellationToken::new();
        token.cancel();

        let result = client.submit_with_cancellation(request(), &token).await;

        assert_eq!(result.kind(), Some(ErrorKind::Cancelled));
        assert_eq!(result.reason(), Some(CANCELLED_MESSAGE));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_hung_request() {
        let client = client(Arc::new(HangingTransport), Arc::new(RecordingSleeper::default()));
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let result = client.submit_with_cancellation(request(), &token).await;

        assert_eq!(result.kind(), Some(ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_skips_pending_backoff() {
        let transport = ScriptedTransport::new(vec![ok(503, json!({}))]);
        let client = client(transport.clone(), Arc::new(ForeverSleeper));
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let result = client.submit_with_cancellation(request(), &token).await;

        assert_eq!(result.kind(), Some(ErrorKind::Cancelled));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_ad_builds_instruction_from_scene() {
        let transport = ScriptedTransport::new(vec![ok(200, image_body("image/png", "AQID"))]);
        let client = client(transport.clone(), Arc::new(RecordingSleeper::default()));
        let scene = find_scene("airplane_ad").unwrap();
        let image = ImagePayload::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]).unwrap();

        assert!(client.generate_ad(image, scene).await.is_success());

        let calls = transport.calls.lock().unwrap();
        let text = calls[0].1["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.ends_with("Context: An ad on the back of a seat on a commercial airplane."));
        assert_eq!(
            calls[0].1["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
    }

    #[tokio::test]
    async fn test_single_attempt_policy_does_not_retry() {
        let transport = ScriptedTransport::new(vec![
            ok(503, json!({ "error": { "message": "The model is overloaded." } })),
            ok(200, image_body("image/png", "AQID")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = AdRequestClient::with_transport(
            config().with_retry(RetryPolicy::new().with_max_attempts(1)),
            transport.clone(),
            sleeper.clone(),
        );

        let result = client.submit(request()).await;

        assert_eq!(result.reason(), Some("The model is overloaded."));
        assert_eq!(transport.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_new_requires_valid_config_and_key() {
        assert!(matches!(
            AdRequestClient::new(GeminiConfig::new()),
            Err(AdGenError::ConfigError(_))
        ));
        assert!(AdRequestClient::new(config().with_model("")).is_err());
        assert!(AdRequestClient::new(config()).is_ok());
    }
}
