//! Response conditioning
//!
//! Turns a condition's settings into a concrete generation call: where the
//! persona prompt goes, how many output tokens are allowed, and how long to
//! wait before the request is issued.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::inference::{ContentPart, InferenceBackend, InferenceRequest, RequestMessage, TextStream};
use crate::types::{ChatMessage, Condition, ConditionSettings, Persona, Role};

/// Rough characters-per-token ratio used to turn a length cap into a token cap.
pub const CHARS_PER_TOKEN: u32 = 4;

/// A request ready to send plus the delay to observe first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedRequest {
    pub request: InferenceRequest,
    pub pre_delay: Duration,
}

pub fn token_budget(max_response_length: u32) -> u32 {
    max_response_length / CHARS_PER_TOKEN
}

/// Fixed `responseDelay`, or `responseDelay * (0.5 + U)` with `U ~ [0, 1)`
/// when the delay is randomized.
pub fn compute_delay<R: Rng + ?Sized>(settings: &ConditionSettings, rng: &mut R) -> Duration {
    if settings.response_delay_ms == 0 {
        return Duration::ZERO;
    }
    let base = f64::from(settings.response_delay_ms);
    let ms = if settings.random_response_delay {
        base * (0.5 + rng.gen::<f64>())
    } else {
        base
    };
    Duration::from_secs_f64(ms / 1000.0)
}

/// Check that an attachment is a well-formed URL and return it normalized.
///
/// Any absolute URL is accepted, `data:` URLs included; the payload is
/// left for the model service to interpret.
pub fn parse_attachment(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| Error::invalid_attachment(raw, e.to_string()))?;
    Ok(url.to_string())
}

/// Whether any user or assistant turn has been recorded.
pub fn has_turns(history: &[ChatMessage]) -> bool {
    history
        .iter()
        .any(|m| matches!(m.role, Role::User | Role::Assistant))
}

fn user_message(text: String, attachments: &[String]) -> Result<RequestMessage> {
    if attachments.is_empty() {
        return Ok(RequestMessage::text(Role::User, text));
    }
    let mut parts = vec![ContentPart::Text { text }];
    for raw in attachments {
        parts.push(ContentPart::Image {
            url: parse_attachment(raw)?,
        });
    }
    Ok(RequestMessage::parts(Role::User, parts))
}

fn convert_history(history: &[ChatMessage]) -> Result<Vec<RequestMessage>> {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => user_message(m.content.clone(), &m.attachments),
            role => Ok(RequestMessage::text(role, m.content.clone())),
        })
        .collect()
}

/// Shape one generation call.
///
/// `history` is the transcript before this turn. Until it holds a user or
/// assistant message the persona prompt is prepended to the user's text;
/// afterwards it is sent as a leading system message.
pub fn build_request<R: Rng + ?Sized>(
    history: &[ChatMessage],
    user_text: &str,
    attachments: &[String],
    persona: &Persona,
    condition: Option<&Condition>,
    model: &str,
    rng: &mut R,
) -> Result<ConditionedRequest> {
    let prompt = persona.system_prompt.as_str();
    let first_turn = !has_turns(history);

    let text = if first_turn && !prompt.is_empty() {
        format!("{}\n\n{}", prompt, user_text)
    } else {
        user_text.to_string()
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    if !first_turn && !prompt.is_empty() {
        messages.push(RequestMessage::text(Role::System, prompt));
    }
    messages.extend(convert_history(history)?);
    messages.push(user_message(text, attachments)?);

    let (max_output_tokens, pre_delay) = match condition {
        Some(c) => (
            Some(token_budget(c.settings.max_response_length)),
            compute_delay(&c.settings, rng),
        ),
        None => (None, Duration::ZERO),
    };

    debug!(
        persona_id = %persona.id,
        condition_id = condition.map(|c| c.id.as_str()).unwrap_or("none"),
        first_turn,
        messages = messages.len(),
        max_output_tokens = ?max_output_tokens,
        pre_delay_ms = pre_delay.as_millis() as u64,
        "Request conditioned"
    );

    Ok(ConditionedRequest {
        request: InferenceRequest {
            model: model.to_string(),
            messages,
            max_output_tokens,
        },
        pre_delay,
    })
}

/// Wait out the pre-delay, then start the backend stream.
///
/// Cancelling during the delay returns `TurnCancelled` without contacting
/// the backend.
pub async fn run(
    backend: &dyn InferenceBackend,
    conditioned: ConditionedRequest,
    cancel: CancellationToken,
) -> Result<TextStream> {
    if !conditioned.pre_delay.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Turn cancelled during response delay");
                return Err(Error::TurnCancelled);
            }
            _ = tokio::time::sleep(conditioned.pre_delay) => {}
        }
    }
    if cancel.is_cancelled() {
        return Err(Error::TurnCancelled);
    }
    backend.stream(conditioned.request, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{MessageContent, MockBackend};
    use crate::types::PersonaCategory;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn persona() -> Persona {
        Persona {
            id: "anxious".into(),
            name: "Anxious".into(),
            description: String::new(),
            system_prompt: "You are an anxious client.".into(),
            category: PersonaCategory::Patient,
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn condition(delay: u32, random: bool, max_len: u32) -> Condition {
        Condition {
            id: "c".into(),
            name: "C".into(),
            description: String::new(),
            settings: ConditionSettings {
                response_delay_ms: delay,
                random_response_delay: random,
                max_response_length: max_len,
                ..Default::default()
            },
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_fixed_delay() {
        let c = condition(2000, false, 500);
        assert_eq!(compute_delay(&c.settings, &mut rng()), Duration::from_millis(2000));
        let none = condition(0, true, 500);
        assert_eq!(compute_delay(&none.settings, &mut rng()), Duration::ZERO);
    }

    #[test]
    fn test_random_delay_range() {
        let c = condition(1000, true, 500);
        let mut rng = rng();
        let samples: Vec<Duration> = (0..10_000).map(|_| compute_delay(&c.settings, &mut rng)).collect();
        for d in &samples {
            assert!(*d >= Duration::from_millis(500), "{:?}", d);
            assert!(*d < Duration::from_millis(1500), "{:?}", d);
        }
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    #[test]
    fn test_token_budget() {
        assert_eq!(token_budget(500), 125);
        assert_eq!(token_budget(50), 12);
        assert_eq!(token_budget(2000), 500);
    }

    #[test]
    fn test_first_turn_prepends_prompt() {
        let c = condition(0, false, 500);
        let out = build_request(&[], "Hello", &[], &persona(), Some(&c), "llama3", &mut rng()).unwrap();
        let messages = &out.request.messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(
            messages[0].content,
            MessageContent::Text("You are an anxious client.\n\nHello".into())
        );
        assert_eq!(out.request.max_output_tokens, Some(125));
        assert_eq!(out.pre_delay, Duration::ZERO);
    }

    #[test]
    fn test_system_only_history_is_still_first_turn() {
        let history = vec![ChatMessage::new(Role::System, "Be brief.")];
        assert!(!has_turns(&history));

        let out = build_request(&history, "Hello", &[], &persona(), None, "llama3", &mut rng()).unwrap();
        let messages = &out.request.messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content.text(), "Be brief.");
        assert_eq!(
            messages[1].content,
            MessageContent::Text("You are an anxious client.\n\nHello".into())
        );
    }

    #[test]
    fn test_later_turn_uses_system_message() {
        let history = vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi.")];
        let out = build_request(&history, "How are you?", &[], &persona(), None, "llama3", &mut rng()).unwrap();
        let messages = &out.request.messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content.text(), "You are an anxious client.");
        assert_eq!(messages[1].content.text(), "Hello");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content, MessageContent::Text("How are you?".into()));
        assert_eq!(out.request.max_output_tokens, None);
    }

    #[test]
    fn test_attachments_follow_text() {
        let attachments = vec![
            "https://example.com/scan.png".to_string(),
            "data:image/png;base64,iVBORw0KGgo=".to_string(),
        ];
        let out = build_request(&[], "see", &attachments, &persona(), None, "m", &mut rng()).unwrap();
        let content = &out.request.messages[0].content;
        match content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[0], ContentPart::Text { .. }));
                assert!(matches!(parts[1], ContentPart::Image { .. }));
            }
            other => panic!("expected parts, got {:?}", other),
        }
        assert_eq!(content.image_urls().len(), 2);
    }

    #[test]
    fn test_malformed_attachment() {
        let err = build_request(&[], "see", &["not a url".to_string()], &persona(), None, "m", &mut rng())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttachment { .. }));

        assert!(parse_attachment("no-scheme/a.png").is_err());
        assert!(parse_attachment("https://").is_err());

        assert!(parse_attachment("https://example.com/a.jpg").is_ok());
        assert!(parse_attachment("data:text/plain,hello").is_ok());
        // Unpadded and percent-encoded payloads are still well-formed URLs.
        assert!(parse_attachment("data:image/png;base64,iVBORw0KGgo").is_ok());
        assert!(parse_attachment("data:image/png;base64,iVBOR%2Bw0KGgo=").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses_before_request() {
        let backend = MockBackend::new();
        let conditioned = build_request(
            &[],
            "hi",
            &[],
            &persona(),
            Some(&condition(2000, false, 500)),
            "m",
            &mut rng(),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let stream = run(&backend, conditioned, CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(stream.collect_text().await.unwrap(), "Hello, world.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_not_called_until_delay_passes() {
        let backend = MockBackend::new();
        let conditioned = build_request(
            &[],
            "hi",
            &[],
            &persona(),
            Some(&condition(2000, false, 500)),
            "m",
            &mut rng(),
        )
        .unwrap();

        let mut pending = tokio_test::task::spawn(run(&backend, conditioned, CancellationToken::new()));
        tokio_test::assert_pending!(pending.poll());

        tokio::time::advance(Duration::from_millis(1000)).await;
        tokio_test::assert_pending!(pending.poll());
        assert_eq!(backend.call_count(), 0);

        tokio::time::advance(Duration::from_millis(1000)).await;
        let stream = tokio_test::assert_ready_ok!(pending.poll());
        assert_eq!(backend.call_count(), 1);
        assert_eq!(stream.collect_text().await.unwrap(), "Hello, world.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_skips_backend() {
        let backend = MockBackend::new();
        let conditioned = build_request(
            &[],
            "hi",
            &[],
            &persona(),
            Some(&condition(5000, false, 500)),
            "m",
            &mut rng(),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = run(&backend, conditioned, cancel).await.unwrap_err();
        assert!(matches!(err, Error::TurnCancelled));
        assert_eq!(backend.call_count(), 0);
    }
}
