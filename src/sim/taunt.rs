/// Defeat taunt: a one-line jeer fetched from a text-generation service.
///
/// The fetch runs on its own thread and reports through a channel, so
/// the battle screen keeps ticking and rendering while it waits.
/// Transient failures (HTTP 429, 5xx, transport) are retried with a
/// doubling delay; anything else falls straight back to a fixed line.

use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TauntConfig;
use crate::error::TauntError;

pub const SYSTEM_PROMPT: &str = "You are Muzan Kibutsuji, the main villain. The player has just been defeated by one of your demons. Write a very short, mocking, and cruel taunt (one sentence, max 15 words) to display on their 'Game Over' screen.";
pub const USER_PROMPT: &str = "The player has died. Mock them.";

/// Shown when the service answered but without usable text.
pub const MALFORMED_TAUNT: &str = "You are weak and pathetic.";
/// Shown when the service could not be reached at all.
pub const FALLBACK_TAUNT: &str = "You aren't even worth mocking.";

pub trait TauntClient: Send {
    fn fetch(&mut self) -> Result<String, TauntError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

/// Run `client` under `policy` and always come back with something to show.
/// `sleep` is injected so tests can observe the backoff without waiting.
pub fn fetch_taunt(
    client: &mut dyn TauntClient,
    policy: &RetryPolicy,
    sleep: &mut dyn FnMut(Duration),
) -> String {
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;

    for attempt in 1..=attempts {
        match client.fetch() {
            Ok(text) => {
                debug!(attempt, "taunt received");
                return text;
            }
            Err(TauntError::Malformed(why)) => {
                warn!(reason = %why, "taunt response malformed");
                return MALFORMED_TAUNT.to_string();
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "taunt fetch failed, retrying");
                sleep(delay);
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(e) => {
                warn!(attempt, error = %e, "taunt fetch gave up");
                return FALLBACK_TAUNT.to_string();
            }
        }
    }
    FALLBACK_TAUNT.to_string()
}

/// Pull the taunt text out of a generateContent response body.
pub fn extract_taunt(body: &serde_json::Value) -> Result<String, TauntError> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TauntError::Malformed("no candidate text".into()))?;
    let cleaned = text.replace('"', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(TauntError::Malformed("empty candidate text".into()));
    }
    Ok(cleaned.to_string())
}

// ══════════════════════════════════════════════════════════════
// Background fetch
// ══════════════════════════════════════════════════════════════

/// A taunt that is on its way. Poll once per frame.
pub struct TauntHandle {
    rx: Option<Receiver<String>>,
    text: Option<String>,
}

impl TauntHandle {
    pub fn spawn(mut client: Box<dyn TauntClient>, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("taunt".into())
            .spawn(move || {
                let text = fetch_taunt(client.as_mut(), &policy, &mut |d: Duration| thread::sleep(d));
                // Receiver may be gone if the battle screen was left already.
                let _ = tx.send(text);
            });
        match spawned {
            Ok(_) => TauntHandle { rx: Some(rx), text: None },
            Err(e) => {
                warn!(error = %e, "could not start taunt thread");
                TauntHandle::ready(FALLBACK_TAUNT)
            }
        }
    }

    pub fn ready(text: &str) -> Self {
        TauntHandle { rx: None, text: Some(text.to_string()) }
    }

    /// The taunt, once it has arrived.
    pub fn poll(&mut self) -> Option<&str> {
        if self.text.is_none() {
            if let Some(rx) = &self.rx {
                match rx.try_recv() {
                    Ok(text) => self.text = Some(text),
                    Err(mpsc::TryRecvError::Empty) => {}
                    Err(mpsc::TryRecvError::Disconnected) => {
                        self.text = Some(FALLBACK_TAUNT.to_string());
                    }
                }
            }
        }
        self.text.as_deref()
    }
}

// ══════════════════════════════════════════════════════════════
// Clients
// ══════════════════════════════════════════════════════════════

/// Stand-in when no service is configured. Always reports Disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineTaunt;

impl TauntClient for OfflineTaunt {
    fn fetch(&mut self) -> Result<String, TauntError> {
        Err(TauntError::Disabled)
    }
}

#[cfg(feature = "taunt")]
pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    agent: ureq::Agent,
}

#[cfg(feature = "taunt")]
impl GeminiClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Self {
        GeminiClient {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

#[cfg(feature = "taunt")]
impl TauntClient for GeminiClient {
    fn fetch(&mut self) -> Result<String, TauntError> {
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": USER_PROMPT }] }],
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        });
        let response = self
            .agent
            .post(&self.endpoint)
            .query("key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_json(payload);

        match response {
            Ok(resp) => {
                let body: serde_json::Value = resp
                    .into_json()
                    .map_err(|e| TauntError::Malformed(e.to_string()))?;
                extract_taunt(&body)
            }
            Err(ureq::Error::Status(code, _)) => Err(TauntError::Status { code }),
            Err(ureq::Error::Transport(t)) => Err(TauntError::Transport(t.to_string())),
        }
    }
}

/// Build the client the config asks for, or the offline one.
pub fn client_from_config(cfg: &TauntConfig) -> Box<dyn TauntClient> {
    if !cfg.enabled {
        return Box::new(OfflineTaunt);
    }
    let api_key = cfg
        .api_key
        .clone()
        .or_else(|| std::env::var(&cfg.api_key_env).ok())
        .filter(|k| !k.trim().is_empty());
    let Some(api_key) = api_key else {
        info!(env = %cfg.api_key_env, "no taunt API key, using offline taunts");
        return Box::new(OfflineTaunt);
    };
    online_client(cfg, &api_key)
}

#[cfg(feature = "taunt")]
fn online_client(cfg: &TauntConfig, api_key: &str) -> Box<dyn TauntClient> {
    Box::new(GeminiClient::new(&cfg.endpoint, api_key, cfg.timeout))
}

#[cfg(not(feature = "taunt"))]
fn online_client(_cfg: &TauntConfig, _api_key: &str) -> Box<dyn TauntClient> {
    info!("built without the taunt feature, using offline taunts");
    Box::new(OfflineTaunt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed script of responses and counts calls.
    struct Scripted {
        script: VecDeque<Result<String, TauntError>>,
        calls: u32,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, TauntError>>) -> Self {
            Scripted { script: script.into(), calls: 0 }
        }
    }

    impl TauntClient for Scripted {
        fn fetch(&mut self) -> Result<String, TauntError> {
            self.calls += 1;
            self.script.pop_front().unwrap_or(Err(TauntError::Status { code: 500 }))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        }
    }

    fn run(client: &mut Scripted) -> (String, Vec<Duration>) {
        let mut slept = vec![];
        let text = fetch_taunt(client, &policy(), &mut |d: Duration| slept.push(d));
        (text, slept)
    }

    #[test]
    fn success_on_first_try_does_not_sleep() {
        let mut c = Scripted::new(vec![Ok("Pitiful.".into())]);
        let (text, slept) = run(&mut c);
        assert_eq!(text, "Pitiful.");
        assert!(slept.is_empty());
        assert_eq!(c.calls, 1);
    }

    #[test]
    fn transient_errors_back_off_then_succeed() {
        let mut c = Scripted::new(vec![
            Err(TauntError::Status { code: 429 }),
            Err(TauntError::Transport("timed out".into())),
            Ok("Crawl back to your master.".into()),
        ]);
        let (text, slept) = run(&mut c);
        assert_eq!(text, "Crawl back to your master.");
        assert_eq!(slept, vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(c.calls, 3);
    }

    #[test]
    fn retries_stop_at_the_attempt_limit() {
        let mut c = Scripted::new(vec![]);
        let (text, slept) = run(&mut c);
        assert_eq!(text, FALLBACK_TAUNT);
        assert_eq!(c.calls, 4);
        // Doubling, capped at max_delay
        assert_eq!(slept, vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(250),
        ]);
    }

    #[test]
    fn client_errors_fail_fast() {
        let mut c = Scripted::new(vec![Err(TauntError::Status { code: 400 })]);
        let (text, slept) = run(&mut c);
        assert_eq!(text, FALLBACK_TAUNT);
        assert!(slept.is_empty());
        assert_eq!(c.calls, 1);
    }

    #[test]
    fn malformed_payload_uses_its_own_fallback() {
        let mut c = Scripted::new(vec![Err(TauntError::Malformed("no candidates".into()))]);
        let (text, _) = run(&mut c);
        assert_eq!(text, MALFORMED_TAUNT);
        assert_eq!(c.calls, 1);
    }

    #[test]
    fn offline_client_falls_back() {
        let mut slept = vec![];
        let text = fetch_taunt(&mut OfflineTaunt, &policy(), &mut |d: Duration| slept.push(d));
        assert_eq!(text, FALLBACK_TAUNT);
        assert!(slept.is_empty());
    }

    #[test]
    fn extract_strips_quotes() {
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "\"You bleed like the rest.\"\n" }] } }]
        });
        assert_eq!(extract_taunt(&body).unwrap(), "You bleed like the rest.");
    }

    #[test]
    fn extract_rejects_missing_or_empty_text() {
        let empty = serde_json::json!({ "candidates": [] });
        assert!(matches!(extract_taunt(&empty), Err(TauntError::Malformed(_))));
        let blank = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "\"\"" }] } }]
        });
        assert!(matches!(extract_taunt(&blank), Err(TauntError::Malformed(_))));
    }

    #[test]
    fn handle_delivers_through_channel() {
        let client = Scripted::new(vec![Ok("Kneel.".into())]);
        let mut handle = TauntHandle::spawn(Box::new(client), policy());
        let mut got = None;
        for _ in 0..200 {
            if let Some(t) = handle.poll() {
                got = Some(t.to_string());
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got.as_deref(), Some("Kneel."));
    }

    #[test]
    fn disabled_config_gives_offline_client() {
        let cfg = TauntConfig { enabled: false, ..TauntConfig::default() };
        let mut client = client_from_config(&cfg);
        assert_eq!(client.fetch(), Err(TauntError::Disabled));
    }
}
