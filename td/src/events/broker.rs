//! Prompt broker (§4.10, §6.5): resolves the `ask_user` tool's cooperative
//! suspension across the transport boundary. Each prompt gets a
//! freshly-minted `prompt_id`, published as `DragonEvent::Prompt` on the
//! session's event channel; the transport resolves it later by calling
//! [`PromptBroker::resolve`] with that same id and an answer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::generate_id;
use crate::tools::UserPrompter;

use super::types::DragonEvent;

/// Matches the ask-user tool's default timeout (§4.2).
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct PromptBroker {
    events: mpsc::UnboundedSender<DragonEvent>,
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
    timeout: Duration,
}

impl PromptBroker {
    pub fn new(events: mpsc::UnboundedSender<DragonEvent>) -> Self {
        Self { events, pending: Mutex::new(HashMap::new()), timeout: DEFAULT_PROMPT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Called by the transport when a `prompt_response` arrives.
    pub fn resolve(&self, prompt_id: &str, answer: String) {
        let sender = self.pending.lock().expect("prompt broker lock poisoned").remove(prompt_id);
        match sender {
            Some(tx) => {
                let _ = tx.send(answer);
            }
            None => warn!(%prompt_id, "prompt broker: resolved an unknown or already-timed-out prompt"),
        }
    }

    /// Number of prompts still awaiting a response - exposed for the
    /// `status` CLI subcommand's pending-queries count (§3.3).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("prompt broker lock poisoned").len()
    }
}

#[async_trait]
impl UserPrompter for PromptBroker {
    async fn ask(&self, prompt: &str) -> Option<String> {
        let prompt_id = generate_id("prompt");
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("prompt broker lock poisoned").insert(prompt_id.clone(), tx);

        debug!(%prompt_id, "prompt broker: asking user");
        if self.events.send(DragonEvent::Prompt { prompt_id: prompt_id.clone(), question: prompt.to_string() }).is_err() {
            self.pending.lock().expect("prompt broker lock poisoned").remove(&prompt_id);
            return None;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(_)) => None,
            Err(_) => {
                self.pending.lock().expect("prompt broker lock poisoned").remove(&prompt_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_unblocks_a_pending_ask() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let broker = std::sync::Arc::new(PromptBroker::new(tx));

        let asker = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.ask("continue?").await })
        };

        let event = rx.recv().await.unwrap();
        let prompt_id = match event {
            DragonEvent::Prompt { prompt_id, .. } => prompt_id,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(broker.pending_count(), 1);

        broker.resolve(&prompt_id, "yes".to_string());
        assert_eq!(asker.await.unwrap(), Some("yes".to_string()));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn unresolved_prompt_times_out_to_none() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let broker = PromptBroker::new(tx).with_timeout(Duration::from_millis(20));

        let answer = broker.ask("continue?").await;
        assert_eq!(answer, None);
        assert_eq!(broker.pending_count(), 0);
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn resolving_an_unknown_prompt_is_a_warned_no_op() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let broker = PromptBroker::new(tx);
        broker.resolve("prompt-does-not-exist", "hi".to_string());
    }
}
