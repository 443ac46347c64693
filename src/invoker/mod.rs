// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Built-in model collaborators.
//!
//! Real model providers live outside this crate and plug in through
//! [`ModelInvoker`]. [`EchoInvoker`] streams the prompt back word by word and
//! is what `agent-relay serve` runs with out of the box.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::GenerationError;
use crate::scheduler::{ModelInvoker, TokenUsage, TurnEnd, TurnEvent, TurnRequest, TurnStream};

/// Streams the prompt back, one word per chunk.
#[derive(Debug, Clone, Default)]
pub struct EchoInvoker {
    delay: Duration,
}

impl EchoInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between chunks, to make cancellation observable by hand.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn reply(request: &TurnRequest) -> String {
        if request.step_index == 0 {
            format!("[{}] {}", request.agent_type, request.prompt)
        } else {
            format!(" (step {})", request.step_index + 1)
        }
    }
}

/// Split on spaces while keeping the separator attached, so chunks concatenate back.
fn split_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl ModelInvoker for EchoInvoker {
    async fn start_turn(&self, request: TurnRequest) -> Result<TurnStream, GenerationError> {
        let reply = Self::reply(&request);
        let words = split_words(&reply);
        let usage = TokenUsage::new(
            request.prompt.split_whitespace().count() as u64,
            words.len() as u64,
        );
        let delay = self.delay;

        let chunks = stream::iter(words).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(TurnEvent::Text(word))
        });
        let tail = stream::iter(vec![
            Ok(TurnEvent::Usage(usage)),
            Ok(TurnEvent::End(TurnEnd::EndTurn)),
        ]);

        Ok(chunks.chain(tail).boxed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}
