//! Optional LLM advisory client.
//!
//! Advisory output is a hint, never the decision authority: the bot logs the
//! text, classifies it once at this boundary into a closed bias enum, and
//! keeps trading (hold-biased) when the advisor is missing or failing.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::TradeRecord;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MISSION_CONTEXT: &str = "Mission: achieve 1.5%-3% daily compounding returns \
    on Kraken USD pairs with conviction-gated entries and 24/7 operation.";

/// Closed classification of advisory text, parsed once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceBias {
    Increase,
    Decrease,
    Neutral,
}

/// Classify advisory text by keyword. "increase" wins over "decrease" when
/// both appear, matching the original reviewer's precedence.
pub fn classify_advice(text: &str) -> AdviceBias {
    let lowered = text.to_lowercase();
    if lowered.contains("increase") {
        AdviceBias::Increase
    } else if lowered.contains("decrease") {
        AdviceBias::Decrease
    } else {
        AdviceBias::Neutral
    }
}

/// The reviewer roles the advisor can serve, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    /// Comment on the most recent executed trade
    TradeReview,
    /// Strategy-level review feeding the agent feedback loop
    StrategyReview,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Chat-completions client for advisory reviews.
pub struct Advisor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    reviewers: Vec<ReviewKind>,
}

impl Advisor {
    /// Build from `ADVISOR_API_KEY` / `ADVISOR_BASE_URL` / `ADVISOR_MODEL`.
    /// Errors when the key is absent; callers degrade to no advisor.
    pub fn from_env(reviewers: Vec<ReviewKind>) -> Result<Self> {
        let api_key = std::env::var("ADVISOR_API_KEY").context("ADVISOR_API_KEY not set")?;
        let base_url =
            std::env::var("ADVISOR_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ADVISOR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create advisor HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            reviewers,
        })
    }

    pub fn has_reviewer(&self, kind: ReviewKind) -> bool {
        self.reviewers.contains(&kind)
    }

    /// Commentary on the most recent executed trade.
    pub async fn review_last_trade(&self, record: &TradeRecord) -> Result<String> {
        let user = format!(
            "Review this trade: {} {} {:.6} at {:.2}. \
             Suggest conviction or strategy adjustments.",
            record.action, record.pair, record.amount, record.price
        );
        self.chat(&user, 200).await
    }

    /// Strategy-level review across the pair set.
    pub async fn review_strategy(&self, pairs: &[String]) -> Result<String> {
        let user = format!(
            "Strategize for crypto trading on Kraken USD pairs: {}. \
             Should agent conviction weights increase or decrease?",
            pairs.join(", ")
        );
        self.chat(&user, 300).await
    }

    async fn chat(&self, user: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MISSION_CONTEXT,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
        };

        debug!(model = %self.model, "advisory request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Advisory request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Advisory request failed: {} - {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse advisory response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Advisory response had no choices")
    }
}
