//! External ML confidence scorer client and the confidence blend.
//!
//! The scorer learns an empirical probability-of-win from historical trade
//! outcomes. It is strictly advisory: a null score, an error, or an
//! unreachable service forfeits the blend for that decision and nothing
//! else.

use std::time::Duration;

use agent_core::{ConfidenceScorer, ScoreRequest, ScoreResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;

/// ML influence grows with training-sample count and caps at 60%.
const BLEND_SAMPLE_SCALE: f64 = 500.0;
const BLEND_MAX_WEIGHT: f64 = 0.6;

pub struct ScorerClient {
    client: Client,
    base_url: String,
}

impl ScorerClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ConfidenceScorer for ScorerClient {
    async fn score_signal(&self, req: &ScoreRequest) -> Result<ScoreResponse> {
        let url = format!("{}/score", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("scorer returned {}", response.status()));
        }

        let scored = response.json::<ScoreResponse>().await?;
        tracing::debug!(
            coin = %req.coin,
            rule = %req.rule,
            score = ?scored.score,
            samples = scored.model_samples,
            "signal scored"
        );
        Ok(scored)
    }
}

/// Blend a rule confidence with the ML score:
/// `final = rule × (1 − w) + score × w`, `w = min(samples/500, 0.6)`.
///
/// A `None` score leaves the rule confidence untouched.
pub fn blend_confidence(rule_confidence: f64, response: &ScoreResponse) -> f64 {
    let Some(score) = response.score else {
        return rule_confidence;
    };
    let weight = (response.model_samples as f64 / BLEND_SAMPLE_SCALE).min(BLEND_MAX_WEIGHT);
    rule_confidence * (1.0 - weight) + score * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_score_keeps_rule_confidence() {
        let resp = ScoreResponse {
            score: None,
            model_samples: 10_000,
        };
        assert!((blend_confidence(0.65, &resp) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn weight_scales_with_sample_count() {
        // 250 samples -> w = 0.5
        let resp = ScoreResponse {
            score: Some(0.9),
            model_samples: 250,
        };
        let blended = blend_confidence(0.6, &resp);
        assert!((blended - (0.6 * 0.5 + 0.9 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn weight_caps_at_sixty_percent() {
        let resp = ScoreResponse {
            score: Some(1.0),
            model_samples: 1_000_000,
        };
        let blended = blend_confidence(0.5, &resp);
        assert!((blended - (0.5 * 0.4 + 1.0 * 0.6)).abs() < 1e-9);
    }

    #[test]
    fn untrained_model_has_no_influence() {
        let resp = ScoreResponse {
            score: Some(0.1),
            model_samples: 0,
        };
        assert!((blend_confidence(0.7, &resp) - 0.7).abs() < 1e-9);
    }
}
