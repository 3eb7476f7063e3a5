//! The polish exchange: deterministic facts in, styled prose out.
//!
//! Strict one-way data flow. The prompt carries the archetype and the
//! concrete metrics as hard constraints; the model is asked only for a
//! stylistic rewrite, and its output replaces nothing but the optional
//! `polished_narrative` field. Any failure on any exit path (transport,
//! timeout, malformed JSON, empty text) returns the deterministic
//! verdict untouched with `is_ai_generated = false`.

use metro_pulse_metrics_models::StationIntelligence;
use metro_pulse_narrative_models::NarrativeVerdict;
use serde::Deserialize;
use std::time::Duration;

use crate::AiError;
use crate::providers::{LlmProvider, request_timeout};

/// System prompt framing the rewrite task.
const SYSTEM_PROMPT: &str =
    "You are an urban mobility analyst writing short station descriptions \
     for a transit intelligence map. You restate given facts with better \
     prose; you never invent amenities, numbers, or geography.";

/// Expected shape of the model's reply.
#[derive(Deserialize)]
struct PolishResponse {
    description: String,
}

/// Builds the constraint prompt for one station.
fn build_prompt(verdict: &NarrativeVerdict, station: &StationIntelligence) -> String {
    let metrics = &station.metrics;
    format!(
        r#"Refine this analysis for {station} in {borough}.

Facts (hard constraints, do not alter):
- Archetype: {archetype}
- {base}
- Social Pulse: {social:.0}/100 (nightlife percentile)
- Office Score: {office:.0}/100
- Retail Gap: {gap:.2}
- Peak period: {peak}

Task:
Write a polished 2-sentence description.
1. Keep the borough correct ({borough}).
2. Explain WHY the scores matter (e.g. "a low Social Pulse suggests a quiet residential area").
3. Do not mention amenities or numbers that are not listed above.

Return JSON: {{ "persona": "{persona}", "description": "..." }}"#,
        station = verdict.station,
        borough = metrics.borough,
        archetype = verdict.archetype,
        base = verdict.base_narrative,
        social = metrics.social_pulse,
        office = metrics.office_score,
        gap = metrics.retail_gap,
        peak = station.time_buckets.dominant(),
        persona = verdict.persona,
    )
}

/// Strips a surrounding markdown code fence, if any.
///
/// Models frequently wrap JSON replies in fenced code blocks even when
/// asked not to.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Runs one polish exchange with an explicit time bound.
///
/// Returns the updated verdict on success, or the input verdict
/// unchanged on any failure. Never errors, never retries, holds no
/// shared state while the call is in flight.
pub async fn polish_with_timeout(
    provider: &dyn LlmProvider,
    verdict: &NarrativeVerdict,
    station: &StationIntelligence,
    timeout: Duration,
) -> NarrativeVerdict {
    let prompt = build_prompt(verdict, station);

    let outcome = tokio::time::timeout(timeout, provider.complete(SYSTEM_PROMPT, &prompt))
        .await
        .map_err(|_| AiError::Timeout {
            seconds: timeout.as_secs(),
        })
        .and_then(|result| result)
        .and_then(|text| {
            let parsed: PolishResponse = serde_json::from_str(strip_code_fences(&text))?;
            if parsed.description.trim().is_empty() {
                return Err(AiError::EmptyResponse);
            }
            Ok(parsed.description)
        });

    match outcome {
        Ok(description) => {
            log::info!("AI polished narrative for '{}'", verdict.station);
            NarrativeVerdict {
                polished_narrative: Some(description),
                is_ai_generated: true,
                ..verdict.clone()
            }
        }
        Err(e) => {
            log::error!(
                "Narrative polish failed for '{}', serving deterministic text: {e}",
                verdict.station
            );
            verdict.clone()
        }
    }
}

/// Runs one polish exchange with the environment-configured time bound.
pub async fn polish(
    provider: &dyn LlmProvider,
    verdict: &NarrativeVerdict,
    station: &StationIntelligence,
) -> NarrativeVerdict {
    polish_with_timeout(provider, verdict, station, request_timeout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_pulse_geography_models::Borough;
    use metro_pulse_metrics_models::StationMetrics;
    use metro_pulse_narrative_models::Archetype;
    use metro_pulse_station_models::TimeBuckets;

    struct CannedProvider(String);

    #[async_trait::async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AiError> {
            Ok(self.0.clone())
        }
    }

    struct UnreachableProvider;

    #[async_trait::async_trait]
    impl LlmProvider for UnreachableProvider {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AiError> {
            Err(AiError::Provider {
                message: "connection refused".to_string(),
            })
        }
    }

    struct HangingProvider;

    #[async_trait::async_trait]
    impl LlmProvider for HangingProvider {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AiError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    fn fixture() -> (NarrativeVerdict, StationIntelligence) {
        let station = StationIntelligence {
            station: "Bedford Av".to_string(),
            lat: Some(40.7172),
            lon: Some(-73.9566),
            cluster_id: 0,
            n_bars: 42,
            n_offices: 3,
            n_universities: 0,
            time_buckets: TimeBuckets {
                morning: 20.0,
                lunch: 25.0,
                evening: 60.0,
                night: 95.0,
            },
            metrics: StationMetrics {
                social_pulse: 97.0,
                office_score: 12.0,
                retail_gap: -0.85,
                borough: Borough::Brooklyn,
            },
        };
        let verdict = NarrativeVerdict {
            station: "Bedford Av".to_string(),
            archetype: Archetype::NightlifeHub,
            persona: "Brooklyn Nightlife District".to_string(),
            base_narrative: "A high-energy area.".to_string(),
            polished_narrative: None,
            is_ai_generated: false,
        };
        (verdict, station)
    }

    #[test]
    fn prompt_carries_facts_as_constraints() {
        let (verdict, station) = fixture();
        let prompt = build_prompt(&verdict, &station);
        assert!(prompt.contains("Bedford Av"));
        assert!(prompt.contains("Brooklyn"));
        assert!(prompt.contains("Nightlife Hub"));
        assert!(prompt.contains("Social Pulse: 97/100"));
        assert!(prompt.contains("Retail Gap: -0.85"));
        assert!(prompt.contains("Peak period: night"));
    }

    #[test]
    fn strips_json_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn successful_polish_sets_flag_and_keeps_base() {
        let (verdict, station) = fixture();
        let provider = CannedProvider(
            r#"{"persona": "Brooklyn Nightlife District", "description": "Polished prose."}"#
                .to_string(),
        );
        let out = polish_with_timeout(&provider, &verdict, &station, Duration::from_secs(5)).await;
        assert!(out.is_ai_generated);
        assert_eq!(out.polished_narrative.as_deref(), Some("Polished prose."));
        assert_eq!(out.base_narrative, verdict.base_narrative);
    }

    #[tokio::test]
    async fn fenced_reply_still_parses() {
        let (verdict, station) = fixture();
        let provider =
            CannedProvider("```json\n{\"description\": \"Fenced prose.\"}\n```".to_string());
        let out = polish_with_timeout(&provider, &verdict, &station, Duration::from_secs(5)).await;
        assert_eq!(out.polished_narrative.as_deref(), Some("Fenced prose."));
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_deterministic() {
        let (verdict, station) = fixture();
        let out =
            polish_with_timeout(&UnreachableProvider, &verdict, &station, Duration::from_secs(5))
                .await;
        assert!(!out.is_ai_generated);
        assert!(out.polished_narrative.is_none());
        assert_eq!(out.base_narrative, verdict.base_narrative);
        assert!(!out.base_narrative.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_deterministic() {
        let (verdict, station) = fixture();
        let out =
            polish_with_timeout(&HangingProvider, &verdict, &station, Duration::from_secs(1)).await;
        assert!(!out.is_ai_generated);
        assert!(out.polished_narrative.is_none());
    }

    #[tokio::test]
    async fn malformed_reply_degrades_to_deterministic() {
        let (verdict, station) = fixture();
        let provider = CannedProvider("sorry, I can't help with JSON".to_string());
        let out = polish_with_timeout(&provider, &verdict, &station, Duration::from_secs(5)).await;
        assert!(!out.is_ai_generated);
    }

    #[tokio::test]
    async fn empty_description_degrades_to_deterministic() {
        let (verdict, station) = fixture();
        let provider = CannedProvider(r#"{"description": "  "}"#.to_string());
        let out = polish_with_timeout(&provider, &verdict, &station, Duration::from_secs(5)).await;
        assert!(!out.is_ai_generated);
        assert!(out.polished_narrative.is_none());
    }
}
