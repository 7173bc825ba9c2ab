use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use tracesift::domain::models::{BadnessWeights, ToolCall, Trace};
use tracesift::services::{BadnessScorer, LatencyBaseline};

fn arb_trace() -> impl Strategy<Value = Trace> {
    (
        0.0f64..120_000.0,
        0i64..20,
        proptest::option::of(0.0f64..=1.0),
        proptest::option::of(0.0f64..=1.0),
        proptest::collection::vec(any::<bool>(), 0..12),
    )
        .prop_map(|(latency, errors, quality, grounding, tool_failures)| {
            let start = Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap();
            let mut trace = Trace::new("prop", start, latency);
            trace.error_count = errors;
            trace.quality_score = quality;
            trace.grounding_score = grounding;
            trace.tool_calls = tool_failures
                .into_iter()
                .enumerate()
                .map(|(i, failed)| {
                    let at = start + Duration::seconds(i as i64);
                    if failed {
                        ToolCall::failed("tool", at)
                    } else {
                        ToolCall::new("tool", at)
                    }
                })
                .collect();
            trace
        })
}

fn arb_weights() -> impl Strategy<Value = BadnessWeights> {
    (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.01f64..1.0).prop_map(
        |(quality_eval, grounding_eval, tool_errors, latency, error_count)| BadnessWeights {
            quality_eval,
            grounding_eval,
            tool_errors,
            latency,
            error_count,
        },
    )
}

proptest! {
    /// Property: every score and every component lies in [0, 1]
    #[test]
    fn prop_score_is_bounded(
        trace in arb_trace(),
        weights in arb_weights(),
        p95 in 1.0f64..60_000.0,
    ) {
        let scorer = BadnessScorer::new(weights, LatencyBaseline { p95_ms: p95 });
        let score = scorer.score(&trace);

        prop_assert!((0.0..=1.0).contains(&score.score), "score {}", score.score);
        let s = score.signals;
        for component in [s.tool_errors, s.latency, s.error_count] {
            prop_assert!((0.0..=1.0).contains(&component));
        }
        prop_assert_eq!(score.is_bad(), score.score > 0.5);
    }

    /// Property: more failed tool calls never lower the score
    #[test]
    fn prop_failing_a_tool_call_never_helps(trace in arb_trace()) {
        let scorer = BadnessScorer::new(BadnessWeights::default(), LatencyBaseline::default());
        let before = scorer.score(&trace).score;

        let mut worse = trace.clone();
        if let Some(call) = worse.tool_calls.iter_mut().find(|c| !c.failed) {
            call.failed = true;
        }
        let after = scorer.score(&worse).score;

        prop_assert!(after + 1e-12 >= before, "{} -> {}", before, after);
    }

    /// Property: the batch p95 is one of the batch latencies
    #[test]
    fn prop_latency_baseline_comes_from_batch(
        latencies in proptest::collection::vec(1.0f64..10_000.0, 1..50)
    ) {
        let start = Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap();
        let traces: Vec<Trace> = latencies
            .iter()
            .enumerate()
            .map(|(i, l)| Trace::new(format!("t{i}"), start, *l))
            .collect();

        let baseline = LatencyBaseline::from_traces(&traces);
        prop_assert!(latencies.contains(&baseline.p95_ms));
    }
}
