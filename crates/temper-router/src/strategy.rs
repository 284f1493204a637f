//! Refinement strategy selection.
//!
//! Candidates and their fit:
//!
//! | signal | candidate | fit |
//! |---|---|---|
//! | runtime or test failure | route-to-debug | 1.0 |
//! | an earlier round invalidated later work | truncate-from(n) | 0.9 |
//! | a required check is missing entirely | add-step | 0.8 |
//! | always | retry-with-feedback | 1.0 when the gap to the threshold is at most 0.15, else 0.5 (0.2 after a runtime failure) |
//!
//! Recommendations from other components join the pool. The highest fit
//! wins; equal fits go to the cheaper strategy in the fixed cost order.

use tracing::debug;

use temper_contracts::{
    error::{TemperError, TemperResult},
    routing::{FailureSignal, RefinementStrategy, StrategyChoice, StrategyRecommendation},
};

/// A shortfall at most this far below the threshold counts as minor.
pub const MINOR_GAP: f64 = 0.15;

#[derive(Debug, Clone)]
struct Candidate {
    strategy: RefinementStrategy,
    fit: f64,
    rationale: String,
}

fn retry_candidate(signal: &FailureSignal) -> Candidate {
    if signal.execution_failure.is_some() {
        return Candidate {
            strategy: RefinementStrategy::RetryWithFeedback,
            fit: 0.2,
            rationale: "retrying does not address a runtime failure".to_string(),
        };
    }
    match (signal.quality_score, signal.threshold) {
        (Some(score), Some(threshold)) if threshold - score <= MINOR_GAP => Candidate {
            strategy: RefinementStrategy::RetryWithFeedback,
            fit: 1.0,
            rationale: format!("score {score:.2} is within {MINOR_GAP} of threshold {threshold:.2}"),
        },
        (Some(score), Some(threshold)) => Candidate {
            strategy: RefinementStrategy::RetryWithFeedback,
            fit: 0.5,
            rationale: format!("score {score:.2} is well below threshold {threshold:.2}"),
        },
        _ => Candidate {
            strategy: RefinementStrategy::RetryWithFeedback,
            fit: 0.5,
            rationale: "no score to compare against the threshold".to_string(),
        },
    }
}

fn candidates(signal: &FailureSignal) -> Vec<Candidate> {
    let mut pool = vec![retry_candidate(signal)];
    if let Some(failure) = &signal.execution_failure {
        let first_line = failure.error_message.lines().next().unwrap_or_default();
        pool.push(Candidate {
            strategy: RefinementStrategy::RouteToDebug,
            fit: 1.0,
            rationale: format!("execution failed: {first_line}"),
        });
    }
    if let Some(index) = signal.invalidated_round {
        pool.push(Candidate {
            strategy: RefinementStrategy::TruncateFrom { index },
            fit: 0.9,
            rationale: format!("round {index} invalidated the work built on it"),
        });
    }
    if !signal.missing_checks.is_empty() {
        let missing: Vec<&str> = signal
            .missing_checks
            .iter()
            .map(|c| c.strip_prefix(FailureSignal::MISSING_PREFIX).unwrap_or(c))
            .collect();
        pool.push(Candidate {
            strategy: RefinementStrategy::AddStep {
                description: format!("produce the missing {}", missing.join(", ")),
            },
            fit: 0.8,
            rationale: format!("required checks absent: {}", signal.missing_checks.join(", ")),
        });
    }
    pool
}

/// Pick the strategy for `signal`, considering `recommendations` too.
///
/// A recommendation to route to debug without an execution failure is
/// ignored: only runtime or test failures go to the debug loop.
pub fn select_strategy(
    signal: &FailureSignal,
    recommendations: &[StrategyRecommendation],
) -> TemperResult<StrategyChoice> {
    let mut pool = candidates(signal);
    for recommendation in recommendations {
        if !recommendation.fit.is_finite() {
            return Err(TemperError::InputContract {
                reason: format!(
                    "recommendation from '{}' has a non-finite fit",
                    recommendation.source
                ),
            });
        }
        if recommendation.strategy == RefinementStrategy::RouteToDebug
            && signal.execution_failure.is_none()
        {
            debug!(source = %recommendation.source, "ignoring route-to-debug without a failure");
            continue;
        }
        pool.push(Candidate {
            strategy: recommendation.strategy.clone(),
            fit: recommendation.fit.clamp(0.0, 1.0),
            rationale: format!("recommended by {}: {}", recommendation.source, recommendation.rationale),
        });
    }

    // Retry is always in the pool, so there is always a winner.
    let best = pool
        .into_iter()
        .max_by(|a, b| {
            a.fit
                .total_cmp(&b.fit)
                .then(b.strategy.cost_rank().cmp(&a.strategy.cost_rank()))
        })
        .ok_or_else(|| TemperError::StateMachine {
            reason: "no refinement strategy candidates".to_string(),
        })?;

    Ok(StrategyChoice {
        strategy: best.strategy,
        fit: best.fit,
        rationale: best.rationale,
    })
}

#[cfg(test)]
mod tests {
    use temper_contracts::{
        debug::ExecutionFailure,
        error::TemperError,
        routing::{FailureSignal, RefinementStrategy, StrategyRecommendation},
    };

    use super::select_strategy;

    fn shortfall(score: f64) -> FailureSignal {
        FailureSignal {
            quality_score: Some(score),
            threshold: Some(0.85),
            violated_checks: vec!["no-placeholders".to_string()],
            ..FailureSignal::default()
        }
    }

    fn failure() -> ExecutionFailure {
        ExecutionFailure {
            artifact: "for x in xs\n    print(x)\n".to_string(),
            error_message: "SyntaxError: expected ':'".to_string(),
            stack_trace: "File \"main.py\", line 1".to_string(),
        }
    }

    #[test]
    fn test_minor_shortfall_retries() {
        let choice = select_strategy(&shortfall(0.78), &[]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::RetryWithFeedback);
        assert_eq!(choice.fit, 1.0);
    }

    #[test]
    fn test_missing_section_adds_a_step() {
        let mut signal = shortfall(0.30);
        signal.missing_checks = vec!["missing-requirements".to_string()];
        let choice = select_strategy(&signal, &[]).unwrap();
        assert_eq!(
            choice.strategy,
            RefinementStrategy::AddStep {
                description: "produce the missing requirements".to_string()
            }
        );
    }

    #[test]
    fn test_invalidated_round_truncates() {
        let mut signal = shortfall(0.40);
        signal.invalidated_round = Some(2);
        signal.missing_checks = vec!["missing-tasks".to_string()];
        let choice = select_strategy(&signal, &[]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::TruncateFrom { index: 2 });
    }

    #[test]
    fn test_execution_failure_routes_to_debug() {
        let choice = select_strategy(&FailureSignal::from_execution_failure(failure()), &[]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::RouteToDebug);
        assert!(choice.rationale.contains("expected ':'"));
    }

    #[test]
    fn test_debug_recommendation_without_failure_ignored() {
        let recommendation = StrategyRecommendation {
            source: "verification-gate".to_string(),
            strategy: RefinementStrategy::RouteToDebug,
            fit: 1.0,
            rationale: "looks broken".to_string(),
        };
        let choice = select_strategy(&shortfall(0.40), &[recommendation]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::RetryWithFeedback);
    }

    #[test]
    fn test_equal_fit_prefers_cheaper_strategy() {
        let recommendation = StrategyRecommendation {
            source: "planner".to_string(),
            strategy: RefinementStrategy::TruncateFrom { index: 1 },
            fit: 1.0,
            rationale: "plan drifted".to_string(),
        };
        // Retry also has fit 1.0 for a minor gap and is cheaper.
        let choice = select_strategy(&shortfall(0.80), &[recommendation.clone()]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::RetryWithFeedback);

        // With a large gap the recommendation wins outright.
        let choice = select_strategy(&shortfall(0.20), &[recommendation]).unwrap();
        assert_eq!(choice.strategy, RefinementStrategy::TruncateFrom { index: 1 });
        assert!(choice.rationale.starts_with("recommended by planner"));
    }

    #[test]
    fn test_non_finite_recommendation_rejected() {
        let recommendation = StrategyRecommendation {
            source: "x".to_string(),
            strategy: RefinementStrategy::RetryWithFeedback,
            fit: f64::NAN,
            rationale: "x".to_string(),
        };
        let err = select_strategy(&shortfall(0.5), &[recommendation]).unwrap_err();
        assert!(matches!(err, TemperError::InputContract { .. }));
    }
}
