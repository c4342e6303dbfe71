//! Statistical analysis engine
//!
//! Recomputes an [`Analysis`] from raw observations on every call. The
//! engine is deterministic over the stored observations, so repeated calls
//! without new data produce the same verdict.

use std::sync::Arc;
use tracing::debug;

use crate::domain::error::DomainError;
use crate::domain::experiment::{
    Analysis, ExperimentConfig, ExperimentStore, MetricObservation, ObservationQuery,
    VariantComparison, CONTROL_VARIANT,
};

use super::statistical::{mean, observed_power, required_sample_size, welch_t_test};

/// Confidence score attached to a treatment recommendation
const TREATMENT_CONFIDENCE: f64 = 0.9;
/// Confidence score attached to the conservative control recommendation
const CONTROL_CONFIDENCE: f64 = 0.6;

/// Computes significance verdicts and recommendations from the ledger
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    store: Arc<dyn ExperimentStore>,
}

impl AnalysisEngine {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self { store }
    }

    /// Analyze an experiment's primary metric
    ///
    /// Returns `Ok(None)` when there is not yet enough data to say anything:
    /// no control observations, or no treatment observations at all.
    pub async fn analyze(&self, test_id: &str) -> Result<Option<Analysis>, DomainError> {
        let experiment = self
            .store
            .get_experiment(test_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Experiment '{test_id}' not found")))?;

        let config = experiment.config();
        let metric = config.primary_metric();

        let query = ObservationQuery::new(test_id).with_metric(metric);
        let observations = self.store.query_observations(&query).await?;

        Ok(self.compute(config, &observations))
    }

    /// Pure computation over a set of primary-metric observations
    pub fn compute(
        &self,
        config: &ExperimentConfig,
        observations: &[MetricObservation],
    ) -> Option<Analysis> {
        let values_of = |variant: &str| -> Vec<f64> {
            observations
                .iter()
                .filter(|o| o.variant == variant)
                .map(|o| o.value)
                .collect()
        };
        let count_of = |variant: &str| -> u64 {
            observations
                .iter()
                .filter(|o| o.variant == variant)
                .map(|o| o.count)
                .sum()
        };

        let control_values = values_of(CONTROL_VARIANT);
        if control_values.is_empty() {
            debug!(test_id = config.test_id(), "no control observations yet");
            return None;
        }
        let control_mean = mean(&control_values);
        let control_count = count_of(CONTROL_VARIANT);

        let alpha = 1.0 - config.confidence_level();

        // Comparisons follow configuration order so the verdict is stable
        // when two treatments tie
        let mut comparisons = Vec::new();
        for treatment in config.treatments() {
            let name = treatment.name.as_str();
            let treatment_values = values_of(name);
            if treatment_values.is_empty() {
                continue;
            }

            let treatment_mean = mean(&treatment_values);
            // Too little data for a t-test is treated as "no evidence", not
            // as an error
            let p_value = welch_t_test(&control_values, &treatment_values).unwrap_or(1.0);

            let relative_improvement = if control_mean != 0.0 {
                Some((treatment_mean - control_mean) / control_mean * 100.0)
            } else {
                None
            };

            comparisons.push(VariantComparison {
                variant: name.to_string(),
                relative_improvement,
                absolute_difference: treatment_mean - control_mean,
                p_value,
                is_significant: p_value < alpha,
                sample_size: count_of(name),
            });
        }

        if comparisons.is_empty() {
            debug!(test_id = config.test_id(), "no treatment observations yet");
            return None;
        }

        // Best treatment by improvement magnitude; strict comparison keeps
        // the earlier-configured treatment on ties. Treatments with an
        // undefined improvement ratio never win.
        let mut best: Option<&VariantComparison> = None;
        for comparison in &comparisons {
            let Some(improvement) = comparison.relative_improvement else {
                continue;
            };
            let beats = match best.and_then(|b| b.relative_improvement) {
                Some(best_improvement) => improvement.abs() > best_improvement.abs(),
                None => true,
            };
            if beats {
                best = Some(comparison);
            }
        }

        let minimum_effect_pct = config.minimum_effect_size() * 100.0;
        let is_significant = comparisons.iter().any(|c| c.is_significant);
        let p_value = comparisons
            .iter()
            .map(|c| c.p_value)
            .fold(f64::INFINITY, f64::min);

        // The gate is overall significance plus the magnitude of the best
        // effect; a large significant regression is still surfaced as the
        // decisive variant, with the sign carried in the comparison
        let mut decision_factors = Vec::new();
        let (recommendation, confidence_score) = match best {
            Some(winner)
                if is_significant
                    && winner.relative_improvement.unwrap_or(0.0).abs()
                        >= minimum_effect_pct =>
            {
                decision_factors.push(format!(
                    "'{}' shows a significant {:.2}% effect (p = {:.4})",
                    winner.variant,
                    winner.relative_improvement.unwrap_or(0.0),
                    winner.p_value
                ));
                (winner.variant.clone(), TREATMENT_CONFIDENCE)
            }
            Some(winner) => {
                if !is_significant {
                    decision_factors.push(format!(
                        "no statistically significant difference (best p = {p_value:.4})"
                    ));
                } else {
                    decision_factors.push(format!(
                        "best observed effect {:.2}% is below the {minimum_effect_pct:.2}% minimum",
                        winner.relative_improvement.unwrap_or(0.0)
                    ));
                }
                (CONTROL_VARIANT.to_string(), CONTROL_CONFIDENCE)
            }
            None => {
                decision_factors
                    .push("control mean is zero, improvement ratio undefined".to_string());
                (CONTROL_VARIANT.to_string(), CONTROL_CONFIDENCE)
            }
        };

        let required = required_sample_size(config.minimum_effect_size());
        let current_sample_size =
            control_count + comparisons.iter().map(|c| c.sample_size).sum::<u64>();
        decision_factors.push(format!(
            "{current_sample_size} observations recorded, {required} required per the configured effect size"
        ));

        let best_effect_fraction = best
            .and_then(|b| b.relative_improvement)
            .map(|pct| pct.abs() / 100.0)
            .unwrap_or(0.0);
        let statistical_power = observed_power(
            control_count,
            best_effect_fraction,
            config.minimum_effect_size(),
        );

        Some(Analysis {
            test_id: config.test_id().to_string(),
            is_significant,
            p_value,
            comparisons,
            statistical_power,
            required_sample_size: required,
            current_sample_size,
            recommendation,
            confidence_score,
            decision_factors,
            computed_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::VariantRef;
    use crate::infrastructure::experiment::in_memory::InMemoryExperimentStore;

    fn accuracy_config() -> ExperimentConfig {
        ExperimentConfig::builder("analyze-exp", "Analyzer Test")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("treatment", VariantRef::new("model-a", "2.0.0"))
            .allocate("control", 0.5)
            .allocate("treatment", 0.5)
            .confidence_level(0.95)
            .minimum_effect_size(0.05)
            .primary_metric("accuracy")
            .build()
            .unwrap()
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::new(Arc::new(InMemoryExperimentStore::new()))
    }

    /// Observations jittered around a mean, deterministic for repeatability
    fn observations_around(variant: &str, center: f64, n: usize) -> Vec<MetricObservation> {
        (0..n)
            .map(|i| {
                let jitter = ((i % 7) as f64 - 3.0) * 0.004;
                MetricObservation::new("analyze-exp", variant, "accuracy", center + jitter)
            })
            .collect()
    }

    #[test]
    fn test_no_control_data_yields_none() {
        let mut observations = observations_around("treatment", 0.9, 50);
        observations.extend(observations_around("other", 0.8, 10));

        assert!(engine().compute(&accuracy_config(), &observations).is_none());
    }

    #[test]
    fn test_no_treatment_data_yields_none() {
        let observations = observations_around("control", 0.8, 50);

        assert!(engine().compute(&accuracy_config(), &observations).is_none());
    }

    #[test]
    fn test_clear_improvement_recommends_treatment() {
        let mut observations = observations_around("control", 0.80, 100);
        observations.extend(observations_around("treatment", 0.90, 100));

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        assert!(analysis.is_significant);
        assert_eq!(analysis.recommendation, "treatment");
        assert_eq!(analysis.confidence_score, 0.9);

        let comparison = analysis.comparison_for("treatment").unwrap();
        let improvement = comparison.relative_improvement.unwrap();
        assert!((improvement - 12.5).abs() < 0.5, "got {improvement}%");
    }

    #[test]
    fn test_tiny_improvement_recommends_control() {
        // 0.625% improvement, below the 5% minimum effect size
        let mut observations = observations_around("control", 0.800, 100);
        observations.extend(observations_around("treatment", 0.805, 100));

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        assert_eq!(analysis.recommendation, "control");
        assert_eq!(analysis.confidence_score, 0.6);
    }

    #[test]
    fn test_significant_regression_is_the_decisive_variant() {
        let mut observations = observations_around("control", 0.90, 100);
        observations.extend(observations_around("treatment", 0.70, 100));

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        // Selection is by effect magnitude; the sign lives in the comparison
        assert!(analysis.is_significant);
        assert_eq!(analysis.recommendation, "treatment");
        let comparison = analysis.comparison_for("treatment").unwrap();
        assert!(comparison.relative_improvement.unwrap() < 0.0);
    }

    #[test]
    fn test_best_by_magnitude_wins_with_overall_significance() {
        let config = ExperimentConfig::builder("analyze-exp", "Two Treatments")
            .control(VariantRef::new("model-a", "1.0.0"))
            .treatment("small-step", VariantRef::new("model-a", "2.0.0"))
            .treatment("big-swing", VariantRef::new("model-a", "3.0.0"))
            .allocate("control", 0.4)
            .allocate("small-step", 0.3)
            .allocate("big-swing", 0.3)
            .confidence_level(0.95)
            .minimum_effect_size(0.05)
            .primary_metric("accuracy")
            .build()
            .unwrap();

        let mut observations = observations_around("control", 0.80, 100);
        // Clearly significant 10% improvement
        observations.extend(observations_around("small-step", 0.88, 100));
        // Larger effect but a single observation, so its own p-value is 1.0
        observations.push(MetricObservation::new(
            "analyze-exp",
            "big-swing",
            "accuracy",
            0.99,
        ));

        let analysis = engine().compute(&config, &observations).unwrap();

        // Overall significance comes from 'small-step'; the verdict still
        // goes to the largest absolute effect
        assert!(analysis.is_significant);
        assert!(!analysis.comparison_for("big-swing").unwrap().is_significant);
        assert_eq!(analysis.recommendation, "big-swing");
    }

    #[test]
    fn test_single_treatment_observation_is_not_evidence() {
        let mut observations = observations_around("control", 0.8, 50);
        observations.push(MetricObservation::new(
            "analyze-exp",
            "treatment",
            "accuracy",
            0.99,
        ));

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        let comparison = analysis.comparison_for("treatment").unwrap();
        assert_eq!(comparison.p_value, 1.0);
        assert!(!comparison.is_significant);
        assert_eq!(analysis.recommendation, "control");
    }

    #[test]
    fn test_zero_control_mean_leaves_improvement_undefined() {
        let zeros: Vec<MetricObservation> = (0..10)
            .map(|i| {
                MetricObservation::new(
                    "analyze-exp",
                    "control",
                    "accuracy",
                    if i % 2 == 0 { 0.001 } else { -0.001 },
                )
            })
            .collect();
        let mut observations = zeros;
        // Exact zero mean
        observations.extend(observations_around("treatment", 0.5, 10));

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        let comparison = analysis.comparison_for("treatment").unwrap();
        assert!(comparison.relative_improvement.is_none());
        assert_eq!(analysis.recommendation, "control");
    }

    #[test]
    fn test_sample_sizes_sum_observation_counts() {
        let mut observations = observations_around("control", 0.8, 10);
        observations.push(
            MetricObservation::new("analyze-exp", "treatment", "accuracy", 0.85).with_count(25),
        );
        observations.push(
            MetricObservation::new("analyze-exp", "treatment", "accuracy", 0.86).with_count(25),
        );

        let analysis = engine().compute(&accuracy_config(), &observations).unwrap();

        assert_eq!(analysis.comparison_for("treatment").unwrap().sample_size, 50);
        assert_eq!(analysis.current_sample_size, 60);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let mut observations = observations_around("control", 0.80, 60);
        observations.extend(observations_around("treatment", 0.88, 60));

        let engine = engine();
        let first = engine.compute(&accuracy_config(), &observations).unwrap();
        let second = engine.compute(&accuracy_config(), &observations).unwrap();

        assert_eq!(first.recommendation, second.recommendation);
        assert_eq!(first.is_significant, second.is_significant);
        assert_eq!(first.p_value, second.p_value);
        assert_eq!(first.comparisons, second.comparisons);
        assert_eq!(first.statistical_power, second.statistical_power);
    }

    #[tokio::test]
    async fn test_analyze_unknown_experiment_is_not_found() {
        let err = engine().analyze("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_analyze_reads_store() {
        let store = Arc::new(InMemoryExperimentStore::new());
        let engine = AnalysisEngine::new(store.clone());

        let experiment =
            crate::domain::experiment::Experiment::new(accuracy_config(), "tester");
        store.put_experiment(experiment).await.unwrap();

        for obs in observations_around("control", 0.80, 30) {
            store.append_observation(obs).await.unwrap();
        }
        for obs in observations_around("treatment", 0.90, 30) {
            store.append_observation(obs).await.unwrap();
        }
        // Observations for other metrics must not leak into the analysis
        store
            .append_observation(MetricObservation::new(
                "analyze-exp",
                "treatment",
                "latency_ms",
                5000.0,
            ))
            .await
            .unwrap();

        let analysis = engine.analyze("analyze-exp").await.unwrap().unwrap();
        assert_eq!(analysis.recommendation, "treatment");
        assert_eq!(analysis.current_sample_size, 60);
    }
}
