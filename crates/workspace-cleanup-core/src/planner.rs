use chrono::Utc;
use tracing::{info, instrument};

use crate::classifier::{Batch, Classifier, PromptTemplate};
use crate::loader::Dataset;
use crate::report::{Report, ReportRow};
use crate::risk::RiskCalculator;

/// Scores every user, classifies them batch by batch and merges both into a [`Report`].
#[derive(Debug)]
pub struct CleanupPlanner {
    calculator: RiskCalculator,
    classifier: Classifier,
    batch_size: usize,
}

impl CleanupPlanner {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub fn new(calculator: RiskCalculator, classifier: Classifier, batch_size: usize) -> Self {
        Self {
            calculator,
            classifier,
            batch_size: batch_size.max(1),
        }
    }

    pub fn calculator(&self) -> &RiskCalculator {
        &self.calculator
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Produce one row per input user, in input order, whatever happens to the AI calls.
    #[instrument(name = "plan", skip_all, fields(users = dataset.len(), batch_size = self.batch_size))]
    pub async fn plan(&self, dataset: &Dataset, template: &PromptTemplate) -> Report {
        let mut rows = Vec::with_capacity(dataset.len());
        let mut batches = Vec::new();

        for (index, users) in dataset.users.chunks(self.batch_size).enumerate() {
            let batch = Batch {
                index,
                offset: index * self.batch_size,
                users,
            };
            let mut result = self.classifier.classify(&batch, template).await;
            for user in users {
                let classification = result.take(user);
                rows.push(ReportRow {
                    user: user.clone(),
                    risk: self.calculator.score(user),
                    classification,
                });
            }
            batches.push(result.outcome);
        }

        let report = Report {
            generated_at: Utc::now(),
            ai_enabled: self.classifier.is_enabled(),
            rows,
            batches,
            defaults: dataset.defaults.clone(),
        };
        info!(
            rows = report.rows.len(),
            failed_batches = report.failed_batches().count(),
            "cleanup plan generated"
        );
        report
    }

    /// Risk-only report; no model is consulted.
    pub fn score_only(&self, dataset: &Dataset) -> Report {
        Report {
            generated_at: Utc::now(),
            ai_enabled: false,
            rows: dataset
                .users
                .iter()
                .map(|user| ReportRow {
                    user: user.clone(),
                    risk: self.calculator.score(user),
                    classification: crate::model::Classification::unclassified(
                        "AI classification disabled",
                    ),
                })
                .collect(),
            batches: Vec::new(),
            defaults: dataset.defaults.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chain::tests::{chain_of, ScriptedClient};
    use crate::llm::{LlmError, RetryPolicy};
    use crate::model::{AccessLevel, Disposition, UserRecord};

    fn dataset(count: usize) -> Dataset {
        Dataset {
            users: (0..count)
                .map(|i| UserRecord {
                    name: format!("User {i}"),
                    email: format!("user{i}@example.com"),
                    role: if i % 2 == 0 { "Engineer" } else { "Contractor" }.into(),
                    last_login_days: (i as u32) * 40,
                    access_level: AccessLevel::ALL[i % 4],
                })
                .collect(),
            defaults: Vec::new(),
        }
    }

    fn answer_for(range: std::ops::Range<usize>, label: &str) -> Result<String, LlmError> {
        let entries: Vec<_> = range
            .map(|i| serde_json::json!({"email": format!("user{i}@example.com"), "classification": label}))
            .collect();
        Ok(serde_json::Value::Array(entries).to_string())
    }

    #[tokio::test]
    async fn one_failed_batch_leaves_others_intact() {
        let data = dataset(7);
        // batch 0: users 0-2, batch 1: users 3-5 (fails), batch 2: user 6
        let client = ScriptedClient::new(
            "model-a",
            vec![
                answer_for(0..3, "SafeToKeep"),
                Err(LlmError::Status { status: 500, body: "boom".into() }),
                answer_for(6..7, "LikelyInactive"),
            ],
        );
        let classifier = Classifier::new(chain_of(&[&client], RetryPolicy::immediate(0)));
        let planner = CleanupPlanner::new(RiskCalculator::default(), classifier, 3);
        let report = planner.plan(&data, &PromptTemplate::default()).await;

        assert_eq!(report.rows.len(), 7);
        let emails: Vec<_> = report.rows.iter().map(|r| r.user.email.as_str()).collect();
        let expected: Vec<_> = data.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, expected);

        let dispositions: Vec<_> = report
            .rows
            .iter()
            .map(|r| r.classification.disposition)
            .collect();
        assert_eq!(
            dispositions,
            vec![
                Disposition::SafeToKeep,
                Disposition::SafeToKeep,
                Disposition::SafeToKeep,
                Disposition::Unclassified,
                Disposition::Unclassified,
                Disposition::Unclassified,
                Disposition::LikelyInactive,
            ]
        );
        assert_eq!(report.batches.len(), 3);
        assert_eq!(report.batches[1].rows, 3..6);
        assert!(report.batches[1].is_failure());
        assert!(!report.all_batches_failed());
    }

    #[tokio::test]
    async fn risk_is_scored_even_when_every_batch_fails() {
        let data = dataset(4);
        let client = ScriptedClient::new("model-a", Vec::new());
        let classifier = Classifier::new(chain_of(&[&client], RetryPolicy::immediate(0)));
        let planner = CleanupPlanner::new(RiskCalculator::default(), classifier, 2);
        let report = planner.plan(&data, &PromptTemplate::default()).await;

        assert_eq!(report.rows.len(), 4);
        assert!(report.all_batches_failed());
        let calculator = RiskCalculator::default();
        for (row, user) in report.rows.iter().zip(&data.users) {
            assert_eq!(row.risk, calculator.score(user));
        }
    }

    #[tokio::test]
    async fn zero_batch_size_is_treated_as_one() {
        let data = dataset(2);
        let planner = CleanupPlanner::new(RiskCalculator::default(), Classifier::disabled(), 0);
        let report = planner.plan(&data, &PromptTemplate::default()).await;
        assert_eq!(planner.batch_size(), 1);
        assert_eq!(report.batches.len(), 2);
        assert!(!report.ai_enabled);
        assert!(!report.all_batches_failed());
    }

    #[test]
    fn score_only_keeps_input_order() {
        let data = dataset(3);
        let planner = CleanupPlanner::new(RiskCalculator::default(), Classifier::disabled(), 50);
        let report = planner.score_only(&data);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[2].user.email, "user2@example.com");
        assert!(report.batches.is_empty());
    }
}
