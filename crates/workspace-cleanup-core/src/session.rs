use std::collections::VecDeque;

use crate::classifier::PromptTemplate;
use crate::loader::Dataset;
use crate::planner::CleanupPlanner;
use crate::report::Report;

/// Orchestrates generate actions and keeps a bounded history of past reports.
#[derive(Debug)]
pub struct Session {
    planner: CleanupPlanner,
    history: VecDeque<Report>,
    retention: usize,
}

impl Session {
    pub const DEFAULT_RETENTION: usize = 10;

    pub fn new(planner: CleanupPlanner, retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            planner,
            history: VecDeque::with_capacity(retention),
            retention,
        }
    }

    pub fn planner(&self) -> &CleanupPlanner {
        &self.planner
    }

    /// Run the planner and record the report, evicting the oldest when full.
    pub async fn generate(&mut self, dataset: &Dataset, template: &PromptTemplate) -> &Report {
        let report = self.planner.plan(dataset, template).await;
        self.record(report)
    }

    pub fn record(&mut self, report: Report) -> &Report {
        while self.history.len() >= self.retention {
            self.history.pop_front();
        }
        self.history.push_back(report);
        &self.history[self.history.len() - 1]
    }

    pub fn latest(&self) -> Option<&Report> {
        self.history.back()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Report> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}
