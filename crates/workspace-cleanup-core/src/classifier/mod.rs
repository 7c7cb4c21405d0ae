//! AI classification of user batches.
//!
//! A [`Classifier`] renders one prompt per batch, sends it down a [`ModelChain`] and maps
//! the answer back onto the batch by email. A batch that cannot be classified never
//! fails the caller: its users come back as [`Disposition::Unclassified`] along with a
//! [`BatchOutcome`] describing why.

pub mod parse;
pub mod prompt;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Mutex;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::llm::{build_endpoints, LlmSettings, ModelChain, RetryPolicy};
use crate::model::{Classification, Disposition, UserRecord};

pub use parse::{parse_response, ParsedEntry};
pub use prompt::PromptTemplate;

/// A contiguous slice of the dataset sent in one request.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub index: usize,
    /// Position of the first user within the full dataset.
    pub offset: usize,
    pub users: &'a [UserRecord],
}

impl Batch<'_> {
    pub fn rows(&self) -> Range<usize> {
        self.offset..self.offset + self.users.len()
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub rows: Range<usize>,
    /// Model that produced the accepted answer.
    pub model: Option<String>,
    pub attempts: u32,
    pub cached: bool,
    /// Cause when the batch could not be classified at all.
    pub failure: Option<String>,
    /// Batch users missing from an otherwise valid answer.
    pub missing: usize,
}

impl BatchOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Classifications for one batch, keyed by lower-cased email.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcome: BatchOutcome,
    pub classifications: HashMap<String, Classification>,
}

impl BatchResult {
    /// Classification for `user`, or an unclassified marker explaining why there is none.
    pub fn take(&mut self, user: &UserRecord) -> Classification {
        if let Some(classification) = self.classifications.remove(&user.email.to_ascii_lowercase()) {
            return classification;
        }
        match &self.outcome.failure {
            Some(cause) => Classification::unclassified(format!("AI batch failed: {cause}")),
            None if self.outcome.model.is_none() => {
                Classification::unclassified("AI classification disabled")
            }
            None => Classification::unclassified("missing from AI response"),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    model: String,
    entries: Vec<ParsedEntry>,
}

/// Sends user batches to the model chain and maps answers back onto users.
#[derive(Debug)]
pub struct Classifier {
    chain: Option<ModelChain>,
    cache: Mutex<HashMap<u64, CachedAnswer>>,
}

impl Classifier {
    pub fn new(chain: ModelChain) -> Self {
        Self {
            chain: Some(chain),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A classifier that never calls out; every user stays unclassified.
    pub fn disabled() -> Self {
        Self {
            chain: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build the endpoint chain described by `settings`.
    pub fn from_settings(settings: &LlmSettings, policy: RetryPolicy) -> Result<Self> {
        if !settings.ai_enabled() {
            return Ok(Self::disabled());
        }
        let endpoints = build_endpoints(settings)?;
        info!(provider = %settings.provider, models = ?settings.models, "AI classification enabled");
        Ok(Self::new(ModelChain::new(endpoints, policy)))
    }

    pub fn is_enabled(&self) -> bool {
        self.chain.is_some()
    }

    /// Classify one batch. Failures degrade to unclassified users instead of erroring.
    #[instrument(name = "classify_batch", skip_all, fields(batch = batch.index, rows = ?batch.rows()))]
    pub async fn classify(&self, batch: &Batch<'_>, template: &PromptTemplate) -> BatchResult {
        let mut outcome = BatchOutcome {
            index: batch.index,
            rows: batch.rows(),
            model: None,
            attempts: 0,
            cached: false,
            failure: None,
            missing: 0,
        };

        let Some(chain) = &self.chain else {
            return BatchResult {
                outcome,
                classifications: HashMap::new(),
            };
        };

        let prompt = template.render(batch.users);
        let key = prompt_key(&prompt);

        let answer = match self.cached(key) {
            Some(answer) => {
                debug!("reusing cached answer");
                outcome.cached = true;
                answer
            }
            None => match chain.run(&prompt, parse_response).await {
                Ok(success) => {
                    outcome.attempts = success.attempts;
                    let answer = CachedAnswer {
                        model: success.model,
                        entries: success.value,
                    };
                    self.store(key, answer.clone());
                    answer
                }
                Err(exhausted) => {
                    outcome.attempts = exhausted.failures.len() as u32;
                    warn!(
                        batch = batch.index,
                        rows = ?batch.rows(),
                        error = %exhausted,
                        "AI batch failed; users left unclassified"
                    );
                    outcome.failure = Some(exhausted.to_string());
                    return BatchResult {
                        outcome,
                        classifications: HashMap::new(),
                    };
                }
            },
        };

        outcome.model = Some(answer.model);
        let classifications = match_entries(batch.users, answer.entries);
        outcome.missing = batch
            .users
            .iter()
            .filter(|user| !classifications.contains_key(&user.email.to_ascii_lowercase()))
            .count();
        if outcome.missing > 0 {
            warn!(batch = batch.index, missing = outcome.missing, "AI response skipped some users");
        }
        BatchResult {
            outcome,
            classifications,
        }
    }

    fn cached(&self, key: u64) -> Option<CachedAnswer> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
    }

    fn store(&self, key: u64, answer: CachedAnswer) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, answer);
        }
    }
}

/// Keep entries whose email belongs to the batch; the first answer for an email wins.
fn match_entries(users: &[UserRecord], entries: Vec<ParsedEntry>) -> HashMap<String, Classification> {
    let mut classifications = HashMap::new();
    for entry in entries {
        let email = entry.email.trim().to_ascii_lowercase();
        if !users.iter().any(|user| user.email.eq_ignore_ascii_case(&email)) {
            debug!(email = %entry.email, "ignoring classification for unknown user");
            continue;
        }
        let classification = match Disposition::parse_label(&entry.label) {
            Some(disposition) => Classification::new(disposition, entry.rationale),
            None => Classification::unclassified(format!(
                "model returned unrecognised classification `{}`",
                entry.label
            )),
        };
        classifications.entry(email).or_insert(classification);
    }
    classifications
}

fn prompt_key(prompt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    hasher.finish()
}
