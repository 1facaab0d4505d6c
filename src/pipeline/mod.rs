pub mod prompts;
pub mod recommend;
pub mod summarize;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ballot::{Candidate, Race};
use crate::error::{RecommendationError, RetrievalError};
use crate::llm::LanguageModel;
use crate::search::{Retriever, RetrieverConfig, SearchProvider, SearchResult};
use crate::state::PipelineConfig;

pub use prompts::PromptLimits;
pub use recommend::{PlaceholderPolicy, RecommendationEngine};
pub use summarize::IssueSummarizer;

/// The voter's free-text priorities. Passed to the model verbatim, up to the prompt cap.
#[derive(Debug, Clone, Default)]
pub struct PreferenceProfile(String);

impl PreferenceProfile {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub topic: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryStatus {
    Complete,
    /// Stand-in for a candidate we could not research.
    Placeholder { reason: String },
}

/// Issues associated with one candidate for one race run.
#[derive(Debug, Clone)]
pub struct IssueSummary<'a> {
    pub candidate: &'a Candidate,
    pub issues: Vec<Issue>,
    pub synthesis: String,
    pub status: SummaryStatus,
}

impl<'a> IssueSummary<'a> {
    pub fn placeholder(candidate: &'a Candidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            issues: Vec::new(),
            synthesis: format!("Insufficient information available about {}.", candidate.name),
            status: SummaryStatus::Placeholder {
                reason: reason.into(),
            },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.status, SummaryStatus::Placeholder { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RankedCandidate<'a> {
    pub candidate: &'a Candidate,
    pub low_confidence: bool,
}

/// Final output for a race.
#[derive(Debug, Clone)]
pub struct Recommendation<'a> {
    pub race: &'a Race,
    pub ranking: Vec<RankedCandidate<'a>>,
    /// Candidates withheld from ranking under [`PlaceholderPolicy::Exclude`].
    pub unranked: Vec<&'a Candidate>,
    pub rationale: String,
    pub key_issues: Vec<String>,
    pub caveats: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl<'a> Recommendation<'a> {
    pub fn new(
        race: &'a Race,
        ranking: Vec<RankedCandidate<'a>>,
        unranked: Vec<&'a Candidate>,
        rationale: String,
        key_issues: Vec<String>,
        caveats: Vec<String>,
    ) -> Self {
        Self {
            race,
            ranking,
            unranked,
            rationale,
            key_issues,
            caveats,
            generated_at: Utc::now(),
        }
    }
}

/// Lifecycle of one race run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    Selected,
    Retrieving,
    Summarizing,
    Recommending,
    Done,
    Aborted,
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RaceState::Selected => "SELECTED",
            RaceState::Retrieving => "RETRIEVING",
            RaceState::Summarizing => "SUMMARIZING",
            RaceState::Recommending => "RECOMMENDING",
            RaceState::Done => "DONE",
            RaceState::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

pub enum RaceOutcome<'a> {
    Done {
        recommendation: Recommendation<'a>,
        summaries: Vec<IssueSummary<'a>>,
    },
    Aborted {
        stage: RaceState,
        error: RecommendationError,
    },
    /// Interrupted by the user; nothing was produced.
    Cancelled,
}

/// Retriever → Summarizer per candidate, then one recommendation per race.
pub struct RacePipeline {
    retriever: Retriever,
    summarizer: IssueSummarizer,
    engine: RecommendationEngine,
    concurrency: usize,
}

impl RacePipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        model: Arc<dyn LanguageModel>,
        config: &PipelineConfig,
    ) -> Self {
        let retriever = Retriever::new(
            search,
            RetrieverConfig {
                max_results: config.max_results,
                timeout: config.search_timeout,
                retry_backoff: config.retry_backoff,
            },
        );
        let summarizer = IssueSummarizer::new(
            model.clone(),
            config.llm_timeout,
            config.prompt_limits,
            config.max_issues,
        );
        let engine = RecommendationEngine::new(model, config.llm_timeout, config.placeholder_policy)
            .with_limits(config.prompt_limits);

        Self {
            retriever,
            summarizer,
            engine,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Run one race to completion, or until `cancel` fires.
    pub async fn run<'a>(
        &self,
        race: &'a Race,
        preferences: &PreferenceProfile,
        cancel: &CancellationToken,
    ) -> RaceOutcome<'a> {
        transition(race, RaceState::Selected);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(race = %race.name, "Race cancelled, discarding partial results");
                RaceOutcome::Cancelled
            }
            outcome = self.execute(race, preferences) => outcome,
        }
    }

    async fn execute<'a>(&self, race: &'a Race, preferences: &PreferenceProfile) -> RaceOutcome<'a> {
        transition(race, RaceState::Retrieving);
        let evidence: Vec<Result<Vec<SearchResult>, RetrievalError>> = stream::iter(&race.candidates)
            .map(|c| self.retriever.retrieve(c, race))
            .buffered(self.concurrency)
            .collect()
            .await;

        transition(race, RaceState::Summarizing);
        let summaries: Vec<IssueSummary<'a>> = stream::iter(race.candidates.iter().zip(evidence))
            .map(|(c, found)| self.summarize_candidate(race, c, found))
            .buffered(self.concurrency)
            .collect()
            .await;

        // Every candidate has a terminal summary here.
        transition(race, RaceState::Recommending);
        match self.engine.recommend(race, &summaries, preferences).await {
            Ok(recommendation) => {
                transition(race, RaceState::Done);
                RaceOutcome::Done {
                    recommendation,
                    summaries,
                }
            }
            Err(error) => {
                warn!(race = %race.name, "Recommendation failed: {}", error);
                transition(race, RaceState::Aborted);
                RaceOutcome::Aborted {
                    stage: RaceState::Recommending,
                    error,
                }
            }
        }
    }

    /// Never fails: errors become a placeholder summary.
    async fn summarize_candidate<'a>(
        &self,
        race: &Race,
        candidate: &'a Candidate,
        found: Result<Vec<SearchResult>, RetrievalError>,
    ) -> IssueSummary<'a> {
        let evidence = match found {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(race = %race.name, candidate = %candidate.name, stage = %RaceState::Retrieving, "FAILED(candidate): {}", e);
                return IssueSummary::placeholder(candidate, format!("search failed ({})", e));
            }
        };

        match self.summarizer.summarize(candidate, race, &evidence).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(race = %race.name, candidate = %candidate.name, stage = %RaceState::Summarizing, "FAILED(candidate): {}", e);
                IssueSummary::placeholder(candidate, format!("summary unavailable ({})", e))
            }
        }
    }
}

fn transition(race: &Race, state: RaceState) {
    info!(race = %race.name, state = %state, "Race state");
}
