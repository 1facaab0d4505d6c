use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::ballot::{Candidate, Race};
use crate::error::SummarizationError;
use crate::llm::{self, LanguageModel};
use crate::search::SearchResult;

use super::prompts::{self, PromptLimits};
use super::{Issue, IssueSummary, SummaryStatus};

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    issues: Vec<IssueEntry>,
    #[serde(default)]
    synthesis: String,
}

#[derive(Debug, Deserialize)]
struct IssueEntry {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    position: String,
}

pub struct IssueSummarizer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    limits: PromptLimits,
    max_issues: usize,
}

impl IssueSummarizer {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
        limits: PromptLimits,
        max_issues: usize,
    ) -> Self {
        Self {
            model,
            timeout,
            limits,
            max_issues,
        }
    }

    /// Extract a candidate's issues from their search evidence.
    ///
    /// No evidence yields the placeholder without a model call.
    pub async fn summarize<'a>(
        &self,
        candidate: &'a Candidate,
        race: &Race,
        evidence: &[SearchResult],
    ) -> Result<IssueSummary<'a>, SummarizationError> {
        if evidence.is_empty() {
            debug!(candidate = %candidate.name, "No evidence, using placeholder");
            return Ok(IssueSummary::placeholder(candidate, "no search results found"));
        }

        let prompt = prompts::build_summarize_prompt(candidate, race, evidence, &self.limits);
        let response: SummaryResponse =
            llm::generate_structured(self.model.as_ref(), &prompt, self.timeout).await?;

        let issues: Vec<Issue> = response
            .issues
            .into_iter()
            .filter_map(|e| {
                let topic = e.topic.trim();
                let position = e.position.trim();
                (!topic.is_empty() && !position.is_empty()).then(|| Issue {
                    topic: topic.to_string(),
                    position: position.to_string(),
                })
            })
            .take(self.max_issues)
            .collect();

        if issues.is_empty() {
            return Err(SummarizationError::NoIssues);
        }

        info!(candidate = %candidate.name, issues = issues.len(), "Candidate summarized");
        Ok(IssueSummary {
            candidate,
            issues,
            synthesis: response.synthesis.trim().to_string(),
            status: SummaryStatus::Complete,
        })
    }
}
