use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ballot::{Candidate, Race};
use crate::error::RecommendationError;
use crate::llm::{self, LanguageModel};

use super::prompts::{self, PromptLimits};
use super::{IssueSummary, PreferenceProfile, RankedCandidate, Recommendation, SummaryStatus};

/// What to do with candidates whose summary is a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PlaceholderPolicy {
    /// Keep them in the ranking, flagged as low confidence.
    #[default]
    Rank,
    /// Leave them out of the ranking and list them separately.
    Exclude,
}

impl std::str::FromStr for PlaceholderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <PlaceholderPolicy as ValueEnum>::from_str(s, true)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationResponse {
    #[serde(default)]
    ranking: Vec<String>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    key_issues: Vec<String>,
}

pub struct RecommendationEngine {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    policy: PlaceholderPolicy,
    limits: PromptLimits,
}

impl RecommendationEngine {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, policy: PlaceholderPolicy) -> Self {
        Self {
            model,
            timeout,
            policy,
            limits: PromptLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Rank a race's candidates against the voter's preferences.
    ///
    /// Only a model that cannot be reached is an error. Unstructured output
    /// degrades to ballot order with the raw text as rationale.
    pub async fn recommend<'a>(
        &self,
        race: &'a Race,
        summaries: &[IssueSummary<'a>],
        preferences: &PreferenceProfile,
    ) -> Result<Recommendation<'a>, RecommendationError> {
        let (rankable, withheld): (Vec<&IssueSummary<'a>>, Vec<&IssueSummary<'a>>) =
            summaries.iter().partition(|s| match self.policy {
                PlaceholderPolicy::Rank => true,
                PlaceholderPolicy::Exclude => !s.is_placeholder(),
            });

        let mut caveats: Vec<String> = summaries
            .iter()
            .filter_map(|s| match &s.status {
                SummaryStatus::Placeholder { reason } => Some(format!(
                    "Limited information available for {}: {}. Treat this candidate's placement with low confidence.",
                    s.candidate.name, reason
                )),
                SummaryStatus::Complete => None,
            })
            .collect();
        let unranked: Vec<&'a Candidate> = withheld.iter().map(|s| s.candidate).collect();
        if !unranked.is_empty() {
            let names: Vec<&str> = unranked.iter().map(|c| c.name.as_str()).collect();
            caveats.push(format!("Not ranked for lack of information: {}.", names.join(", ")));
        }

        if rankable.is_empty() {
            info!(race = %race.name, "No candidate has enough information to rank");
            let rationale = with_caveats(
                format!(
                    "None of the candidates for {} had enough public information to compare against your preferences.",
                    race.name
                ),
                &caveats,
            );
            return Ok(Recommendation::new(race, Vec::new(), unranked, rationale, Vec::new(), caveats));
        }

        if preferences.as_str().chars().count() > self.limits.preference_chars {
            warn!(
                limit = self.limits.preference_chars,
                "Preferences are longer than the prompt allows and were truncated"
            );
        }
        let prompt = prompts::build_recommend_prompt(race, &rankable, preferences, &self.limits);
        let raw = llm::generate_with_timeout(self.model.as_ref(), &prompt, self.timeout).await?;

        let (response, structured) = match llm::parse_structured::<RecommendationResponse>(&raw) {
            Ok(parsed) => (parsed, true),
            Err(e) => {
                warn!(race = %race.name, "Unstructured recommendation ({}), using raw text", e);
                caveats.push(
                    "The model did not return a structured ranking; candidates are listed in ballot order."
                        .to_string(),
                );
                let fallback = RecommendationResponse {
                    rationale: raw.trim().to_string(),
                    ..Default::default()
                };
                (fallback, false)
            }
        };

        let (order, unplaced) = reconcile(&rankable, &response.ranking);
        if structured && rankable.len() > 1 && !unplaced.is_empty() {
            let names: Vec<&str> = unplaced.iter().map(|s| s.candidate.name.as_str()).collect();
            warn!(race = %race.name, unplaced = ?names, "Model left candidates unranked");
            caveats.push(format!(
                "The model did not rank {}; listed in ballot order after the ranked candidates.",
                names.join(", ")
            ));
        }
        let ranking: Vec<RankedCandidate<'a>> = order
            .into_iter()
            .map(|s| RankedCandidate {
                candidate: s.candidate,
                low_confidence: s.is_placeholder(),
            })
            .collect();

        let rationale = if response.rationale.trim().is_empty() {
            fallback_rationale(race, &ranking)
        } else {
            response.rationale.trim().to_string()
        };

        let key_issues: Vec<String> = response
            .key_issues
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        info!(race = %race.name, ranked = ranking.len(), "Recommendation produced");
        Ok(Recommendation::new(
            race,
            ranking,
            unranked,
            with_caveats(rationale, &caveats),
            key_issues,
            caveats,
        ))
    }
}

fn with_caveats(rationale: String, caveats: &[String]) -> String {
    if caveats.is_empty() {
        return rationale;
    }
    format!("{}\n\n{}", rationale, caveats.join("\n"))
}

fn fallback_rationale(race: &Race, ranking: &[RankedCandidate<'_>]) -> String {
    match ranking {
        [only] if race.candidates.len() == 1 => format!(
            "{} is the only candidate in this race, so they are the default choice.",
            only.candidate.name
        ),
        [only] => format!(
            "{} is the only candidate with enough public information to rank.",
            only.candidate.name
        ),
        _ => "The model gave no rationale for this ordering.".to_string(),
    }
}

/// Lowercased name with any trailing "(Party)" removed.
fn normalize(name: &str) -> String {
    let name = name.trim();
    let name = match name.rfind(" (") {
        Some(idx) if name.ends_with(')') => &name[..idx],
        _ => name,
    };
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map the model's ranking onto the race's candidates so the result is a
/// permutation: unknown or repeated names are dropped, omitted candidates are
/// appended in ballot order. The appended ones are returned separately.
fn reconcile<'s, 'a>(
    summaries: &[&'s IssueSummary<'a>],
    ranking: &[String],
) -> (Vec<&'s IssueSummary<'a>>, Vec<&'s IssueSummary<'a>>) {
    let mut used: HashSet<usize> = HashSet::new();
    let mut ordered = Vec::with_capacity(summaries.len());

    for name in ranking {
        let key = normalize(name);
        let found = summaries
            .iter()
            .enumerate()
            .find(|(i, s)| !used.contains(i) && normalize(&s.candidate.name) == key);
        match found {
            Some((i, s)) => {
                used.insert(i);
                ordered.push(*s);
            }
            None => debug!(name = %name, "Ignoring unknown or repeated name in ranking"),
        }
    }

    let unplaced: Vec<&'s IssueSummary<'a>> = summaries
        .iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, s)| *s)
        .collect();
    ordered.extend(unplaced.iter().copied());
    (ordered, unplaced)
}
