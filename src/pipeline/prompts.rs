use crate::ballot::{Candidate, Race};
use crate::llm::Prompt;
use crate::search::SearchResult;

use super::{IssueSummary, PreferenceProfile, SummaryStatus};

/// Marker shown to the model in place of a degraded candidate's issues.
pub const INSUFFICIENT_MARKER: &str = "INSUFFICIENT INFORMATION";

pub const SUMMARIZE_SYSTEM_PROMPT: &str = r#"You are a nonpartisan election research analyst. You read web search excerpts about a political candidate and extract the issues they are publicly associated with.

Rules:
- Use only the excerpts provided. Do not invent positions.
- Prefer issues that are salient in the current election cycle.
- A position may be stated (the candidate said or voted for it) or inferred (strongly implied by the excerpts). Mark inferred positions with "(inferred)".
- Ignore excerpts that are clearly about a different person with the same name.

Output JSON only, matching exactly:
{
  "issues": [
    { "topic": "short issue name", "position": "one or two sentences on the candidate's position" }
  ],
  "synthesis": "2-3 sentence overview of the candidate's platform"
}"#;

pub const RECOMMEND_SYSTEM_PROMPT: &str = r#"You are a careful voting advisor. You compare every candidate in one race against a voter's own stated priorities and recommend an order of preference.

Rules:
- Judge candidates only by the issue summaries provided and the voter's preferences, quoted verbatim below. Do not reinterpret or expand the preferences.
- Rank every candidate listed, each exactly once, using the candidate names exactly as written.
- Candidates marked INSUFFICIENT INFORMATION have little public record. Still rank them, but say explicitly in the rationale that their placement is low confidence because of limited information.
- Explain the ranking in terms of the voter's stated preferences.

Output JSON only, matching exactly:
{
  "ranking": ["most preferred candidate name", "next", "..."],
  "rationale": "several sentences explaining the order",
  "key_issues": ["top issue in this race", "second", "third"]
}"#;

/// Caps, in chars, on text copied into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    /// Per search excerpt.
    pub snippet_chars: usize,
    /// Per ballot field, metadata line, issue or synthesis.
    pub field_chars: usize,
    /// The voter's preference text.
    pub preference_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            snippet_chars: 400,
            field_chars: 600,
            preference_chars: 4000,
        }
    }
}

/// Truncate on a char boundary, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

fn candidate_block(candidate: &Candidate, limits: &PromptLimits) -> String {
    let cap = |text: &str| truncate_chars(text, limits.field_chars);
    let mut lines = vec![format!("Name: {}", cap(&candidate.name))];
    if let Some(party) = candidate.party.as_deref().filter(|p| !p.trim().is_empty()) {
        lines.push(format!("Party: {}", cap(party)));
    }
    lines.extend(candidate.metadata_lines().iter().map(|l| cap(l)));
    lines.join("\n")
}

fn race_block(race: &Race, limits: &PromptLimits) -> String {
    let mut lines = vec![format!(
        "Office: {}",
        truncate_chars(&race.office(), limits.field_chars)
    )];
    if let Some(j) = race.jurisdiction.as_deref() {
        lines.push(format!("Jurisdiction: {}", truncate_chars(j, limits.field_chars)));
    }
    lines.join("\n")
}

pub fn build_summarize_prompt(
    candidate: &Candidate,
    race: &Race,
    evidence: &[SearchResult],
    limits: &PromptLimits,
) -> Prompt {
    let excerpts = evidence
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] {}\n{}\nSource: {}",
                i + 1,
                truncate_chars(&r.title, limits.field_chars),
                truncate_chars(&r.snippet, limits.snippet_chars),
                r.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Prompt {
        system: SUMMARIZE_SYSTEM_PROMPT.to_string(),
        context: format!(
            "## Candidate\n{}\n\n## Race\n{}\n\n## Search excerpts\n{}",
            candidate_block(candidate, limits),
            race_block(race, limits),
            excerpts
        ),
        task: format!(
            "Extract the most important current issues for {} in this race, with their position on each. Respond with the JSON object only.",
            candidate.name
        ),
    }
}

fn summary_block(summary: &IssueSummary<'_>, limits: &PromptLimits) -> String {
    let cap = |text: &str| truncate_chars(text, limits.field_chars);
    let mut out = candidate_block(summary.candidate, limits);
    match &summary.status {
        SummaryStatus::Complete => {
            out.push_str("\nIssues:");
            for issue in &summary.issues {
                out.push_str(&format!("\n- {}: {}", cap(&issue.topic), cap(&issue.position)));
            }
            if !summary.synthesis.is_empty() {
                out.push_str(&format!("\nOverview: {}", cap(&summary.synthesis)));
            }
        }
        SummaryStatus::Placeholder { reason } => {
            out.push_str(&format!("\n{} ({})", INSUFFICIENT_MARKER, reason));
        }
    }
    out
}

pub fn build_recommend_prompt(
    race: &Race,
    summaries: &[&IssueSummary<'_>],
    preferences: &PreferenceProfile,
    limits: &PromptLimits,
) -> Prompt {
    let blocks = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("### Candidate {}\n{}", i + 1, summary_block(s, limits)))
        .collect::<Vec<_>>()
        .join("\n\n");

    let preference_text = if preferences.is_empty() {
        "(The voter did not state any preferences. Rank by overall alignment with broadly shared civic priorities and say so.)"
            .to_string()
    } else {
        truncate_chars(preferences.as_str(), limits.preference_chars)
    };

    let task = if let [only] = summaries {
        let standing = if race.candidates.len() == 1 {
            "the only candidate in this race"
        } else {
            "the only candidate in this race with enough public information to assess"
        };
        format!(
            "{} is {}. Return a ranking containing just that name, and a rationale explaining how the candidate aligns or conflicts with the voter's preferences. Respond with the JSON object only.",
            only.candidate.name, standing
        )
    } else {
        "Rank all candidates above for this voter and explain why. Respond with the JSON object only."
            .to_string()
    };

    Prompt {
        system: RECOMMEND_SYSTEM_PROMPT.to_string(),
        context: format!(
            "## Race\n{}\n\n## Candidates\n{}\n\n## Voter preferences\n{}",
            race_block(race, limits),
            blocks,
            preference_text
        ),
        task,
    }
}
