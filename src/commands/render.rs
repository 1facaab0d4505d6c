use crate::pipeline::{IssueSummary, Recommendation, SummaryStatus};

const RULE: &str = "────────────────────────────────────────";

/// Plain-text report for one finished race.
pub fn render(recommendation: &Recommendation<'_>, summaries: &[IssueSummary<'_>]) -> String {
    let race = recommendation.race;
    let mut out = format!("{}\nRecommendation: {}\n{}\n", RULE, race.office(), RULE);

    if recommendation.ranking.is_empty() {
        out.push_str("\nNo candidates could be ranked.\n");
    } else {
        out.push_str("\nRanking:\n");
        for (i, ranked) in recommendation.ranking.iter().enumerate() {
            let flag = if ranked.low_confidence {
                "  [limited information]"
            } else {
                ""
            };
            out.push_str(&format!("  {}. {}{}\n", i + 1, ranked.candidate.label(), flag));
        }
    }

    if !recommendation.unranked.is_empty() {
        let names: Vec<String> = recommendation.unranked.iter().map(|c| c.label()).collect();
        out.push_str(&format!("\nNot ranked: {}\n", names.join(", ")));
    }

    out.push_str(&format!("\nWhy:\n{}\n", recommendation.rationale));

    if !recommendation.key_issues.is_empty() {
        out.push_str(&format!("\nKey issues: {}\n", recommendation.key_issues.join(", ")));
    }

    out.push_str("\nCandidate summaries:\n");
    for summary in summaries {
        out.push_str(&format!("\n  {}\n", summary.candidate.label()));
        match &summary.status {
            SummaryStatus::Complete => {
                for issue in &summary.issues {
                    out.push_str(&format!("    - {}: {}\n", issue.topic, issue.position));
                }
                if !summary.synthesis.is_empty() {
                    out.push_str(&format!("    {}\n", summary.synthesis));
                }
            }
            SummaryStatus::Placeholder { reason } => {
                out.push_str(&format!("    {} ({})\n", summary.synthesis, reason));
            }
        }
    }

    out.push_str(&format!(
        "\nGenerated {}\n",
        recommendation.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}
