pub mod render;
pub mod select;

use std::io::Write;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ballot::Race;
use crate::pipeline::{PreferenceProfile, RaceOutcome};
use crate::state::AppState;

use select::Choice;

/// How a single race run ended, from the session's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunResult {
    Completed,
    Aborted,
    Cancelled,
}

/// Menu-driven session: pick a race, analyze it, repeat.
///
/// `interrupts` carries Ctrl-C presses. One arriving while a race runs cancels
/// that race; one arriving at a prompt ends the session.
pub async fn run_interactive<R, W>(
    state: &AppState,
    input: R,
    out: &mut W,
    interrupts: &mut mpsc::Receiver<()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    let preferences = match &state.preferences {
        Some(p) => p.clone(),
        None => {
            writeln!(out, "Describe your political preferences (one line, Enter to skip):")?;
            out.flush()?;
            let Some(text) = read_line(&mut lines, interrupts).await? else {
                return Ok(());
            };
            if text.trim().is_empty() {
                warn!("No preferences given; recommendations will not be personalised");
            }
            PreferenceProfile::new(text)
        }
    };

    let mut remaining: Vec<&Race> = state.ballot.races.iter().collect();
    loop {
        if remaining.is_empty() {
            writeln!(out, "\nAll races have been analyzed!")?;
            break;
        }

        writeln!(out, "\nAvailable races:")?;
        for (i, race) in remaining.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, race.office())?;
        }
        writeln!(out, "\nEnter the number of the race you'd like to analyze (or 'q' to quit):")?;
        out.flush()?;

        let Some(line) = read_line(&mut lines, interrupts).await? else {
            break;
        };

        let idx = match select::parse_choice(&line, remaining.len()) {
            Choice::Quit => break,
            Choice::Invalid(msg) => {
                writeln!(out, "{}", msg)?;
                continue;
            }
            Choice::Race(idx) => idx,
        };

        let race = remaining[idx];
        match analyze(state, race, &preferences, out, interrupts).await? {
            RunResult::Completed => {
                remaining.remove(idx);
            }
            // Left on the menu so it can be retried.
            RunResult::Aborted => {}
            RunResult::Cancelled => continue,
        }

        writeln!(out, "\nPress 'Enter' to continue...")?;
        out.flush()?;
        if read_line(&mut lines, interrupts).await?.is_none() {
            break;
        }
    }

    info!("Session finished");
    Ok(())
}

/// Analyze the named races in order without prompting.
pub async fn run_named<W: Write>(
    state: &AppState,
    names: &[String],
    out: &mut W,
    interrupts: &mut mpsc::Receiver<()>,
) -> anyhow::Result<()> {
    let preferences = state.preferences.clone().unwrap_or_else(|| {
        warn!("No preferences given; recommendations will not be personalised");
        PreferenceProfile::default()
    });

    let mut failed = Vec::new();
    for name in names {
        let race = state
            .ballot
            .race(name)
            .ok_or_else(|| anyhow::anyhow!("race {:?} is not on the ballot", name))?;

        match analyze(state, race, &preferences, out, interrupts).await? {
            RunResult::Completed => {}
            RunResult::Aborted => failed.push(name.as_str()),
            RunResult::Cancelled => anyhow::bail!("interrupted"),
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("could not analyze: {}", failed.join(", "));
    }
    Ok(())
}

async fn analyze<W: Write>(
    state: &AppState,
    race: &Race,
    preferences: &PreferenceProfile,
    out: &mut W,
    interrupts: &mut mpsc::Receiver<()>,
) -> anyhow::Result<RunResult> {
    writeln!(out, "\nAnalyzing {}...", race.name)?;
    out.flush()?;

    let started = Instant::now();
    let cancel = CancellationToken::new();
    let run = state.pipeline.run(race, preferences, &cancel);
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Some(()) = interrupts.recv() => {
                writeln!(out, "\nCancelling...")?;
                cancel.cancel();
            }
        }
    };

    let result = match outcome {
        RaceOutcome::Done {
            recommendation,
            summaries,
        } => {
            writeln!(out, "\n{}", render::render(&recommendation, &summaries))?;
            writeln!(
                out,
                "Analysis completed in {:.2} seconds",
                started.elapsed().as_secs_f64()
            )?;
            RunResult::Completed
        }
        RaceOutcome::Aborted { stage, error } => {
            writeln!(
                out,
                "\nCould not complete the analysis of {} (failed during {}): {}",
                race.name, stage, error
            )?;
            RunResult::Aborted
        }
        RaceOutcome::Cancelled => {
            writeln!(out, "Analysis of {} cancelled.", race.name)?;
            RunResult::Cancelled
        }
    };
    out.flush()?;
    Ok(result)
}

/// Next input line, or `None` on end of input or an interrupt.
async fn read_line<R>(
    lines: &mut Lines<R>,
    interrupts: &mut mpsc::Receiver<()>,
) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        Some(()) = interrupts.recv() => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ballot::{Ballot, Candidate};
    use crate::llm::testing::ScriptedModel;
    use crate::llm::{LanguageModel, LlmError, Prompt};
    use crate::pipeline::RacePipeline;
    use crate::search::testing::FakeSearch;
    use crate::state::PipelineConfig;

    fn ballot() -> Ballot {
        Ballot {
            races: vec![
                Race::new(
                    "Mayor",
                    vec![Candidate::new("Alice", None), Candidate::new("Bob", None)],
                ),
                Race::new("Sheriff", vec![Candidate::new("Carol", None)]),
            ],
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            search_timeout: Duration::from_millis(500),
            llm_timeout: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    fn state(model: Arc<dyn LanguageModel>) -> AppState {
        let search = FakeSearch::default().with("Alice", &["rail plan"]);
        AppState {
            ballot: Arc::new(ballot()),
            pipeline: Arc::new(RacePipeline::new(Arc::new(search), model, &config())),
            preferences: Some(PreferenceProfile::new("public transit")),
        }
    }

    fn working_model() -> ScriptedModel {
        ScriptedModel::new()
            .reply(
                "issues for Alice",
                r#"{"issues": [{"topic": "Transit", "position": "Build light rail"}]}"#,
            )
            .reply("only candidate", r#"{"ranking": ["Carol"], "rationale": "Carol is unopposed."}"#)
            .reply("Rank all candidates", r#"{"ranking": ["Alice", "Bob"], "rationale": "Alice backs transit."}"#)
    }

    async fn session(state: &AppState, input: &str, rx: &mut mpsc::Receiver<()>) -> String {
        let mut out = Vec::new();
        run_interactive(state, tokio::io::BufReader::new(input.as_bytes()), &mut out, rx)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_every_race_analyzed_then_done() {
        let state = state(Arc::new(working_model()));
        let (_tx, mut rx) = mpsc::channel(1);

        let out = session(&state, "1\n\n1\n\n", &mut rx).await;

        assert!(out.contains("Analyzing Mayor..."));
        assert!(out.contains("Alice backs transit."));
        assert!(out.contains("Analyzing Sheriff..."));
        assert!(out.contains("Carol is unopposed."));
        assert_eq!(out.matches("Analysis completed in").count(), 2);
        assert!(out.trim_end().ends_with("All races have been analyzed!"));
    }

    #[tokio::test]
    async fn test_analyzed_race_leaves_menu() {
        let state = state(Arc::new(working_model()));
        let (_tx, mut rx) = mpsc::channel(1);

        let out = session(&state, "2\n\nq\n", &mut rx).await;

        let last_menu = out.rsplit("Available races:").next().unwrap();
        assert!(last_menu.contains("1. Mayor"));
        assert!(!last_menu.contains("Sheriff"));
    }

    #[tokio::test]
    async fn test_invalid_input_reprompts() {
        let state = state(Arc::new(working_model()));
        let (_tx, mut rx) = mpsc::channel(1);

        let out = session(&state, "seven\n9\nq\n", &mut rx).await;

        assert!(out.contains("Invalid input"));
        assert!(out.contains("between 1 and 2"));
        assert_eq!(out.matches("Available races:").count(), 3);
        assert!(!out.contains("Analyzing"));
    }

    #[tokio::test]
    async fn test_aborted_race_reported_and_offered_again() {
        let model = ScriptedModel::new()
            .reply(
                "issues for Alice",
                r#"{"issues": [{"topic": "Transit", "position": "Build light rail"}]}"#,
            )
            .fail("Rank all candidates", "service unavailable");
        let state = state(Arc::new(model));
        let (_tx, mut rx) = mpsc::channel(1);

        let out = session(&state, "1\n\nq\n", &mut rx).await;

        assert!(out.contains("Could not complete the analysis of Mayor (failed during RECOMMENDING)"));
        let last_menu = out.rsplit("Available races:").next().unwrap();
        assert!(last_menu.contains("Mayor"));
    }

    #[tokio::test]
    async fn test_preferences_asked_when_missing() {
        let model = Arc::new(working_model());
        let mut state = state(model.clone());
        state.preferences = None;
        let (_tx, mut rx) = mpsc::channel(1);

        let out = session(&state, "fund the schools\n2\n\nq\n", &mut rx).await;

        assert!(out.starts_with("Describe your political preferences"));
        let last = model.prompts().pop().unwrap();
        assert!(last.context.contains("fund the schools"));
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _prompt: &Prompt) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_race() {
        let state = AppState {
            pipeline: Arc::new(RacePipeline::new(
                Arc::new(FakeSearch::default().with("Alice", &["rail plan"])),
                Arc::new(SlowModel),
                &PipelineConfig {
                    llm_timeout: Duration::from_secs(60),
                    ..config()
                },
            )),
            ..state(Arc::new(working_model()))
        };
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(()).await;
        });

        let out = tokio::time::timeout(Duration::from_secs(5), session(&state, "1\nq\n", &mut rx))
            .await
            .expect("interrupt should end the race promptly");

        assert!(out.contains("Analysis of Mayor cancelled."));
        assert!(!out.contains("Analysis completed"));
        assert_eq!(out.matches("Available races:").count(), 2);
    }
}
