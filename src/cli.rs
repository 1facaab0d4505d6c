use std::path::PathBuf;

use clap::Parser;

use crate::llm::Provider;
use crate::pipeline::PlaceholderPolicy;

/// Environment variables fill in anything not given here; see `.env.example`.
#[derive(Parser, Debug)]
#[command(
    name = "candidate-recommender",
    version,
    about = "Research ballot candidates and rank them against your preferences"
)]
pub struct Cli {
    #[arg(value_name = "BALLOT", help = "Ballot JSON files (default: every *.json in --ballot-dir)")]
    pub ballots: Vec<PathBuf>,

    #[arg(long, help = "Directory scanned for ballot files [env: BALLOT_DIR]")]
    pub ballot_dir: Option<PathBuf>,

    #[arg(long, help = "Your political preferences, as free text [env: VOTER_PREFERENCES]")]
    pub preferences: Option<String>,

    #[arg(long, help = "File holding your preferences [env: VOTER_PREFERENCES_FILE]")]
    pub preferences_file: Option<PathBuf>,

    #[arg(long, help = "Jurisdiction used to disambiguate searches [env: BALLOT_JURISDICTION]")]
    pub jurisdiction: Option<String>,

    #[arg(long, value_enum, help = "Language model provider [env: LLM_PROVIDER]")]
    pub provider: Option<Provider>,

    #[arg(long, help = "Model name [env: LLM_MODEL]")]
    pub model: Option<String>,

    #[arg(long, help = "Search results per candidate [env: SEARCH_MAX_RESULTS]")]
    pub max_results: Option<usize>,

    #[arg(long, help = "Candidates processed at once [env: PIPELINE_CONCURRENCY]")]
    pub concurrency: Option<usize>,

    #[arg(long, value_enum, help = "Handling of candidates without information [env: PLACEHOLDER_POLICY]")]
    pub placeholder_policy: Option<PlaceholderPolicy>,

    #[arg(long = "race", value_name = "NAME", help = "Analyze these races in order and exit, skipping the menu")]
    pub races: Vec<String>,
}
