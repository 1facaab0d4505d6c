use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ballot::{Ballot, BallotSource};
use crate::cli::Cli;
use crate::error::ConfigError;
use crate::llm::{self, Provider};
use crate::pipeline::{PlaceholderPolicy, PreferenceProfile, PromptLimits, RacePipeline};
use crate::search::DuckDuckGo;

/// Tunables for one race run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub max_results: usize,
    pub search_timeout: Duration,
    pub llm_timeout: Duration,
    pub retry_backoff: Duration,
    pub prompt_limits: PromptLimits,
    pub max_issues: usize,
    pub placeholder_policy: PlaceholderPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_results: 5,
            search_timeout: Duration::from_secs(20),
            llm_timeout: Duration::from_secs(120),
            retry_backoff: Duration::from_millis(750),
            prompt_limits: PromptLimits::default(),
            max_issues: 6,
            placeholder_policy: PlaceholderPolicy::Rank,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            concurrency: env_parse("PIPELINE_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            max_results: env_parse("SEARCH_MAX_RESULTS")?.unwrap_or(defaults.max_results),
            search_timeout: env_parse("SEARCH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.search_timeout),
            llm_timeout: env_parse("LLM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            placeholder_policy: env_parse("PLACEHOLDER_POLICY")?
                .unwrap_or(defaults.placeholder_policy),
            prompt_limits: PromptLimits {
                field_chars: env_parse("PROMPT_MAX_FIELD_CHARS")?
                    .unwrap_or(defaults.prompt_limits.field_chars),
                preference_chars: env_parse("PROMPT_MAX_PREFERENCE_CHARS")?
                    .unwrap_or(defaults.prompt_limits.preference_chars),
                ..defaults.prompt_limits
            },
            ..defaults
        })
    }

    /// Flags win over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(n) = cli.concurrency {
            self.concurrency = n;
        }
        if let Some(n) = cli.max_results {
            self.max_results = n;
        }
        if let Some(policy) = cli.placeholder_policy {
            self.placeholder_policy = policy;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "0", "must be at least 1"));
        }
        if self.max_results == 0 {
            return Err(invalid("max_results", "0", "must be at least 1"));
        }
        if self.prompt_limits.field_chars == 0 || self.prompt_limits.preference_chars == 0 {
            return Err(invalid("prompt limits", "0", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an optional environment variable. Unset or blank is `None`.
fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match dotenv::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, &e.to_string())),
        _ => Ok(None),
    }
}

fn env_text(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Preferences from flag text, flag file, env text, then env file.
/// `None` means the session should ask for them.
pub fn resolve_preferences(cli: &Cli) -> Result<Option<PreferenceProfile>, ConfigError> {
    let text = if let Some(text) = &cli.preferences {
        Some(text.clone())
    } else if let Some(path) = &cli.preferences_file {
        Some(read_text(path)?)
    } else if let Some(text) = env_text("VOTER_PREFERENCES") {
        Some(text)
    } else if let Some(path) = env_text("VOTER_PREFERENCES_FILE") {
        Some(read_text(Path::new(&path))?)
    } else {
        None
    };
    Ok(text.map(PreferenceProfile::new))
}

pub fn ballot_source(cli: &Cli) -> BallotSource {
    if !cli.ballots.is_empty() {
        return BallotSource::Files(cli.ballots.clone());
    }
    let dir = cli
        .ballot_dir
        .clone()
        .or_else(|| env_text("BALLOT_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    BallotSource::Directory(dir)
}

pub struct AppState {
    pub ballot: Arc<Ballot>,
    pub pipeline: Arc<RacePipeline>,
    pub preferences: Option<PreferenceProfile>,
}

impl AppState {
    /// Build everything needed before the first race. Any failure here is fatal.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let provider = match cli.provider {
            Some(p) => p,
            None => env_parse::<Provider>("LLM_PROVIDER")?.unwrap_or(Provider::Anthropic),
        };
        let config = PipelineConfig::from_env()?.apply_cli(cli)?;

        // Credentials first, so a missing key fails before any file is read.
        let model_name = cli.model.clone().or_else(|| env_text("LLM_MODEL"));
        let model = llm::from_env(provider, model_name.as_deref(), config.llm_timeout)?;
        info!(provider = ?provider, model = model.name(), "Language model configured");

        let jurisdiction = cli
            .jurisdiction
            .clone()
            .or_else(|| env_text("BALLOT_JURISDICTION"));
        let ballot = ballot_source(cli).load(jurisdiction.as_deref())?;

        for name in &cli.races {
            if ballot.race(name).is_none() {
                return Err(invalid("race", name, "not on the ballot"));
            }
        }

        let preferences = resolve_preferences(cli)?;
        if preferences.as_ref().is_some_and(|p| p.is_empty()) {
            warn!("Voter preferences are empty; recommendations will not be personalised");
        }

        let search = Arc::new(DuckDuckGo::from_env(config.search_timeout)?);
        let pipeline = RacePipeline::new(search, model, &config);

        Ok(Self {
            ballot: Arc::new(ballot),
            pipeline: Arc::new(pipeline),
            preferences,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["candidate-recommender"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.search_timeout, Duration::from_secs(20));
        assert_eq!(config.llm_timeout, Duration::from_secs(120));
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Rank);
    }

    #[test]
    fn test_flags_override_config() {
        let config = PipelineConfig::default()
            .apply_cli(&cli(&[
                "--concurrency",
                "2",
                "--max-results",
                "8",
                "--placeholder-policy",
                "exclude",
            ]))
            .unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.max_results, 8);
        assert_eq!(config.placeholder_policy, PlaceholderPolicy::Exclude);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = PipelineConfig::default()
            .apply_cli(&cli(&["--concurrency", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "concurrency", .. }));
    }

    #[test]
    fn test_zero_prompt_limit_rejected() {
        let config = PipelineConfig {
            prompt_limits: PromptLimits {
                preference_chars: 0,
                ..PromptLimits::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.apply_cli(&cli(&[])).is_err());
    }

    #[test]
    fn test_preferences_flag_text_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let prefs = resolve_preferences(&cli(&["--preferences", "from flag", "--preferences-file", &path]))
            .unwrap()
            .unwrap();
        assert_eq!(prefs.as_str(), "from flag");

        let prefs = resolve_preferences(&cli(&["--preferences-file", &path]))
            .unwrap()
            .unwrap();
        assert_eq!(prefs.as_str(), "from file");
    }

    #[test]
    fn test_missing_preferences_file_is_config_error() {
        let err = resolve_preferences(&cli(&["--preferences-file", "/nonexistent/prefs.txt"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_positional_ballots_select_file_source() {
        match ballot_source(&cli(&["a.json", "b.json"])) {
            BallotSource::Files(paths) => assert_eq!(paths.len(), 2),
            other => panic!("unexpected source {other:?}"),
        }
        match ballot_source(&cli(&["--ballot-dir", "ballots"])) {
            BallotSource::Directory(dir) => assert_eq!(dir, PathBuf::from("ballots")),
            other => panic!("unexpected source {other:?}"),
        }
    }
}
