pub mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub use types::{Ballot, Candidate, Race};

use types::StructuredBallot;

/// Where ballot documents come from.
#[derive(Debug, Clone)]
pub enum BallotSource {
    /// Files named on the command line. Any unreadable file is fatal.
    Files(Vec<PathBuf>),
    /// Every `*.json` in a directory. Files that are not ballots are skipped.
    Directory(PathBuf),
}

impl BallotSource {
    pub fn load(&self, default_jurisdiction: Option<&str>) -> Result<Ballot, ConfigError> {
        let mut races = Vec::new();

        match self {
            BallotSource::Files(paths) => {
                for path in paths {
                    races.extend(read_document(path)?);
                }
            }
            BallotSource::Directory(dir) => {
                for path in discover(dir)? {
                    match read_document(&path) {
                        Ok(found) => races.extend(found),
                        Err(e) => warn!("Skipping {}: {}", path.display(), e),
                    }
                }
            }
        }

        if let Some(default) = default_jurisdiction {
            for race in races.iter_mut().filter(|r| r.jurisdiction.is_none()) {
                race.jurisdiction = Some(default.to_string());
            }
        }

        let ballot = Ballot { races };
        validate(&ballot)?;
        info!(races = ballot.races.len(), "Ballot loaded");
        Ok(ballot)
    }
}

/// List `*.json` files in a directory, sorted by name.
fn discover(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    debug!(dir = %dir.display(), count = paths.len(), "Discovered ballot candidates");
    Ok(paths)
}

/// Parse one ballot document in either accepted shape.
fn read_document(path: &Path) -> Result<Vec<Race>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |source| ConfigError::MalformedBallot {
        path: path.to_path_buf(),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(&text).map_err(malformed)?;

    let races = if is_document_form(&value) {
        let doc: StructuredBallot = serde_json::from_value(value).map_err(malformed)?;
        let jurisdiction = doc.jurisdiction;
        doc.races
            .into_iter()
            .map(|mut race| {
                if race.jurisdiction.is_none() {
                    race.jurisdiction = jurisdiction.clone();
                }
                race
            })
            .collect()
    } else {
        // Map form: race name -> candidate list, in file order.
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_value(value).map_err(malformed)?;
        let mut races = Vec::with_capacity(map.len());
        for (name, candidates) in map {
            let candidates: Vec<Candidate> =
                serde_json::from_value(candidates).map_err(malformed)?;
            races.push(Race::new(name, candidates));
        }
        races
    };

    debug!(path = %path.display(), races = races.len(), "Ballot document parsed");
    Ok(races)
}

/// A `races` array of `{ "name", "candidates": [...] }` objects. Anything else,
/// including a map-form race that happens to be called "races", is the map form.
fn is_document_form(value: &serde_json::Value) -> bool {
    let Some(races) = value.get("races").and_then(|r| r.as_array()) else {
        return false;
    };
    !races.is_empty()
        && races.iter().all(|race| {
            race.get("name").is_some_and(|n| n.is_string())
                && race.get("candidates").is_some_and(|c| c.is_array())
        })
}

/// Schema checks the pipeline relies on.
fn validate(ballot: &Ballot) -> Result<(), ConfigError> {
    if ballot.is_empty() {
        return Err(ConfigError::InvalidBallot("no races found".to_string()));
    }

    let mut race_names = HashSet::new();
    for race in &ballot.races {
        if race.name.trim().is_empty() {
            return Err(ConfigError::InvalidBallot("race with an empty name".to_string()));
        }
        if !race_names.insert(race.name.as_str()) {
            return Err(ConfigError::InvalidBallot(format!(
                "race '{}' is defined more than once",
                race.name
            )));
        }
        if race.candidates.is_empty() {
            return Err(ConfigError::InvalidBallot(format!(
                "race '{}' has no candidates",
                race.name
            )));
        }

        let mut candidate_names = HashSet::new();
        for candidate in &race.candidates {
            let key = candidate.name.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::InvalidBallot(format!(
                    "race '{}' has a candidate with an empty name",
                    race.name
                )));
            }
            if !candidate_names.insert(key) {
                return Err(ConfigError::InvalidBallot(format!(
                    "candidate '{}' is listed twice in race '{}'",
                    candidate.name, race.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_map_form_keeps_file_order_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "nc.json",
            r#"{
                "US Senate": [
                    {"candidates": "Jane Roe", "party": "DEM", "incumbent": "yes"},
                    {"candidates": "John Doe", "party": "REP"}
                ],
                "Attorney General": [
                    {"candidates": "Sam Poe", "party": "LIB"}
                ]
            }"#,
        );

        let ballot = BallotSource::Files(vec![path]).load(None).unwrap();
        let names: Vec<&str> = ballot.races.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["US Senate", "Attorney General"]);

        let senate = ballot.race("US Senate").unwrap();
        assert_eq!(senate.candidates[0].name, "Jane Roe");
        assert_eq!(senate.candidates[0].party.as_deref(), Some("DEM"));
        assert_eq!(senate.candidates[0].metadata_lines(), vec!["incumbent: yes"]);
    }

    #[test]
    fn test_structured_form_propagates_jurisdiction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "city.json",
            r#"{
                "jurisdiction": "Raleigh, NC",
                "races": [
                    {"name": "Mayor", "description": "City executive",
                     "candidates": [{"name": "Alice"}, {"name": "Bob", "party": "IND"}]}
                ]
            }"#,
        );

        let ballot = BallotSource::Files(vec![path]).load(Some("North Carolina")).unwrap();
        let mayor = ballot.race("Mayor").unwrap();
        assert_eq!(mayor.jurisdiction.as_deref(), Some("Raleigh, NC"));
        assert_eq!(mayor.office(), "Mayor: City executive");
        assert_eq!(mayor.candidates[1].label(), "Bob (IND)");
    }

    #[test]
    fn test_map_form_race_named_races() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "odd.json",
            r#"{
                "races": [{"candidates": "Pat Lee", "party": "DEM"}],
                "Mayor": [{"name": "Alice"}]
            }"#,
        );

        let ballot = BallotSource::Files(vec![path]).load(None).unwrap();
        let names: Vec<&str> = ballot.races.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["races", "Mayor"]);
        assert_eq!(ballot.race("races").unwrap().candidates[0].name, "Pat Lee");
    }

    #[test]
    fn test_default_jurisdiction_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.json", r#"{"Mayor": [{"name": "Alice"}]}"#);

        let ballot = BallotSource::Files(vec![path]).load(Some("North Carolina")).unwrap();
        assert_eq!(ballot.races[0].jurisdiction.as_deref(), Some("North Carolina"));
    }

    #[test]
    fn test_explicit_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", "{ not json");

        let err = BallotSource::Files(vec![path]).load(None).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedBallot { .. }));
    }

    #[test]
    fn test_directory_skips_non_ballots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"Mayor": [{"candidates": "Alice"}]}"#);
        write(dir.path(), "b.json", r#"{"name": "not-a-ballot", "version": 3}"#);
        write(dir.path(), "notes.txt", "ignored");

        let ballot = BallotSource::Directory(dir.path().to_path_buf()).load(None).unwrap();
        assert_eq!(ballot.races.len(), 1);
        assert_eq!(ballot.races[0].name, "Mayor");
    }

    #[test]
    fn test_duplicate_race_across_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"Mayor": [{"name": "Alice"}]}"#);
        let b = write(dir.path(), "b.json", r#"{"Mayor": [{"name": "Bob"}]}"#);

        let err = BallotSource::Files(vec![a, b]).load(None).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_race_without_candidates_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.json", r#"{"Mayor": []}"#);

        let err = BallotSource::Files(vec![path]).load(None).unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[test]
    fn test_duplicate_candidate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a.json",
            r#"{"Mayor": [{"name": "Alice"}, {"name": "alice "}]}"#,
        );

        let err = BallotSource::Files(vec![path]).load(None).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BallotSource::Directory(dir.path().to_path_buf()).load(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBallot(_)));
    }
}
