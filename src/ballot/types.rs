use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One person or option listed under a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Map-form ballots key the name as `candidates`.
    #[serde(alias = "candidates")]
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    /// Any other fields the ballot source supplied, kept verbatim.
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, party: Option<&str>) -> Self {
        Self {
            name: name.into(),
            party: party.map(str::to_string),
            metadata: BTreeMap::new(),
        }
    }

    /// "Name (Party)" or just the name.
    pub fn label(&self) -> String {
        match self.party.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(party) => format!("{} ({})", self.name, party),
            None => self.name.clone(),
        }
    }

    /// Metadata rendered as `key: value` lines for prompts.
    pub fn metadata_lines(&self) -> Vec<String> {
        self.metadata
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect()
    }
}

/// A single contest on the ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Filled from the ballot document when not set per race.
    #[serde(default)]
    pub jurisdiction: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl Race {
    pub fn new(name: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            jurisdiction: None,
            candidates,
        }
    }

    pub fn with_jurisdiction(mut self, jurisdiction: impl Into<String>) -> Self {
        self.jurisdiction = Some(jurisdiction.into());
        self
    }

    /// Office name followed by its description, if any.
    pub fn office(&self) -> String {
        if self.description.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.description.trim())
        }
    }
}

/// Merged contents of every loaded ballot document.
#[derive(Debug, Clone, Default)]
pub struct Ballot {
    pub races: Vec<Race>,
}

impl Ballot {
    pub fn race(&self, name: &str) -> Option<&Race> {
        self.races.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.races.is_empty()
    }
}

/// Document form: `{ "jurisdiction": ..., "races": [...] }`.
#[derive(Debug, Deserialize)]
pub(crate) struct StructuredBallot {
    #[serde(default)]
    pub jurisdiction: Option<String>,
    pub races: Vec<Race>,
}
