//! Story catalog: the programs that can be played.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Immutable catalog entry for one playable story file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Program {
    /// Unique display name.
    pub name: String,
    /// Path to the story file handed to the interpreter.
    pub path: PathBuf,
    /// Alternative names accepted by `play`.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Author credit.
    #[serde(default)]
    pub author: Option<String>,
    /// Where players can read more about the story.
    #[serde(default)]
    pub url: Option<String>,
}

impl Program {
    fn answers_to(&self, query: &str) -> bool {
        self.name.eq_ignore_ascii_case(query)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(query))
    }
}

/// Result of looking a story up by user-supplied text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Exactly one story matched.
    Found(&'a Program),
    /// Several stories contain the query; their names, sorted.
    Ambiguous(Vec<&'a str>),
    /// Nothing matched.
    Missing,
}

/// Read-only set of playable stories, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    programs: Vec<Program>,
}

impl Catalog {
    /// Build a catalog, delisting entries whose story file does not exist
    /// and later entries that reuse an earlier name.
    #[must_use]
    pub fn from_programs(programs: Vec<Program>) -> Self {
        let mut kept: Vec<Program> = Vec::with_capacity(programs.len());
        for program in programs {
            if !program.path.is_file() {
                warn!(program = %program.name, path = %program.path.display(), "story file missing; delisting");
                continue;
            }
            if kept.iter().any(|p| p.name.eq_ignore_ascii_case(&program.name)) {
                warn!(program = %program.name, "duplicate story name; delisting");
                continue;
            }
            kept.push(program);
        }
        kept.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Self { programs: kept }
    }

    /// Find a story by name or alias.
    ///
    /// An exact (case-insensitive) name or alias match wins. Otherwise the
    /// query is matched as a substring of story names.
    #[must_use]
    pub fn lookup(&self, query: &str) -> Lookup<'_> {
        let query = query.trim();
        if query.is_empty() {
            return Lookup::Missing;
        }

        if let Some(program) = self.programs.iter().find(|p| p.answers_to(query)) {
            return Lookup::Found(program);
        }

        let needle = query.to_lowercase();
        let partial: Vec<&Program> = self
            .programs
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect();

        match partial.as_slice() {
            [] => Lookup::Missing,
            [only] => Lookup::Found(only),
            many => Lookup::Ambiguous(many.iter().map(|p| p.name.as_str()).collect()),
        }
    }

    /// Story with exactly this name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|p| p.name == name)
    }

    /// All stories, sorted by name.
    #[must_use]
    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// Number of listed stories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
