//! Lexical ranking used when the similarity service is unavailable.
//!
//! Scores are term frequencies over a searchable text built from the tool's
//! name, description, connector and metadata, plus field bonuses. They are
//! only meaningful relative to each other within one query.

use crate::tools::params::ToolDefinition;
use serde::Serialize;
use std::collections::HashSet;

const NAME_BONUS: f64 = 3.0;
const ACTION_BONUS: f64 = 2.0;
const ENTITY_BONUS: f64 = 2.0;
const VERB_MATCH_BONUS: f64 = 5.0;
const PHRASE_BONUS_PER_TOKEN: f64 = 1.5;
const MIN_TOKEN_LENGTH: usize = 3;

pub const DEFAULT_LIMIT: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "these", "those", "are", "was",
    "were", "has", "have", "had", "can", "could", "should", "would", "will", "all", "any", "our",
    "their", "them", "then", "there", "what", "which", "who", "how", "want", "need", "please",
    "some", "about", "using", "use", "via", "its", "your", "you", "not", "but", "out", "of",
];

/// Canonical action verbs and the query words that mean them.
const ACTION_VERBS: &[(&str, &[&str])] = &[
    ("create", &["create", "add", "new", "make", "insert"]),
    ("update", &["update", "edit", "modify", "change", "patch"]),
    ("delete", &["delete", "remove", "destroy", "erase"]),
    ("list", &["list", "browse", "enumerate"]),
    ("get", &["get", "fetch", "retrieve", "show", "read", "view", "lookup"]),
    ("search", &["search", "find", "query"]),
    ("upload", &["upload", "attach"]),
    ("download", &["download", "export"]),
    ("cancel", &["cancel", "abort"]),
    ("send", &["send", "notify", "post"]),
];

/// A candidate tool with its local score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTool {
    pub name: String,
    pub score: f64,
}

/// Searchable projection of a tool definition.
struct Document {
    name: String,
    name_lower: String,
    action: Option<String>,
    entity: String,
    words: Vec<String>,
    text: String,
}

#[derive(Debug, Clone)]
pub struct LocalRanker {
    stop_words: HashSet<&'static str>,
}

impl Default for LocalRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRanker {
    pub fn new() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Lower-cased, punctuation-free query tokens of at least three
    /// characters, stop words removed.
    pub fn tokenize(&self, query: &str) -> Vec<String> {
        words(query)
            .into_iter()
            .filter(|t| t.chars().count() >= MIN_TOKEN_LENGTH)
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .collect()
    }

    pub fn rank<'a, I>(&self, query: &str, candidates: I, limit: usize) -> Vec<RankedTool>
    where
        I: IntoIterator<Item = &'a ToolDefinition>,
    {
        let tokens = self.tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }
        let phrase = words(query).join(" ");

        let mut ranked: Vec<RankedTool> = candidates
            .into_iter()
            .map(Document::from_definition)
            .filter_map(|doc| {
                let score = score_document(&doc, &tokens, &phrase);
                (score > 0.0).then(|| RankedTool {
                    name: doc.name,
                    score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);

        tracing::debug!(
            query,
            tokens = tokens.len(),
            matched = ranked.len(),
            "Local ranking completed"
        );

        ranked
    }
}

fn score_document(doc: &Document, tokens: &[String], phrase: &str) -> f64 {
    let mut score = 0.0;

    for token in tokens {
        let frequency = doc
            .words
            .iter()
            .filter(|w| word_matches(w, token))
            .count();
        score += frequency as f64;

        if doc.name_lower.contains(token.as_str()) {
            score += NAME_BONUS;
        }
        if let Some(action) = &doc.action {
            if action.contains(token.as_str()) {
                score += ACTION_BONUS;
            }
        }
        if !doc.entity.is_empty() && doc.entity.contains(token.as_str()) {
            score += ENTITY_BONUS;
        }
        if let (Some(verb), Some(action)) = (canonical_verb(token), &doc.action) {
            if verb == action {
                score += VERB_MATCH_BONUS;
            }
        }
    }

    // Only worth a bonus once something already matched.
    if score > 0.0 && !phrase.is_empty() && doc.text.contains(phrase) {
        score += PHRASE_BONUS_PER_TOKEN * phrase.split(' ').count() as f64;
    }

    score
}

/// Prefix match in either direction, so `employee` and `employees` meet.
fn word_matches(word: &str, token: &str) -> bool {
    word.starts_with(token)
        || (word.chars().count() >= MIN_TOKEN_LENGTH && token.starts_with(word))
}

fn canonical_verb(word: &str) -> Option<&'static str> {
    ACTION_VERBS
        .iter()
        .find(|(_, synonyms)| synonyms.contains(&word))
        .map(|(verb, _)| *verb)
}

/// Lower-cased alphanumeric runs; `_` and punctuation separate words.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits `<connector>_<verb>_<entity...>` into (verb, entity).
fn infer_action_entity(name: &str) -> (Option<String>, String) {
    let segments = words(name);
    match segments
        .iter()
        .position(|s| ACTION_VERBS.iter().any(|(verb, _)| *verb == s.as_str()))
    {
        Some(idx) => (
            Some(segments[idx].clone()),
            segments[idx + 1..].join(" "),
        ),
        None => (None, String::new()),
    }
}

impl Document {
    fn from_definition(def: &ToolDefinition) -> Self {
        let (inferred_action, inferred_entity) = infer_action_entity(&def.name);
        let action = def
            .metadata
            .action
            .as_ref()
            .map(|a| a.to_lowercase())
            .or(inferred_action);
        let entity = def
            .metadata
            .entity
            .as_ref()
            .map(|e| e.to_lowercase())
            .unwrap_or(inferred_entity);

        let mut parts = vec![def.name.clone(), def.description.clone(), def.connector()];
        parts.extend(def.metadata.category.iter().cloned());
        parts.extend(action.iter().cloned());
        parts.push(entity.clone());
        parts.extend(def.metadata.tags.iter().cloned());

        let words = words(&parts.join(" "));
        let text = words.join(" ");

        Self {
            name: def.name.clone(),
            name_lower: def.name.to_lowercase(),
            action,
            entity,
            words,
            text,
        }
    }
}
