//! Error categories and the weighted pattern matcher.
//!
//! Every category carries an ordered list of [`PatternRule`]s. Matching sums
//! the weights of all rules whose pattern matches the selected field; the
//! category with the strictly highest score wins and ties keep declaration
//! order. A zero score everywhere yields the synthetic `uncategorized`
//! category.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use triage_alerts::Severity;

use crate::condition::Condition;
use crate::error::{IncidentError, Result};
use crate::types::{ErrorContext, ErrorReport};

/// Id of the fallback category.
pub const UNCATEGORIZED_ID: &str = "uncategorized";

/// The built-in rule table.
pub const BUILTIN_RULES: &str = include_str!("../rules/builtin.toml");

/// Which part of an error a pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// Error message.
    Message,
    /// Stack trace.
    Stack,
    /// Error type name.
    Name,
    /// Flattened context.
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PatternDef {
    Literal(String),
    Regex(String),
}

/// A literal substring or compiled regex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternDef", into = "PatternDef")]
pub enum Pattern {
    /// Case-insensitive substring; stored lowercased.
    Literal(String),
    /// Regular expression.
    Regex(Regex),
}

impl Pattern {
    /// Creates a literal pattern.
    #[must_use]
    pub fn literal(text: &str) -> Self {
        Self::Literal(text.to_lowercase())
    }

    /// Compiles a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn regex(source: &str) -> std::result::Result<Self, regex::Error> {
        Regex::new(source).map(Self::Regex)
    }

    /// Tests the pattern against text.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Literal(needle) => !needle.is_empty() && text.to_lowercase().contains(needle),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl TryFrom<PatternDef> for Pattern {
    type Error = regex::Error;

    fn try_from(def: PatternDef) -> std::result::Result<Self, Self::Error> {
        match def {
            PatternDef::Literal(text) => Ok(Self::literal(&text)),
            PatternDef::Regex(source) => Self::regex(&source),
        }
    }
}

impl From<Pattern> for PatternDef {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Literal(text) => Self::Literal(text),
            Pattern::Regex(re) => Self::Regex(re.as_str().to_string()),
        }
    }
}

/// One weighted pattern of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Field the pattern is tested against.
    pub field: MatchField,
    /// The pattern.
    pub pattern: Pattern,
    /// Score added when the pattern matches.
    pub weight: u32,
}

/// Configuration of an `alert` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Explicit channels; severity routing when absent.
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    /// Marks the alert as needing immediate attention.
    #[serde(default)]
    pub immediate: bool,
}

/// Configuration of a `create_issue` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueConfig {
    /// Tracker project.
    pub project: String,
    /// Issue priority.
    #[serde(default)]
    pub priority: Severity,
    /// Issue labels.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Configuration of an `auto_fix` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFixConfig {
    /// Name of the remediation strategy.
    pub strategy: String,
    /// Strategy parameters.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Send an alert.
    Alert(AlertConfig),
    /// File an issue (first sighting only).
    CreateIssue(IssueConfig),
    /// Record remediation intent.
    AutoFix(AutoFixConfig),
    /// Mark the incident ignored.
    Ignore,
}

impl ActionKind {
    /// Returns the action type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alert(_) => "alert",
            Self::CreateIssue(_) => "create_issue",
            Self::AutoFix(_) => "auto_fix",
            Self::Ignore => "ignore",
        }
    }
}

/// A category action with an optional guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The action.
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Guard condition; the action is skipped unless it holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Action {
    /// Creates an unguarded action.
    #[must_use]
    pub const fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            condition: None,
        }
    }

    /// Adds a guard condition.
    #[must_use]
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(Condition::new(condition));
        self
    }
}

/// A rule-defined bucket for errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCategory {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Base severity of incidents in this category.
    pub priority: Severity,
    /// Weighted patterns, in declaration order.
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
    /// Actions, in declaration order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ErrorCategory {
    /// The fallback category for unmatched errors.
    #[must_use]
    pub fn uncategorized() -> Self {
        Self {
            id: UNCATEGORIZED_ID.to_string(),
            name: "Uncategorized".to_string(),
            description: "Errors that matched no category".to_string(),
            priority: Severity::Medium,
            patterns: Vec::new(),
            actions: vec![Action::new(ActionKind::CreateIssue(IssueConfig {
                project: "triage".to_string(),
                priority: Severity::Low,
                labels: vec!["uncategorized".to_string()],
            }))],
        }
    }

    /// Sums the weights of matching patterns.
    #[must_use]
    pub fn score(&self, error: &ErrorReport, context_text: &str) -> u32 {
        self.patterns
            .iter()
            .filter(|rule| {
                let text = match rule.field {
                    MatchField::Message => error.message.as_str(),
                    MatchField::Stack => error.stack.as_str(),
                    MatchField::Name => error.name.as_str(),
                    MatchField::Context => context_text,
                };
                rule.pattern.is_match(text)
            })
            .map(|rule| rule.weight)
            .sum()
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    categories: Vec<ErrorCategory>,
}

/// An immutable, ordered set of categories.
#[derive(Debug, Clone)]
pub struct CategoryRuleSet {
    categories: Vec<Arc<ErrorCategory>>,
    uncategorized: Arc<ErrorCategory>,
}

impl CategoryRuleSet {
    /// Builds a rule set from categories.
    ///
    /// # Errors
    ///
    /// Returns `IncidentError::InvalidRules` for empty or duplicate ids and
    /// `IncidentError::InvalidCondition` for guards that do not parse.
    pub fn new(categories: Vec<ErrorCategory>) -> Result<Self> {
        let mut seen = HashSet::new();
        for category in &categories {
            if category.id.trim().is_empty() {
                return Err(IncidentError::InvalidRules {
                    reason: "category id cannot be empty".to_string(),
                });
            }
            if category.id == UNCATEGORIZED_ID {
                return Err(IncidentError::InvalidRules {
                    reason: format!("category id '{UNCATEGORIZED_ID}' is reserved"),
                });
            }
            if !seen.insert(category.id.as_str()) {
                return Err(IncidentError::InvalidRules {
                    reason: format!("duplicate category id '{}'", category.id),
                });
            }
            for action in &category.actions {
                if let Some(condition) = &action.condition {
                    condition.validate()?;
                }
            }
        }

        Ok(Self {
            categories: categories.into_iter().map(Arc::new).collect(),
            uncategorized: Arc::new(ErrorCategory::uncategorized()),
        })
    }

    /// Loads the built-in rule table.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded table is malformed.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_RULES)
    }

    /// Parses a TOML rule table (`[[categories]]` entries).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML or any pattern or condition is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(content)?;
        Self::new(file.categories)
    }

    /// Loads a TOML rule table from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let rules = Self::from_toml(&content)?;
        info!(path = %path.display(), categories = rules.len(), "loaded category rules");
        Ok(rules)
    }

    /// Number of declared categories (excluding the fallback).
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns true if no categories are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Declared categories in order.
    pub fn categories(&self) -> impl Iterator<Item = &Arc<ErrorCategory>> {
        self.categories.iter()
    }

    /// Looks up a category by id, including the fallback.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ErrorCategory>> {
        if id == UNCATEGORIZED_ID {
            return Some(Arc::clone(&self.uncategorized));
        }
        self.categories.iter().find(|c| c.id == id).cloned()
    }

    /// Returns the fallback category.
    #[must_use]
    pub fn uncategorized(&self) -> Arc<ErrorCategory> {
        Arc::clone(&self.uncategorized)
    }

    /// Scores every category, in declaration order.
    #[must_use]
    pub fn score_all(&self, error: &ErrorReport, context: &ErrorContext) -> Vec<(String, u32)> {
        let context_text = context.text();
        self.categories
            .iter()
            .map(|c| (c.id.clone(), c.score(error, &context_text)))
            .collect()
    }

    /// Selects the best category for an error.
    #[must_use]
    pub fn match_error(&self, error: &ErrorReport, context: &ErrorContext) -> Arc<ErrorCategory> {
        let context_text = context.text();
        let mut best: Option<(&Arc<ErrorCategory>, u32)> = None;

        for category in &self.categories {
            let score = category.score(error, &context_text);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((category, score));
            }
        }

        match best {
            Some((category, score)) => {
                debug!(category = %category.id, score, "matched error category");
                Arc::clone(category)
            }
            None => {
                debug!(error_name = %error.name, "no category matched");
                self.uncategorized()
            }
        }
    }

    /// Uses `hint` if it names a known category, otherwise matches.
    #[must_use]
    pub fn categorize(
        &self,
        error: &ErrorReport,
        context: &ErrorContext,
        hint: Option<&str>,
    ) -> Arc<ErrorCategory> {
        if let Some(category) = hint.and_then(|id| self.get(id)) {
            debug!(category = %category.id, "using category hint");
            return category;
        }
        self.match_error(error, context)
    }
}
