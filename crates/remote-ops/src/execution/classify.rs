//! Failure classification
//!
//! The executor's deadline is recognised structurally and always wins.
//! Everything else is an ordered list of vocabulary rules matched against the
//! lowercased failure name and message; the first matching rule decides.

use once_cell::sync::Lazy;

use super::error::{AttemptError, Classification, ErrorClass};

/// Network-indicative vocabulary
pub const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "connection",
    "connect error",
    "unreachable",
    "dns",
    "name resolution",
    "could not resolve",
    "socket",
    "fetch failed",
    "failed to fetch",
    "fetch-failed",
    "offline",
    "econnrefused",
    "econnreset",
    "enotfound",
    "broken pipe",
];

/// Client or semantic rejections, reported without retrying
pub const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "permission denied",
    "invalid",
    "malformed",
    "bad request",
    "not found",
    "conflict",
    "already exists",
    "duplicate key",
    "violates",
    "jwt expired",
];

/// One vocabulary rule
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    pub class: ErrorClass,
    patterns: Vec<String>,
}

impl ClassificationRule {
    pub fn new<I, S>(name: impl Into<String>, class: ErrorClass, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            class,
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Both inputs must already be lowercased
    fn matches(&self, name: &str, message: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| message.contains(p.as_str()) || name.contains(p.as_str()))
    }
}

/// Ordered rule list; anything unmatched is [`ErrorClass::Unknown`]
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            rules: vec![
                ClassificationRule::new("network", ErrorClass::Network, NETWORK_PATTERNS),
                ClassificationRule::new(
                    "rejection",
                    ErrorClass::NonRetryable,
                    NON_RETRYABLE_PATTERNS,
                ),
            ],
        }
    }
}

impl Classifier {
    /// Classifier with no vocabulary rules; only deadlines are recognised
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule after the existing ones
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule at `index` (clamped), ahead of later rules
    pub fn insert_rule(&mut self, index: usize, rule: ClassificationRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, error: &AttemptError) -> Classification {
        let name = error.name().map(str::to_string);
        let message = error.message();

        if let AttemptError::Deadline(_) = error {
            return Classification::new(ErrorClass::Timeout, name, message);
        }

        let lower_name = name.as_deref().unwrap_or_default().to_lowercase();
        let lower_message = message.to_lowercase();

        let class = self
            .rules
            .iter()
            .find(|rule| rule.matches(&lower_name, &lower_message))
            .map(|rule| rule.class)
            .unwrap_or(ErrorClass::Unknown);

        Classification::new(class, name, message)
    }
}

static DEFAULT_CLASSIFIER: Lazy<Classifier> = Lazy::new(Classifier::default);

/// Classify with the default rules
pub fn classify(error: &AttemptError) -> Classification {
    DEFAULT_CLASSIFIER.classify(error)
}
