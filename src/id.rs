use std::collections::HashSet;

use rand::{Rng, distr::Alphanumeric};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ComposerConfig;

pub const DEFAULT_MATCHER: &str = "ID";
pub const DEFAULT_FALLBACK_PREFIX: &str = "resource";
const DEFAULT_SUFFIX_LEN: usize = 7;
/// Fresh suffixes tried before a colliding candidate gets a counter appended.
const MAX_SUFFIX_ATTEMPTS: usize = 64;

/// Produces the unique part of a generated identifier.
pub trait SuffixSource {
    fn next_suffix(&mut self) -> String;
}

/// Random lowercase alphanumeric suffixes.
#[derive(Debug, Clone)]
pub struct RandomSuffix {
    len: usize,
}

impl RandomSuffix {
    pub fn new(len: usize) -> Self {
        RandomSuffix { len: len.max(1) }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        RandomSuffix::new(DEFAULT_SUFFIX_LEN)
    }
}

impl SuffixSource for RandomSuffix {
    fn next_suffix(&mut self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect()
    }
}

/// Counter-based suffixes (`1`, `2`, ...), for reproducible output.
#[derive(Debug, Clone, Default)]
pub struct SequentialSuffix {
    next: u64,
}

impl SuffixSource for SequentialSuffix {
    fn next_suffix(&mut self) -> String {
        self.next += 1;
        self.next.to_string()
    }
}

/// Replaces `{{<matcher>}}` id placeholders with `<type>_<suffix>` identifiers.
pub struct IdGenerator {
    matcher: String,
    fallback_prefix: String,
    source: Box<dyn SuffixSource>,
    issued: HashSet<String>,
}

impl IdGenerator {
    pub fn new(source: Box<dyn SuffixSource>) -> Self {
        IdGenerator {
            matcher: DEFAULT_MATCHER.to_string(),
            fallback_prefix: DEFAULT_FALLBACK_PREFIX.to_string(),
            source,
            issued: HashSet::new(),
        }
    }

    pub fn random() -> Self {
        IdGenerator::new(Box::new(RandomSuffix::default()))
    }

    /// Random generator honouring the configured matcher, prefix and suffix length.
    pub fn from_config(config: &ComposerConfig) -> Self {
        IdGenerator::new(Box::new(RandomSuffix::new(config.id_suffix_length)))
            .with_matcher(&config.id_placeholder)
            .with_fallback_prefix(&config.fallback_id_prefix)
    }

    pub fn sequential() -> Self {
        IdGenerator::new(Box::new(SequentialSuffix::default()))
    }

    pub fn with_matcher(mut self, matcher: impl Into<String>) -> Self {
        self.matcher = matcher.into();
        self
    }

    pub fn with_fallback_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fallback_prefix = prefix.into();
        self
    }

    pub fn matcher(&self) -> &str {
        &self.matcher
    }

    /// The exact placeholder string this generator replaces, e.g. `{{ID}}`.
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.matcher)
    }

    pub fn is_placeholder(&self, candidate: &str) -> bool {
        candidate == self.placeholder()
    }

    /// Generate a fresh id for `kind`, distinct from every id this generator
    /// has issued and from `reserved`.
    pub fn next_id(&mut self, kind: Option<&str>, reserved: &HashSet<String>) -> String {
        let prefix = kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.fallback_prefix.clone());
        let mut candidate = String::new();
        for _ in 0..MAX_SUFFIX_ATTEMPTS {
            candidate = format!("{prefix}_{}", self.source.next_suffix());
            if self.is_free(&candidate, reserved) {
                return self.issue(candidate);
            }
        }
        debug!(prefix = %prefix, "suffix space exhausted, appending a counter");
        let mut counter = 2u64;
        let disambiguated = loop {
            let next = format!("{candidate}_{counter}");
            if self.is_free(&next, reserved) {
                break next;
            }
            counter += 1;
        };
        self.issue(disambiguated)
    }

    fn is_free(&self, candidate: &str, reserved: &HashSet<String>) -> bool {
        !self.issued.contains(candidate) && !reserved.contains(candidate)
    }

    fn issue(&mut self, id: String) -> String {
        self.issued.insert(id.clone());
        id
    }

    /// Number of ids handed out since creation or the last [`IdGenerator::reset`].
    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    /// Forget previously issued ids. Uniqueness then only holds against
    /// `reserved` and ids issued after the reset.
    pub fn reset(&mut self) {
        self.issued.clear();
    }

    /// Return a deep copy of `value` with every placeholder `id` replaced.
    pub fn generate(&mut self, value: &Value) -> Value {
        self.generate_avoiding(value, &HashSet::new())
    }

    /// Like [`IdGenerator::generate`], never issuing an id found in `reserved`.
    pub fn generate_avoiding(&mut self, value: &Value, reserved: &HashSet<String>) -> Value {
        let placeholder = self.placeholder();
        self.replace(value, &placeholder, reserved)
    }

    fn replace(&mut self, value: &Value, placeholder: &str, reserved: &HashSet<String>) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.replace(item, placeholder, reserved))
                    .collect(),
            ),
            Value::Object(map) => {
                let kind = map.get("type").and_then(Value::as_str);
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let replaced = match item {
                        Value::String(s) if key == "id" && s == placeholder => {
                            Value::String(self.next_id(kind, reserved))
                        }
                        _ => self.replace(item, placeholder, reserved),
                    };
                    out.insert(key.clone(), replaced);
                }
                Value::Object(out)
            }
            _ => value.clone(),
        }
    }
}

/// Collect every string `id` found anywhere in `value`.
pub fn collect_ids(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_ids(item, out)),
        Value::Object(map) => {
            for (key, item) in map {
                match item {
                    Value::String(s) if key == "id" => {
                        out.insert(s.clone());
                    }
                    _ => collect_ids(item, out),
                }
            }
        }
        _ => {}
    }
}

/// One-shot placeholder expansion with random suffixes.
pub fn replace_placeholder_ids(value: &Value, matcher: &str) -> Value {
    IdGenerator::random().with_matcher(matcher).generate(value)
}
