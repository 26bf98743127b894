//! Greedy bigram text generator.
//!
//! Weight file layout:
//! ```json
//! {
//!   "context_size": 1024,
//!   "transitions": { "once": { "upon": 12 }, "upon": { "a": 9 } }
//! }
//! ```
//! Decoding always takes the most frequent successor of the last token;
//! ties go to the lexicographically smallest candidate so output is stable.
//! The output never exceeds `max_length` tokens: a longer prompt is cut to
//! its first `max_length` tokens and nothing is appended.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::model::{read_json, Generation, Generator, ModelError};

fn default_context_size() -> usize {
    1024
}

#[derive(Debug, Deserialize)]
struct BigramFile {
    #[serde(default = "default_context_size")]
    context_size: usize,
    transitions: HashMap<String, HashMap<String, u32>>,
}

#[derive(Debug, Clone)]
pub struct BigramGenerator {
    /// Best successor for each (lowercased) token, resolved at load time.
    next: HashMap<String, String>,
    context_size: usize,
}

impl BigramGenerator {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file: BigramFile = read_json(path)?;
        Self::new(file.transitions, file.context_size)
    }

    pub fn new(
        transitions: HashMap<String, HashMap<String, u32>>,
        context_size: usize,
    ) -> Result<Self, ModelError> {
        if context_size == 0 {
            return Err(ModelError::InvalidWeights("context_size must be positive".into()));
        }

        let next = transitions
            .into_iter()
            .filter_map(|(token, successors)| {
                successors
                    .into_iter()
                    .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
                    .map(|(successor, _)| (normalize(&token), successor))
            })
            .collect();

        Ok(Self { next, context_size })
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn vocabulary_size(&self) -> usize {
        self.next.len()
    }
}

impl Generator for BigramGenerator {
    fn generate(&self, prompt: &str, max_length: usize) -> Result<Generation, ModelError> {
        if max_length > self.context_size {
            return Err(ModelError::ContextExceeded {
                requested: max_length,
                limit: self.context_size,
            });
        }

        let mut tokens: Vec<String> = prompt
            .split_whitespace()
            .take(max_length)
            .map(str::to_string)
            .collect();
        while tokens.len() < max_length {
            let successor = tokens
                .last()
                .and_then(|last| self.next.get(&normalize(last)));
            match successor {
                Some(token) => tokens.push(token.clone()),
                None => break,
            }
        }

        Ok(Generation {
            generated_text: tokens.join(" "),
        })
    }
}

fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
