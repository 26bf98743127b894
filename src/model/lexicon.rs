//! Bag-of-words linear sentiment classifier.
//!
//! Weight file layout:
//! ```json
//! {
//!   "labels": ["negative", "neutral", "positive"],
//!   "bias": [0.0, 0.2, 0.0],
//!   "weights": { "great": [-1.2, -0.3, 2.1] },
//!   "max_input_tokens": 512
//! }
//! ```
//! Logits are `bias + Σ weights[token]` over known tokens; the score is the
//! softmax probability of the winning label.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::model::{read_json, Classification, Classifier, ModelError};

fn default_max_input_tokens() -> usize {
    512
}

#[derive(Debug, Deserialize)]
struct LexiconFile {
    labels: Vec<String>,
    bias: Vec<f64>,
    weights: HashMap<String, Vec<f64>>,
    #[serde(default = "default_max_input_tokens")]
    max_input_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    labels: Vec<String>,
    bias: Vec<f64>,
    weights: HashMap<String, Vec<f64>>,
    max_input_tokens: usize,
}

impl LexiconClassifier {
    /// Load and validate weights from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file: LexiconFile = read_json(path)?;
        Self::new(file.labels, file.bias, file.weights, file.max_input_tokens)
    }

    pub fn new(
        labels: Vec<String>,
        bias: Vec<f64>,
        weights: HashMap<String, Vec<f64>>,
        max_input_tokens: usize,
    ) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::InvalidWeights("no labels defined".into()));
        }
        if bias.len() != labels.len() {
            return Err(ModelError::InvalidWeights(format!(
                "bias has {} entries for {} labels",
                bias.len(),
                labels.len()
            )));
        }
        if let Some((token, row)) = weights.iter().find(|(_, row)| row.len() != labels.len()) {
            return Err(ModelError::InvalidWeights(format!(
                "token {token:?} has {} weights for {} labels",
                row.len(),
                labels.len()
            )));
        }

        // Lookups happen on lowercased tokens.
        let weights = weights
            .into_iter()
            .map(|(token, row)| (token.to_lowercase(), row))
            .collect();

        Ok(Self {
            labels,
            bias,
            weights,
            max_input_tokens,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn vocabulary_size(&self) -> usize {
        self.weights.len()
    }
}

impl Classifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Result<Classification, ModelError> {
        let tokens = tokenize(text);
        if tokens.len() > self.max_input_tokens {
            return Err(ModelError::InputTooLong {
                tokens: tokens.len(),
                limit: self.max_input_tokens,
            });
        }

        let mut logits = self.bias.clone();
        for token in &tokens {
            if let Some(row) = self.weights.get(token) {
                for (logit, weight) in logits.iter_mut().zip(row) {
                    *logit += weight;
                }
            }
        }

        let probabilities = softmax(&logits);
        let (best, score) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        Ok(Classification {
            label: self.labels[best].clone(),
            score,
        })
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(max_input_tokens: usize) -> LexiconClassifier {
        let weights = HashMap::from([
            ("great".to_string(), vec![-1.0, 0.0, 2.0]),
            ("Awful".to_string(), vec![2.0, 0.0, -1.0]),
        ]);
        LexiconClassifier::new(
            vec!["negative".into(), "neutral".into(), "positive".into()],
            vec![0.0, 0.5, 0.0],
            weights,
            max_input_tokens,
        )
        .unwrap()
    }

    #[test]
    fn picks_label_with_highest_probability() {
        let model = classifier(16);

        let positive = model.classify("What a GREAT day!").unwrap();
        assert_eq!(positive.label, "positive");
        assert!(positive.score > 0.5 && positive.score <= 1.0);

        let negative = model.classify("awful, just awful").unwrap();
        assert_eq!(negative.label, "negative");
    }

    #[test]
    fn unknown_words_fall_back_to_bias() {
        let result = classifier(16).classify("the weather report").unwrap();
        assert_eq!(result.label, "neutral");
    }

    #[test]
    fn rejects_input_over_token_limit() {
        let err = classifier(3).classify("one two three four").unwrap_err();
        assert!(matches!(err, ModelError::InputTooLong { tokens: 4, limit: 3 }));
        assert_eq!(
            err.to_string(),
            "input has 4 tokens, exceeding the model limit of 3"
        );
    }

    #[test]
    fn rejects_mismatched_weight_rows() {
        let err = LexiconClassifier::new(
            vec!["a".into(), "b".into()],
            vec![0.0, 0.0],
            HashMap::from([("x".to_string(), vec![1.0])]),
            8,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidWeights(_)));
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }
}
