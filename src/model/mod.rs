//! Model capability subsystem.
//!
//! # Data Flow
//! ```text
//! MODEL_DIR/sentiment.json → lexicon.rs (LexiconClassifier) ─┐
//! MODEL_DIR/generator.json → bigram.rs  (BigramGenerator)  ──┴→ Models (Arc, read-only)
//!                                                                 → http handlers
//! ```
//!
//! # Design Decisions
//! - Handlers only see the `Classifier` / `Generator` traits; backends are swappable
//! - Models are loaded once at startup and never mutated afterwards
//! - Every backend failure is a `ModelError`; the HTTP layer decides the status code

pub mod bigram;
pub mod lexicon;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

pub use bigram::BigramGenerator;
pub use lexicon::LexiconClassifier;

/// Output of a classification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

/// Output of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    #[serde(rename = "generatedText")]
    pub generated_text: String,
}

/// Errors raised by model backends, at load time or during inference.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model weights: {0}")]
    InvalidWeights(String),

    #[error("input has {tokens} tokens, exceeding the model limit of {limit}")]
    InputTooLong { tokens: usize, limit: usize },

    #[error("max_length {requested} exceeds the model context size of {limit}")]
    ContextExceeded { requested: usize, limit: usize },
}

/// Text classification capability.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification, ModelError>;
}

/// Text generation capability.
pub trait Generator: Send + Sync {
    /// Continue `prompt` until the whole sequence holds `max_length` tokens.
    fn generate(&self, prompt: &str, max_length: usize) -> Result<Generation, ModelError>;
}

/// The loaded capabilities shared by every request.
#[derive(Clone)]
pub struct Models {
    pub classifier: Arc<dyn Classifier>,
    pub generator: Arc<dyn Generator>,
}

impl Models {
    /// Load both backends from their weight files.
    pub fn load(classifier: &Path, generator: &Path) -> Result<Self, ModelError> {
        let classifier = LexiconClassifier::load(classifier)?;
        tracing::info!(
            labels = ?classifier.labels(),
            vocabulary = classifier.vocabulary_size(),
            "Classifier loaded"
        );

        let generator = BigramGenerator::load(generator)?;
        tracing::info!(
            vocabulary = generator.vocabulary_size(),
            context_size = generator.context_size(),
            "Generator loaded"
        );

        Ok(Self {
            classifier: Arc::new(classifier),
            generator: Arc::new(generator),
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ModelError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
