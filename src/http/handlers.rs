//! Inference endpoints.
//!
//! Both routes share one pipeline: log the input, validate it, run the model
//! on the blocking pool, and map the outcome to a JSON response.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::http::error::{panic_message, ApiError};
use crate::model::{Classification, Generation, ModelError, Models};

/// Default `max_length` for `/generate/`.
pub const DEFAULT_MAX_LENGTH: i64 = 50;

/// One model-backed endpoint.
pub trait InferenceOperation: 'static {
    type Params: Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Name of the input parameter, used in logs.
    const INPUT: &'static str;
    /// Detail returned when the input is empty.
    const MISSING_INPUT: &'static str;

    fn input(params: &Self::Params) -> &str;

    /// Extra validation beyond the non-empty input check.
    fn check(_params: &Self::Params) -> Result<(), ApiError> {
        Ok(())
    }

    fn run(models: &Models, params: Self::Params) -> Result<Self::Output, ModelError>;
}

pub async fn infer<Op: InferenceOperation>(
    models: Models,
    params: Op::Params,
) -> Result<Json<Op::Output>, ApiError> {
    let input = Op::input(&params);
    tracing::info!("Received {}: {}", Op::INPUT, input);

    if input.is_empty() {
        return Err(ApiError::InvalidInput(Op::MISSING_INPUT.to_string()));
    }
    Op::check(&params)?;

    let span = Span::current();
    let outcome = tokio::task::spawn_blocking(move || span.in_scope(|| Op::run(&models, params))).await;

    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Inference failed");
            return Err(e.into());
        }
        Err(join) => {
            let detail = if join.is_panic() {
                panic_message(join.into_panic().as_ref()).to_string()
            } else {
                join.to_string()
            };
            tracing::error!(error = %detail, "Inference task aborted");
            return Err(ApiError::InferenceFailure(detail));
        }
    };

    Ok(Json(output))
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictParams {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_max_length")]
    pub max_length: i64,
}

fn default_max_length() -> i64 {
    DEFAULT_MAX_LENGTH
}

pub struct ClassifyOperation;

impl InferenceOperation for ClassifyOperation {
    type Params = PredictParams;
    type Output = Classification;

    const INPUT: &'static str = "message";
    const MISSING_INPUT: &'static str = "No message provided for analysis.";

    fn input(params: &PredictParams) -> &str {
        &params.message
    }

    fn run(models: &Models, params: PredictParams) -> Result<Classification, ModelError> {
        models.classifier.classify(&params.message)
    }
}

pub struct GenerateOperation;

impl InferenceOperation for GenerateOperation {
    type Params = GenerateParams;
    type Output = Generation;

    const INPUT: &'static str = "prompt";
    const MISSING_INPUT: &'static str = "No prompt provided for generation.";

    fn input(params: &GenerateParams) -> &str {
        &params.prompt
    }

    fn check(params: &GenerateParams) -> Result<(), ApiError> {
        if params.max_length < 1 {
            return Err(ApiError::InvalidInput(format!(
                "max_length must be a positive integer, got {}",
                params.max_length
            )));
        }
        Ok(())
    }

    fn run(models: &Models, params: GenerateParams) -> Result<Generation, ModelError> {
        let max_length = usize::try_from(params.max_length).unwrap_or(usize::MAX);
        models.generator.generate(&params.prompt, max_length)
    }
}

/// `GET /predict/?message=...`
pub async fn predict(
    State(models): State<Models>,
    params: Result<Query<PredictParams>, QueryRejection>,
) -> Result<Json<Classification>, ApiError> {
    let Query(params) = params?;
    infer::<ClassifyOperation>(models, params).await
}

/// `GET /generate/?prompt=...&max_length=...`
pub async fn generate(
    State(models): State<Models>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> Result<Json<Generation>, ApiError> {
    let Query(params) = params?;
    infer::<GenerateOperation>(models, params).await
}
