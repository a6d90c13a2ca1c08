use std::panic::{catch_unwind, AssertUnwindSafe};

use rankport_core::{parse, ContextError, EngineSession, InputContext, ParseError};
use thiserror::Error;
use tracing::debug;

use crate::model::{panic_message, ModelUnit};

#[derive(Debug, Error)]
pub enum RankError {
    #[error("no model loaded")]
    NoModelLoaded,

    #[error("structured feature input (parse_feature_string = false) is not implemented")]
    StructuredInputUnsupported,

    #[error("failed to deserialize features: {0}")]
    Parse(#[from] ParseError),

    #[error("input '{0}' was supplied more than once")]
    DuplicateInput(String),

    #[error("model expects {expected} inputs, features supplied {actual}")]
    InputCountMismatch { expected: usize, actual: usize },

    #[error("model has no input named '{0}'")]
    UnknownInput(String),

    #[error("invalid input tensor: {0}")]
    InvalidInput(#[from] ContextError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model output '{name}' is unusable: {reason}")]
    Output { name: String, reason: String },

    #[error("unknown error during inference: {0}")]
    Unknown(String),
}

/// One candidate action; `action_id` is the element's position in the output tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankedAction {
    pub action_id: usize,
    pub probability: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankOutput {
    pub actions: Vec<RankedAction>,
    /// Reserved for model versioning metadata; never set yet.
    pub model_version: Option<String>,
}

impl RankOutput {
    pub fn action_ids(&self) -> Vec<usize> {
        self.actions.iter().map(|a| a.action_id).collect()
    }

    pub fn probabilities(&self) -> Vec<f32> {
        self.actions.iter().map(|a| a.probability).collect()
    }
}

/// Scores `features` (tensor notation) against `unit`.
///
/// `seed` is accepted for stochastic policies but this scoring path is
/// deterministic and ignores it.
pub fn choose_rank<S: EngineSession>(
    seed: u64,
    features: &str,
    unit: Option<&ModelUnit<S>>,
) -> Result<RankOutput, RankError> {
    let unit = unit.ok_or(RankError::NoModelLoaded)?;
    let descriptor = &unit.descriptor;

    let mut context = InputContext::new();
    parse(features, &mut context)?;

    let supplied = context.distinct_count();
    if supplied != descriptor.input_count() {
        return Err(RankError::InputCountMismatch {
            expected: descriptor.input_count(),
            actual: supplied,
        });
    }
    if let Some(name) = context.first_duplicate() {
        return Err(RankError::DuplicateInput(name.to_string()));
    }
    if let Some(name) = context.names().find(|name| !descriptor.has_input(name)) {
        return Err(RankError::UnknownInput(name.to_string()));
    }

    let inputs = context.tensors()?;
    debug!(
        seed,
        generation = unit.generation,
        inputs = inputs.len(),
        "running inference"
    );

    let requested = [descriptor.output_name.clone()];
    let outputs = catch_unwind(AssertUnwindSafe(|| unit.session.run(inputs, &requested)))
        .map_err(|payload| RankError::Unknown(panic_message(&*payload)))?
        .map_err(|err| RankError::Inference(format!("{err:#}")))?;

    let output_error = |reason: String| RankError::Output {
        name: descriptor.output_name.to_string(),
        reason,
    };
    let output = outputs
        .into_iter()
        .next()
        .ok_or_else(|| output_error("engine returned no tensor".to_string()))?;
    let scores = output
        .to_f32_vec()
        .map_err(|err| output_error(err.to_string()))?;

    let actions = scores
        .into_iter()
        .enumerate()
        .map(|(action_id, probability)| RankedAction {
            action_id,
            probability,
        })
        .collect();

    Ok(RankOutput {
        actions,
        model_version: None,
    })
}
