use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rankport_core::Engine;
use tracing::{debug, info, warn};

use crate::model::{panic_message, ModelDescriptor, ModelError, ModelHandle, ModelUnit};
use crate::rank::{choose_rank, RankError, RankOutput};
use crate::RankerConfig;

/// Serves ranking requests against the most recently loaded model.
///
/// `update` and `choose_rank` may be called from many threads. Updates are
/// expected to come from a single writer; concurrent updates are safe but the
/// last one to finish wins.
pub struct Ranker<E: Engine> {
    engine: E,
    config: RankerConfig,
    handle: ModelHandle<E::Session>,
}

impl<E: Engine> Ranker<E> {
    pub fn new(engine: E, config: RankerConfig) -> Self {
        Self {
            engine,
            config,
            handle: ModelHandle::new(),
        }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    pub fn current(&self) -> Option<Arc<ModelUnit<E::Session>>> {
        self.handle.snapshot()
    }

    /// Loads and validates `model`, then swaps it in. On error the model
    /// already being served, if any, stays in place.
    pub fn update(&self, model: &[u8]) -> Result<(), ModelError> {
        info!(
            engine = self.engine.name(),
            bytes = model.len(),
            "received new model data"
        );

        let loaded = if model.is_empty() {
            Err(ModelError::EmptyModel)
        } else {
            catch_unwind(AssertUnwindSafe(|| self.load_validated(model)))
                .unwrap_or_else(|payload| Err(ModelError::Unknown(panic_message(&*payload))))
        };

        match loaded {
            Ok((session, descriptor)) => {
                let inputs = descriptor.input_count();
                let output_index = descriptor.output_index;
                let generation = self.handle.publish(session, descriptor);
                info!(generation, inputs, output_index, "model swapped in");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, ready = self.is_ready(), "model update rejected");
                Err(err)
            }
        }
    }

    pub fn choose_rank(&self, seed: u64, features: &str) -> Result<RankOutput, RankError> {
        let unit = self.handle.snapshot().ok_or(RankError::NoModelLoaded)?;
        if !self.config.parse_feature_string {
            return Err(RankError::StructuredInputUnsupported);
        }

        let result = choose_rank(seed, features, Some(unit.as_ref()));
        if let Err(err) = &result {
            debug!(error = %err, generation = unit.generation, "ranking failed");
        }
        result
    }

    fn load_validated(&self, model: &[u8]) -> Result<(E::Session, ModelDescriptor), ModelError> {
        let session = self
            .engine
            .load(model)
            .map_err(|err| ModelError::Load(format!("{err:#}")))?;
        let descriptor = ModelDescriptor::validate(&session, &self.config.output_name)?;
        Ok((session, descriptor))
    }
}
