use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rankport_core::{EngineSession, IOName, IoKind};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("empty model data")]
    EmptyModel,

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("invalid type for input '{name}' (#{index}): expected tensor<F32>, got {kind}")]
    InputType {
        index: usize,
        name: IOName,
        kind: IoKind,
    },

    #[error("could not find output with name '{0}' in model")]
    OutputNotFound(String),

    #[error("invalid type for output '{name}': expected tensor<F32>, got {kind}")]
    OutputType { name: IOName, kind: IoKind },

    #[error("unknown error while loading model: {0}")]
    Unknown(String),
}

/// Metadata checked once per load: every input is a float tensor and the
/// configured output exists and is a float tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub input_names: Vec<IOName>,
    pub output_index: usize,
    pub output_name: IOName,
}

impl ModelDescriptor {
    pub fn validate<S: EngineSession>(session: &S, output_name: &str) -> Result<Self, ModelError> {
        let spec = session.spec();

        for index in 0..session.input_count() {
            let kind = session.input_kind(index).unwrap_or(IoKind::Unknown);
            if !kind.is_float_tensor() {
                return Err(ModelError::InputType {
                    index,
                    name: spec.inputs[index].name.clone(),
                    kind,
                });
            }
        }

        let output_index = (0..session.output_count())
            .find(|&index| session.output_name(index).is_some_and(|name| name.as_str() == output_name))
            .ok_or_else(|| ModelError::OutputNotFound(output_name.to_string()))?;

        let kind = session.output_kind(output_index).unwrap_or(IoKind::Unknown);
        if !kind.is_float_tensor() {
            return Err(ModelError::OutputType {
                name: IOName(output_name.to_string()),
                kind,
            });
        }

        Ok(Self {
            input_names: spec.inputs.iter().map(|io| io.name.clone()).collect(),
            output_index,
            output_name: IOName(output_name.to_string()),
        })
    }

    pub fn input_count(&self) -> usize {
        self.input_names.len()
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input_names.iter().any(|input| input.as_str() == name)
    }
}

/// A validated session and its descriptor, published as one immutable unit.
pub struct ModelUnit<S> {
    pub session: S,
    pub descriptor: ModelDescriptor,
    /// Position of this unit in the handle's publish order, starting at 1.
    pub generation: u64,
}

/// Holds the model currently being served.
///
/// Readers take an `Arc` snapshot and keep using it for the whole call, even if
/// a newer unit is published meanwhile. Units are only published once fully
/// validated, and a failed load never touches the current one.
pub struct ModelHandle<S> {
    current: RwLock<Option<Arc<ModelUnit<S>>>>,
    generation: AtomicU64,
}

impl<S> Default for ModelHandle<S> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }
}

impl<S> ModelHandle<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<ModelUnit<S>>> {
        self.current.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Installs a new unit and returns its generation. The previous unit is
    /// dropped once the last in-flight reader releases it.
    pub fn publish(&self, session: S, descriptor: ModelDescriptor) -> u64 {
        let (generation, previous) = {
            let mut current = self.current.write();
            // Numbered under the write lock so install order matches generation order.
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let unit = Arc::new(ModelUnit {
                session,
                descriptor,
                generation,
            });
            (generation, current.replace(unit))
        };
        drop(previous);
        generation
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rankport_core::{DType, IoSpec, SessionSpec, Tensor};

    struct SpecOnly(SessionSpec);

    impl EngineSession for SpecOnly {
        fn spec(&self) -> &SessionSpec {
            &self.0
        }

        fn run(&self, _inputs: Vec<(IOName, Tensor)>, _outputs: &[IOName]) -> Result<Vec<Tensor>> {
            anyhow::bail!("not runnable")
        }
    }

    fn io(name: &str, kind: IoKind) -> IoSpec {
        IoSpec {
            name: IOName::from(name),
            kind,
            dims: vec![None],
        }
    }

    fn session(inputs: Vec<IoSpec>, outputs: Vec<IoSpec>) -> SpecOnly {
        SpecOnly(SessionSpec { inputs, outputs })
    }

    const F32: IoKind = IoKind::Tensor(DType::F32);

    #[test]
    fn accepts_float_inputs_and_named_output() {
        let s = session(
            vec![io("a", F32), io("b", F32)],
            vec![io("logits", F32), io("probs", F32)],
        );
        let descriptor = ModelDescriptor::validate(&s, "probs").unwrap();
        assert_eq!(descriptor.input_count(), 2);
        assert_eq!(descriptor.output_index, 1);
        assert!(descriptor.has_input("b"));
        assert!(!descriptor.has_input("c"));
    }

    #[test]
    fn rejects_integer_input() {
        let s = session(
            vec![io("a", F32), io("ids", IoKind::Tensor(DType::I64))],
            vec![io("probs", F32)],
        );
        assert_eq!(
            ModelDescriptor::validate(&s, "probs"),
            Err(ModelError::InputType {
                index: 1,
                name: IOName::from("ids"),
                kind: IoKind::Tensor(DType::I64),
            })
        );
    }

    #[test]
    fn rejects_non_tensor_input() {
        let s = session(vec![io("seq", IoKind::Sequence)], vec![io("probs", F32)]);
        assert!(matches!(
            ModelDescriptor::validate(&s, "probs"),
            Err(ModelError::InputType { kind: IoKind::Sequence, .. })
        ));
    }

    #[test]
    fn rejects_missing_output() {
        let s = session(vec![io("a", F32)], vec![io("logits", F32)]);
        assert_eq!(
            ModelDescriptor::validate(&s, "probs"),
            Err(ModelError::OutputNotFound("probs".into()))
        );
    }

    #[test]
    fn rejects_non_float_output() {
        let s = session(vec![io("a", F32)], vec![io("probs", IoKind::Tensor(DType::I64))]);
        assert!(matches!(
            ModelDescriptor::validate(&s, "probs"),
            Err(ModelError::OutputType { .. })
        ));
    }

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            input_names: vec![IOName::from("a")],
            output_index: 0,
            output_name: IOName::from("probs"),
        }
    }

    #[test]
    fn snapshot_survives_publish() {
        let handle = ModelHandle::new();
        assert!(handle.snapshot().is_none());
        assert!(!handle.is_ready());

        assert_eq!(handle.publish("first", descriptor()), 1);
        let old = handle.snapshot().unwrap();

        assert_eq!(handle.publish("second", descriptor()), 2);
        assert_eq!(old.session, "first");
        assert_eq!(old.generation, 1);
        assert_eq!(handle.snapshot().unwrap().session, "second");
        assert!(handle.is_ready());
    }

    #[test]
    fn concurrent_publishes_install_in_generation_order() {
        let handle = ModelHandle::new();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let handle = &handle;
                scope.spawn(move || {
                    for i in 0..250 {
                        let published = handle.publish(t * 1000 + i, descriptor());
                        let seen = handle.snapshot().unwrap().generation;
                        assert!(seen >= published, "generation went backwards: {seen} < {published}");
                    }
                });
            }
        });
        assert_eq!(handle.snapshot().unwrap().generation, 1000);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&*err), "boom");

        let err = std::panic::catch_unwind(|| panic!("{}", String::from("formatted"))).unwrap_err();
        assert_eq!(panic_message(&*err), "formatted");

        let err = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(&*err), "Unknown error");
    }
}
