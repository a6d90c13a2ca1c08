use anyhow::Result;

use crate::{IOName, IoKind, SessionSpec, Tensor};

/// An inference engine able to turn serialized model bytes into a session.
pub trait Engine: Send + Sync + 'static {
    type Session: EngineSession;

    fn name(&self) -> &'static str;
    fn load(&self, model: &[u8]) -> Result<Self::Session>;
}

/// A loaded model. Sessions are shared between concurrent callers, so `run`
/// takes `&self`; engines that need exclusive access serialize internally.
pub trait EngineSession: Send + Sync + 'static {
    fn spec(&self) -> &SessionSpec;

    /// Runs a forward pass and returns the requested outputs in the order asked for.
    fn run(&self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>>;

    fn input_count(&self) -> usize {
        self.spec().inputs.len()
    }

    fn input_kind(&self, index: usize) -> Option<IoKind> {
        self.spec().inputs.get(index).map(|io| io.kind)
    }

    fn output_count(&self) -> usize {
        self.spec().outputs.len()
    }

    fn output_name(&self, index: usize) -> Option<&IOName> {
        self.spec().outputs.get(index).map(|io| &io.name)
    }

    fn output_kind(&self, index: usize) -> Option<IoKind> {
        self.spec().outputs.get(index).map(|io| io.kind)
    }
}
