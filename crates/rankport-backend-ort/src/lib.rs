use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use rankport_core::{
    DType, Engine, EngineSession, IOName, IoKind, IoSpec, SessionSpec, Shape, Tensor,
};
use ort::{
    session::{builder::GraphOptimizationLevel, Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrtOptions {
    /// Intra-op thread pool size; `None` lets ONNX Runtime decide.
    pub intra_threads: Option<usize>,
    pub optimization_level: OptimizationLevel,
}

pub struct OrtEngine {
    options: OrtOptions,
}

impl OrtEngine {
    pub fn new(options: OrtOptions) -> Self {
        Self { options }
    }
}

impl Default for OrtEngine {
    fn default() -> Self {
        Self::new(OrtOptions::default())
    }
}

pub struct OrtSession {
    spec: SessionSpec,
    // ORT sessions need exclusive access to run.
    session: Mutex<Session>,
}

impl Engine for OrtEngine {
    type Session = OrtSession;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, model: &[u8]) -> Result<Self::Session> {
        let mut builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(self.options.optimization_level.into())
            .context("failed to configure ORT graph optimization")?;

        if let Some(threads) = self.options.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .context("failed to configure ORT thread pool")?;
        }

        let session = builder
            .commit_from_memory(model)
            .context("failed to load ONNX model")?;

        let spec = build_session_spec(&session);
        debug!(
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "onnx session created"
        );

        Ok(OrtSession {
            spec,
            session: Mutex::new(session),
        })
    }
}

impl EngineSession for OrtSession {
    fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    fn run(&self, inputs: Vec<(IOName, Tensor)>, outputs: &[IOName]) -> Result<Vec<Tensor>> {
        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            let value = tensor_to_ort_value(input)?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let mut session = self.session.lock();
        let results = session.run(ort_inputs)?;

        let mut out_tensors = Vec::with_capacity(outputs.len());
        for wanted in outputs {
            let value = results
                .iter()
                .find(|(name, _)| *name == wanted.as_str())
                .map(|(_, value)| value)
                .with_context(|| format!("model produced no output named '{wanted}'"))?;
            out_tensors.push(ort_value_to_tensor(&value)?);
        }

        Ok(out_tensors)
    }
}

fn build_session_spec(session: &Session) -> SessionSpec {
    let inputs = session
        .inputs
        .iter()
        .map(|input| io_spec_from_value_type(&input.name, &input.input_type))
        .collect();

    let outputs = session
        .outputs
        .iter()
        .map(|output| io_spec_from_value_type(&output.name, &output.output_type))
        .collect();

    SessionSpec { inputs, outputs }
}

fn io_spec_from_value_type(name: &str, value_type: &ValueType) -> IoSpec {
    let (kind, dims) = match value_type {
        ValueType::Tensor { ty, shape, .. } => {
            let dims = shape
                .iter()
                .map(|d| if *d < 0 { None } else { Some(*d as usize) })
                .collect();
            (IoKind::Tensor(ort_tensor_element_to_dtype(*ty)), dims)
        }
        ValueType::Sequence { .. } => (IoKind::Sequence, Vec::new()),
        ValueType::Map { .. } => (IoKind::Map, Vec::new()),
        ValueType::Optional { .. } => (IoKind::Optional, Vec::new()),
        #[allow(unreachable_patterns)]
        _ => (IoKind::Unknown, Vec::new()),
    };

    IoSpec {
        name: IOName(name.to_string()),
        kind,
        dims,
    }
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> DType {
    match ty {
        TensorElementType::Float32 => DType::F32,
        TensorElementType::Float16 => DType::F16,
        TensorElementType::Float64 => DType::F64,
        TensorElementType::Int64 => DType::I64,
        TensorElementType::Int32 => DType::I32,
        TensorElementType::Int8 => DType::I8,
        TensorElementType::Uint8 => DType::U8,
        TensorElementType::Bool => DType::Bool,
        TensorElementType::String => DType::String,
        _ => DType::Other,
    }
}

fn tensor_to_ort_value(tensor: Tensor) -> Result<DynValue> {
    ensure!(
        tensor.dtype == DType::F32,
        "only f32 inputs are supported, got {:?}",
        tensor.dtype
    );
    let data = tensor.to_f32_vec()?;
    let shape: Vec<usize> = tensor.shape.dims().to_vec();

    Ok(ort::value::Tensor::from_array((shape, data))?.into_dyn())
}

fn ort_value_to_tensor(value: &ort::value::ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };
    if !matches!(ty, TensorElementType::Float32) {
        bail!("unsupported output tensor element type: {ty}");
    }

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let array = value.try_extract_array::<f32>()?;
    let slice = array.as_slice().context("non-contiguous output tensor")?;

    let tensor = Tensor::from_cpu_bytes(DType::F32, Shape::from_slice(&dims), bytes_from_f32(slice));
    Ok(tensor)
}

fn bytes_from_f32(slice: &[f32]) -> Bytes {
    Bytes::from(slice.iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>())
}
