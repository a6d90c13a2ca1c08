use bytes::Bytes;
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    F64,
    I64,
    I32,
    I8,
    U8,
    Bool,
    String,
    Other,
}

impl DType {
    /// Size of one element in bytes, `None` for variable-width types.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DType::F32 | DType::I32 => Some(4),
            DType::F16 => Some(2),
            DType::F64 | DType::I64 => Some(8),
            DType::I8 | DType::U8 | DType::Bool => Some(1),
            DType::String | DType::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Element count; a rank-0 shape holds one element. `None` if the
    /// product overflows `usize`.
    pub fn numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("expected a {expected:?} tensor, got {actual:?}")]
    DType { expected: DType, actual: DType },

    #[error("tensor shape {shape:?} is too large to address")]
    ShapeOverflow { shape: Vec<usize> },

    #[error("tensor byte length {byte_len} does not match shape {shape:?} ({numel} x {elem_size} bytes)")]
    ByteLen {
        shape: Vec<usize>,
        numel: usize,
        elem_size: usize,
        byte_len: usize,
    },
}

/// A CPU tensor in platform-native byte order.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub bytes: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            dtype,
            shape,
            bytes,
        }
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::from_cpu_bytes(DType::F32, shape, Bytes::from(bytes))
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Checks that the byte buffer holds exactly `shape.numel()` elements.
    pub fn validate(&self) -> Result<(), TensorError> {
        let Some(elem_size) = self.dtype.byte_size() else {
            return Ok(());
        };
        let overflow = || TensorError::ShapeOverflow {
            shape: self.shape.dims().to_vec(),
        };
        let numel = self.shape.numel().ok_or_else(overflow)?;
        let expected = numel.checked_mul(elem_size).ok_or_else(overflow)?;
        if expected != self.bytes.len() {
            return Err(TensorError::ByteLen {
                shape: self.shape.dims().to_vec(),
                numel,
                elem_size,
                byte_len: self.bytes.len(),
            });
        }
        Ok(())
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        if self.dtype != DType::F32 {
            return Err(TensorError::DType {
                expected: DType::F32,
                actual: self.dtype,
            });
        }
        self.validate()?;
        Ok(f32s_from_ne_bytes(&self.bytes))
    }
}

pub(crate) fn f32s_from_ne_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub(crate) fn i64s_from_ne_bytes(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|b| i64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_shape_has_one_element() {
        assert_eq!(Shape::from_slice(&[]).numel(), Some(1));
        assert_eq!(Shape::from_slice(&[2, 0]).numel(), Some(0));
        assert_eq!(Shape::from_slice(&[2, 3]).numel(), Some(6));
    }

    #[test]
    fn oversized_shapes_do_not_wrap() {
        let huge = 1usize << (usize::BITS / 2 + 8);
        assert_eq!(Shape::from_slice(&[huge, huge]).numel(), None);

        let t = Tensor::from_f32(Shape::from_slice(&[huge, huge]), &[1.0]);
        assert!(matches!(t.to_f32_vec(), Err(TensorError::ShapeOverflow { .. })));

        // Element count fits, byte count does not.
        let t = Tensor::from_f32(Shape::from_slice(&[usize::MAX / 2]), &[1.0]);
        assert!(matches!(t.validate(), Err(TensorError::ShapeOverflow { .. })));
    }

    #[test]
    fn f32_tensor_reads_back() {
        let t = Tensor::from_f32(Shape::from_slice(&[3]), &[0.5, 1.0, -2.0]);
        assert_eq!(t.byte_len(), 12);
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.5, 1.0, -2.0]);
    }

    #[test]
    fn byte_len_must_match_shape() {
        let t = Tensor::from_f32(Shape::from_slice(&[4]), &[1.0, 2.0]);
        assert!(matches!(
            t.to_f32_vec(),
            Err(TensorError::ByteLen { numel: 4, byte_len: 8, .. })
        ));
    }

    #[test]
    fn non_float_tensor_is_rejected() {
        let t = Tensor::from_cpu_bytes(DType::I64, Shape::from_slice(&[1]), Bytes::from(vec![0; 8]));
        assert!(matches!(t.to_f32_vec(), Err(TensorError::DType { .. })));
    }
}
