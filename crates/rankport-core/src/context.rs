use std::collections::HashSet;

use bytes::Bytes;
use thiserror::Error;

use crate::tensor::{f32s_from_ne_bytes, i64s_from_ne_bytes};
use crate::{DType, IOName, Shape, Tensor};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("tensor '{name}': {part} byte length {byte_len} is not a multiple of {elem_size}")]
    Misaligned {
        name: String,
        part: &'static str,
        byte_len: usize,
        elem_size: usize,
    },

    #[error("tensor '{name}': negative dimension {dim}")]
    NegativeDimension { name: String, dim: i64 },

    #[error("tensor '{name}': shape {shape:?} has more elements than can be addressed")]
    ShapeOverflow { name: String, shape: Vec<usize> },

    #[error("tensor '{name}': shape {shape:?} needs {expected} values, got {actual}")]
    ValueCount {
        name: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// One parsed tensor: its name plus the still-encoded dimension and value bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTensorEntry {
    pub name: String,
    pub dims: Bytes,
    pub values: Bytes,
}

impl RawTensorEntry {
    /// Shape as native-endian `i64`s.
    pub fn dims(&self) -> Result<Vec<i64>, ContextError> {
        self.check_stride("dimensions", &self.dims, 8)?;
        Ok(i64s_from_ne_bytes(&self.dims))
    }

    /// Payload as native-endian `f32`s.
    pub fn values(&self) -> Result<Vec<f32>, ContextError> {
        self.check_stride("values", &self.values, 4)?;
        Ok(f32s_from_ne_bytes(&self.values))
    }

    pub fn shape(&self) -> Result<Shape, ContextError> {
        self.dims()?
            .into_iter()
            .map(|dim| {
                usize::try_from(dim).map_err(|_| ContextError::NegativeDimension {
                    name: self.name.clone(),
                    dim,
                })
            })
            .collect::<Result<_, _>>()
            .map(Shape)
    }

    /// Validates the entry and turns it into an f32 engine tensor.
    pub fn to_tensor(&self) -> Result<Tensor, ContextError> {
        let shape = self.shape()?;
        self.check_stride("values", &self.values, 4)?;

        let expected = shape.numel().ok_or_else(|| ContextError::ShapeOverflow {
            name: self.name.clone(),
            shape: shape.dims().to_vec(),
        })?;
        let actual = self.values.len() / 4;
        if expected != actual {
            return Err(ContextError::ValueCount {
                name: self.name.clone(),
                shape: shape.dims().to_vec(),
                expected,
                actual,
            });
        }

        Ok(Tensor::from_cpu_bytes(DType::F32, shape, self.values.clone()))
    }

    fn check_stride(&self, part: &'static str, bytes: &Bytes, elem_size: usize) -> Result<(), ContextError> {
        if bytes.len() % elem_size != 0 {
            return Err(ContextError::Misaligned {
                name: self.name.clone(),
                part,
                byte_len: bytes.len(),
                elem_size,
            });
        }
        Ok(())
    }
}

/// Tensors decoded from one request, in the order they were parsed.
///
/// Entries are append-only. Duplicate names are kept as-is; it is up to the
/// consumer to reject them.
#[derive(Clone, Debug, Default)]
pub struct InputContext {
    entries: Vec<RawTensorEntry>,
}

impl InputContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, name: impl Into<String>, dims: Bytes, values: Bytes) {
        self.entries.push(RawTensorEntry {
            name: name.into(),
            dims,
            values,
        });
    }

    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn entries(&self) -> &[RawTensorEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&RawTensorEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn distinct_count(&self) -> usize {
        self.names().collect::<HashSet<_>>().len()
    }

    /// First name that appears more than once, if any.
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.names().find(|name| !seen.insert(*name))
    }

    /// Projects every entry into an engine input, keeping insertion order.
    pub fn tensors(&self) -> Result<Vec<(IOName, Tensor)>, ContextError> {
        self.entries
            .iter()
            .map(|entry| Ok((IOName(entry.name.clone()), entry.to_tensor()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i64_bytes(values: &[i64]) -> Bytes {
        Bytes::from(values.iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>())
    }

    fn f32_bytes(values: &[f32]) -> Bytes {
        Bytes::from(values.iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>())
    }

    #[test]
    fn names_and_entries_share_order() {
        let mut context = InputContext::new();
        context.push_input("z", i64_bytes(&[1]), f32_bytes(&[1.0]));
        context.push_input("a", i64_bytes(&[2]), f32_bytes(&[2.0, 3.0]));

        let names: Vec<_> = context.names().collect();
        assert_eq!(names, vec!["z", "a"]);
        for (name, entry) in names.iter().zip(context.entries()) {
            assert_eq!(*name, entry.name);
        }
        assert_eq!(context.get("a").unwrap().values().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn duplicates_are_kept_and_reported() {
        let mut context = InputContext::new();
        context.push_input("a", i64_bytes(&[1]), f32_bytes(&[1.0]));
        context.push_input("b", i64_bytes(&[1]), f32_bytes(&[1.0]));
        context.push_input("a", i64_bytes(&[1]), f32_bytes(&[2.0]));

        assert_eq!(context.len(), 3);
        assert_eq!(context.distinct_count(), 2);
        assert_eq!(context.first_duplicate(), Some("a"));
    }

    #[test]
    fn tensors_project_shape_and_values() {
        let mut context = InputContext::new();
        context.push_input("x", i64_bytes(&[2, 2]), f32_bytes(&[1.0, 2.0, 3.0, 4.0]));

        let tensors = context.tensors().unwrap();
        assert_eq!(tensors.len(), 1);
        let (name, tensor) = &tensors[0];
        assert_eq!(name.as_str(), "x");
        assert_eq!(tensor.shape.dims(), &[2, 2]);
        assert_eq!(tensor.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn misaligned_dimensions_are_rejected() {
        let entry = RawTensorEntry {
            name: "x".into(),
            dims: Bytes::from_static(b"A"),
            values: f32_bytes(&[1.0]),
        };
        assert_eq!(
            entry.to_tensor().unwrap_err(),
            ContextError::Misaligned {
                name: "x".into(),
                part: "dimensions",
                byte_len: 1,
                elem_size: 8,
            }
        );
    }

    #[test]
    fn misaligned_values_are_rejected() {
        let entry = RawTensorEntry {
            name: "x".into(),
            dims: i64_bytes(&[1]),
            values: Bytes::from_static(b"abc"),
        };
        assert!(matches!(
            entry.values(),
            Err(ContextError::Misaligned { part: "values", .. })
        ));
    }

    #[test]
    fn negative_dimension_is_rejected() {
        let entry = RawTensorEntry {
            name: "x".into(),
            dims: i64_bytes(&[-1]),
            values: f32_bytes(&[1.0]),
        };
        assert_eq!(
            entry.to_tensor().unwrap_err(),
            ContextError::NegativeDimension {
                name: "x".into(),
                dim: -1
            }
        );
    }

    #[test]
    fn value_count_must_match_shape() {
        let entry = RawTensorEntry {
            name: "x".into(),
            dims: i64_bytes(&[3]),
            values: f32_bytes(&[1.0, 2.0]),
        };
        assert!(matches!(
            entry.to_tensor(),
            Err(ContextError::ValueCount { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let mut context = InputContext::new();
        context.push_input("x", i64_bytes(&[1 << 40, 1 << 40, 1 << 40]), f32_bytes(&[1.0]));
        assert_eq!(
            context.tensors().unwrap_err(),
            ContextError::ShapeOverflow {
                name: "x".into(),
                shape: vec![1 << 40, 1 << 40, 1 << 40],
            }
        );
    }
}
