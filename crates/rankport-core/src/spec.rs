use std::fmt;

use crate::DType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IOName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// What kind of value an engine input or output carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoKind {
    Tensor(DType),
    Sequence,
    Map,
    Optional,
    Unknown,
}

impl IoKind {
    pub fn is_tensor(self) -> bool {
        matches!(self, IoKind::Tensor(_))
    }

    pub fn is_float_tensor(self) -> bool {
        self == IoKind::Tensor(DType::F32)
    }
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoKind::Tensor(dtype) => write!(f, "tensor<{dtype:?}>"),
            IoKind::Sequence => f.write_str("sequence"),
            IoKind::Map => f.write_str("map"),
            IoKind::Optional => f.write_str("optional"),
            IoKind::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IoSpec {
    pub name: IOName,
    pub kind: IoKind,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

/// Input and output metadata of a loaded session, in engine order.
#[derive(Clone, Debug, Default)]
pub struct SessionSpec {
    pub inputs: Vec<IoSpec>,
    pub outputs: Vec<IoSpec>,
}
