use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    U8,
    I32,
    I64,
    F32,
    F64,
}

/// Shape, element type and optional bounds of an array-valued quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ArraySpec {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Vec<usize>, dtype: DType) -> Self {
        Self { name: name.into(), shape, dtype, minimum: None, maximum: None }
    }

    #[must_use]
    pub fn bounded(
        name: impl Into<String>,
        shape: Vec<usize>,
        dtype: DType,
        minimum: f64,
        maximum: f64,
    ) -> Self {
        Self { minimum: Some(minimum), maximum: Some(maximum), ..Self::new(name, shape, dtype) }
    }

    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), DType::F64)
    }
}

/// All specs of an environment. Episode writers store them next to the
/// recorded steps so readers can reconstruct the environment's interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specs {
    pub observation: ArraySpec,
    pub action: ArraySpec,
    pub reward: ArraySpec,
    pub discount: ArraySpec,
}
