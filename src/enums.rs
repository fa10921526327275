use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Semantic tag of a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Continuous scalar field.
    #[default]
    Scalar,
    /// Integer categorical field.
    Label,
    /// Multi-channel color field.
    Color,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Scalar => "scalar",
            Kind::Label => "label",
            Kind::Color => "color",
        };
        f.write_str(name)
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalar" => Ok(Kind::Scalar),
            "label" => Ok(Kind::Label),
            "color" => Ok(Kind::Color),
            other => Err(format!("unknown layer kind '{other}'")),
        }
    }
}

/// Element type the voxels had in the source file.
///
/// Tensors are always held as `f32`; the source type decides the
/// interpolation defaults and how resampled values are stored back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F16,
    #[default]
    F32,
    F64,
}

impl DataType {
    pub fn is_bool(self) -> bool {
        matches!(self, DataType::Bool)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::U8
                | DataType::I8
                | DataType::U16
                | DataType::I16
                | DataType::U32
                | DataType::I32
        )
    }

    /// Bring an interpolated value back into this type's value set.
    #[inline]
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            DataType::Bool => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            t if t.is_integer() => value.round(),
            _ => value,
        }
    }
}

/// Boundary handling for resampling and filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Pad with a constant value.
    Constant,
    /// Repeat the edge sample.
    Edge,
    /// Mirror including the edge sample (`d c b a | a b c d | d c b a`).
    Symmetric,
    /// Mirror about the edge sample (`d c b | a b c d | c b a`).
    #[default]
    Reflect,
    /// Periodic continuation.
    Wrap,
}

/// Boundary semantics of the spline filters, after translation from
/// [`BoundaryMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplineMode {
    GridConstant,
    Nearest,
    Reflect,
    Mirror,
    GridWrap,
}

impl From<BoundaryMode> for SplineMode {
    fn from(mode: BoundaryMode) -> Self {
        match mode {
            BoundaryMode::Constant => SplineMode::GridConstant,
            BoundaryMode::Edge => SplineMode::Nearest,
            BoundaryMode::Symmetric => SplineMode::Reflect,
            BoundaryMode::Reflect => SplineMode::Mirror,
            BoundaryMode::Wrap => SplineMode::GridWrap,
        }
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(BoundaryMode::Constant),
            "edge" => Ok(BoundaryMode::Edge),
            "symmetric" => Ok(BoundaryMode::Symmetric),
            "reflect" => Ok(BoundaryMode::Reflect),
            "wrap" => Ok(BoundaryMode::Wrap),
            other => Err(format!("unknown boundary mode '{other}'")),
        }
    }
}

/// Axis names used to describe a reader's raw array layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    T,
    X,
    Y,
    Z,
    C,
}

impl Axis {
    /// Canonical position in the (Frame, X, Y, Z, Channel) tensor.
    pub fn canonical_index(self) -> usize {
        match self {
            Axis::T => 0,
            Axis::X => 1,
            Axis::Y => 2,
            Axis::Z => 3,
            Axis::C => 4,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'T' => Some(Axis::T),
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'C' | 'S' => Some(Axis::C),
            _ => None,
        }
    }
}
