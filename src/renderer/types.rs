//! Core type definitions for the shader node IR.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::nodes::compute_nodes::ComputeDispatch;

/// Component kind of a WGSL scalar, vector or matrix type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I32,
    U32,
    F32,
}

impl ScalarKind {
    /// Returns the WGSL scalar type name.
    pub fn wgsl(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::F32 => "f32",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ScalarKind::I32 | ScalarKind::U32)
    }
}

/// WGSL value type for shader expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Void,
    Bool,
    #[serde(rename = "int")]
    I32,
    #[serde(rename = "uint")]
    U32,
    #[serde(rename = "float")]
    F32,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ValueType {
    /// Returns the WGSL type name for this value type.
    pub fn wgsl(self) -> &'static str {
        match self {
            ValueType::Void => "void",
            ValueType::Bool => "bool",
            ValueType::I32 => "i32",
            ValueType::U32 => "u32",
            ValueType::F32 => "f32",
            ValueType::Vec2 => "vec2f",
            ValueType::Vec3 => "vec3f",
            ValueType::Vec4 => "vec4f",
            ValueType::IVec2 => "vec2i",
            ValueType::IVec3 => "vec3i",
            ValueType::IVec4 => "vec4i",
            ValueType::UVec2 => "vec2u",
            ValueType::UVec3 => "vec3u",
            ValueType::UVec4 => "vec4u",
            ValueType::BVec2 => "vec2<bool>",
            ValueType::BVec3 => "vec3<bool>",
            ValueType::BVec4 => "vec4<bool>",
            ValueType::Mat2 => "mat2x2f",
            ValueType::Mat3 => "mat3x3f",
            ValueType::Mat4 => "mat4x4f",
        }
    }

    /// Number of scalar components. Matrices count every cell.
    pub fn length(self) -> usize {
        match self {
            ValueType::Void => 0,
            ValueType::Bool | ValueType::I32 | ValueType::U32 | ValueType::F32 => 1,
            ValueType::Vec2 | ValueType::IVec2 | ValueType::UVec2 | ValueType::BVec2 => 2,
            ValueType::Vec3 | ValueType::IVec3 | ValueType::UVec3 | ValueType::BVec3 => 3,
            ValueType::Vec4 | ValueType::IVec4 | ValueType::UVec4 | ValueType::BVec4 => 4,
            ValueType::Mat2 => 4,
            ValueType::Mat3 => 9,
            ValueType::Mat4 => 16,
        }
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, ValueType::Mat2 | ValueType::Mat3 | ValueType::Mat4)
    }

    /// Component kind, `None` for `void`.
    pub fn component(self) -> Option<ScalarKind> {
        Some(match self {
            ValueType::Void => return None,
            ValueType::Bool | ValueType::BVec2 | ValueType::BVec3 | ValueType::BVec4 => {
                ScalarKind::Bool
            }
            ValueType::I32 | ValueType::IVec2 | ValueType::IVec3 | ValueType::IVec4 => {
                ScalarKind::I32
            }
            ValueType::U32 | ValueType::UVec2 | ValueType::UVec3 | ValueType::UVec4 => {
                ScalarKind::U32
            }
            ValueType::F32
            | ValueType::Vec2
            | ValueType::Vec3
            | ValueType::Vec4
            | ValueType::Mat2
            | ValueType::Mat3
            | ValueType::Mat4 => ScalarKind::F32,
        })
    }

    /// Scalar or vector type with the given component kind and length (1..=4).
    pub fn from_parts(kind: ScalarKind, len: usize) -> Option<ValueType> {
        use ScalarKind as K;
        Some(match (kind, len) {
            (K::Bool, 1) => ValueType::Bool,
            (K::I32, 1) => ValueType::I32,
            (K::U32, 1) => ValueType::U32,
            (K::F32, 1) => ValueType::F32,
            (K::Bool, 2) => ValueType::BVec2,
            (K::I32, 2) => ValueType::IVec2,
            (K::U32, 2) => ValueType::UVec2,
            (K::F32, 2) => ValueType::Vec2,
            (K::Bool, 3) => ValueType::BVec3,
            (K::I32, 3) => ValueType::IVec3,
            (K::U32, 3) => ValueType::UVec3,
            (K::F32, 3) => ValueType::Vec3,
            (K::Bool, 4) => ValueType::BVec4,
            (K::I32, 4) => ValueType::IVec4,
            (K::U32, 4) => ValueType::UVec4,
            (K::F32, 4) => ValueType::Vec4,
            _ => return None,
        })
    }

    /// Same component kind, different length. Matrices and `void` are returned unchanged.
    pub fn with_length(self, len: usize) -> ValueType {
        if self.is_matrix() {
            return self;
        }
        self.component()
            .and_then(|k| ValueType::from_parts(k, len))
            .unwrap_or(self)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl())
    }
}

/// Shader stage a builder is currently generating code for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

/// Complete WGSL shader bundle for a render pipeline.
#[derive(Clone, Debug)]
pub struct WgslShaderBundle {
    /// WGSL declarations shared between stages (directives, bindings, structs).
    pub common: String,
    /// A standalone vertex WGSL module (common + @vertex entry).
    pub vertex: String,
    /// A standalone fragment WGSL module (common + @fragment entry).
    pub fragment: String,
    /// A combined WGSL module containing both entry points.
    pub module: String,
}

/// Assembled compute module plus the launch configuration it was generated for.
#[derive(Clone, Debug)]
pub struct ComputeModule {
    pub code: String,
    pub workgroup_size: [u32; 3],
    /// Directive names in emission order.
    pub directives: Vec<String>,
    /// Storage/uniform binding names in binding order.
    pub bindings: Vec<String>,
    /// Launch grid for the node's current count, split by the builder options.
    pub dispatch: ComputeDispatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_treat_matrices_as_cells() {
        assert_eq!(ValueType::Void.length(), 0);
        assert_eq!(ValueType::U32.length(), 1);
        assert_eq!(ValueType::UVec4.length(), 4);
        assert_eq!(ValueType::Mat3.length(), 9);
        assert!(ValueType::Mat3.is_matrix());
        assert!(!ValueType::Vec3.is_matrix());
    }

    #[test]
    fn with_length_keeps_component_kind() {
        assert_eq!(ValueType::U32.with_length(3), ValueType::UVec3);
        assert_eq!(ValueType::Vec4.with_length(1), ValueType::F32);
        assert_eq!(ValueType::Mat4.with_length(2), ValueType::Mat4);
    }

    #[test]
    fn serde_names_match_node_type_tags() {
        let json = serde_json::to_string(&ValueType::U32).unwrap();
        assert_eq!(json, "\"uint\"");
        let ty: ValueType = serde_json::from_str("\"uvec4\"").unwrap();
        assert_eq!(ty, ValueType::UVec4);
    }
}
