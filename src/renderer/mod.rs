//! Shader node IR compiled to WGSL, with compute/GPGPU nodes.
//!
//! This module is organized into several submodules:
//! - `types`: Core type definitions (ValueType, ShaderStage, ComputeModule, etc.)
//! - `error`: NodeError, the fail-fast diagnostics of a compile
//! - `node`: Base node contract, NodeRef handles and memoized generation
//! - `builder`: NodeBuilder contract and the WGSL builder
//! - `nodes`: Node families (indices, built-ins, barriers, atomics, subgroups, ...)
//! - `frame`: Per-frame update driver and the compute renderer contract
//! - `options`: Builder configuration
//! - `utils`: Utility functions for formatting and type conversion
//! - `validation`: WGSL validation using naga
//!
//! The main entry points are:
//! - `WgslNodeBuilder::build_compute`: Generate a compute module from a `ComputeNode`
//! - `WgslNodeBuilder::build_render`: Generate a vertex/fragment bundle
//! - `NodeFrame::update_before_node`: Submit compute dispatches

pub mod builder;
pub mod error;
pub mod frame;
pub mod node;
pub mod nodes;
pub mod options;
pub mod types;
pub mod utils;
pub mod validation;

pub use builder::{NodeBuilder, WgslNodeBuilder};
pub use error::{NodeError, NodeResult};
pub use frame::{ComputeRenderer, NodeFrame};
pub use node::{GenContext, HashKey, NodeCore, NodeId, NodeRecord, NodeRef, NodeUpdateType, ShaderNode};
pub use options::BuilderOptions;
pub use types::{ComputeModule, ShaderStage, ValueType, WgslShaderBundle};
pub use validation::{validate_wgsl, validate_wgsl_with_context};
