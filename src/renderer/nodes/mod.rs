//! Node families of the shader IR.
//!
//! - `code_nodes`: literals, raw expressions, statement stacks, assignments
//! - `index_nodes`: vertex/instance/draw/subgroup indices
//! - `builtin_nodes`: compute built-ins (workgroup id, local id, ...)
//! - `barrier_nodes`: memory and execution barriers
//! - `atomic_nodes`: atomic read-modify-write operations
//! - `subgroup_nodes`: subgroup collective operations
//! - `workgroup_nodes`: workgroup-local storage and element access
//! - `storage_nodes`: storage-buffer and uniform bindings
//! - `compute_nodes`: compute dispatch wrapper

pub mod atomic_nodes;
pub mod barrier_nodes;
pub mod builtin_nodes;
pub mod code_nodes;
pub mod compute_nodes;
pub mod index_nodes;
pub mod storage_nodes;
pub mod subgroup_nodes;
pub mod workgroup_nodes;

use serde::de::DeserializeOwned;

use super::error::{NodeError, NodeResult};
use super::node::NodeRecord;

pub use atomic_nodes::{AtomicFunctionNode, AtomicMethod};
pub use barrier_nodes::{BarrierNode, BarrierScope};
pub use builtin_nodes::{BuiltinNode, BuiltinScope};
pub use code_nodes::{AssignNode, ConstNode, ConstValue, ExpressionNode, StackNode};
pub use compute_nodes::{ComputeDispatch, ComputeNode, DispatchIndirectArgs};
pub use index_nodes::{IndexNode, IndexScope};
pub use storage_nodes::{StorageBufferNode, StorageElementNode, UniformNode};
pub use subgroup_nodes::{SubgroupFunctionNode, SubgroupMethod};
pub use workgroup_nodes::{WorkgroupArrayElementNode, WorkgroupArrayNode, WorkgroupLocalNode};

/// Reads an enumerated tag field from a record.
///
/// Absent fields yield `None`; values outside the enumeration are reported
/// through `unknown` with the raw string.
pub(crate) fn read_tag<T: DeserializeOwned>(
    data: &NodeRecord,
    key: &str,
    unknown: impl FnOnce(String) -> NodeError,
) -> NodeResult<Option<T>> {
    match data.get::<T>(key) {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(_)) => {
            let raw = data
                .raw(key)
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default();
            Err(unknown(raw))
        }
    }
}
