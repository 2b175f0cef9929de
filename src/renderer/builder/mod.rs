//! Builder contract consumed by nodes, plus the per-compile memoization table.
//!
//! - `NodeBuilder`: stage context, type/method resolution, line emission,
//!   built-in accessors and declaration registries
//! - `NodeCache`: results of already generated nodes and the in-progress stack
//! - `wgsl`: the WGSL implementation

pub mod wgsl;

use std::collections::HashMap;

pub use wgsl::WgslNodeBuilder;

use super::error::{NodeError, NodeResult};
use super::node::{HashKey, NodeRef};
use super::nodes::barrier_nodes::BarrierScope;
use super::types::{ShaderStage, ValueType};
use super::utils::{format_conversion, wgsl_method};

/// Memoization key: the same node, in the same stage, requested the same way.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub hash: HashKey,
    pub stage: ShaderStage,
    pub output: Option<ValueType>,
    pub assign: bool,
}

/// Per-compile memoization table, owned by one builder invocation.
#[derive(Debug, Default)]
pub struct NodeCache {
    entries: HashMap<CacheKey, Option<String>>,
    building: Vec<NodeRef>,
    named: HashMap<HashKey, NodeRef>,
}

impl NodeCache {
    pub fn get(&self, key: &CacheKey) -> Option<Option<String>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, snippet: Option<String>) {
        self.entries.insert(key, snippet);
    }

    /// Records the first node seen under a named key. A different node under
    /// the same key must carry the same declared attributes.
    pub fn claim_name(&mut self, node: &NodeRef) -> NodeResult<()> {
        let hash = node.hash_key();
        let Some(first) = self.named.get(&hash) else {
            self.named.insert(hash, node.clone());
            return Ok(());
        };
        if first.ptr_eq(node) {
            return Ok(());
        }

        let declared = first.to_record()?.fields;
        let requested = node.to_record()?.fields;
        if declared != requested {
            return Err(NodeError::malformed(
                node.type_name(),
                format!(
                    "{hash} is already declared as {} and cannot be redeclared as {}",
                    serde_json::Value::Object(declared),
                    serde_json::Value::Object(requested)
                ),
            ));
        }
        Ok(())
    }

    /// Marks `node` as being generated.
    pub fn enter(&mut self, node: &NodeRef) -> NodeResult<()> {
        let hash = node.hash_key();
        if self.building.iter().any(|n| n.hash_key() == hash) {
            return Err(NodeError::CyclicGraph { hash });
        }
        self.building.push(node.clone());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.building.pop();
    }

    /// The innermost node currently being generated.
    pub fn current(&self) -> Option<&NodeRef> {
        self.building.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compile-context collaborator: everything a node may ask of the builder.
pub trait NodeBuilder {
    fn shader_stage(&self) -> ShaderStage;

    /// Concrete target-language function name for an abstract operation.
    fn get_method(&self, method: &str, _ty: ValueType) -> String {
        wgsl_method(method).to_string()
    }

    /// Coerce `snippet` from `from` to `to`; `None` keeps the snippet as is.
    fn format(&self, snippet: &str, from: ValueType, to: Option<ValueType>) -> String {
        match to {
            Some(to) => format_conversion(snippet, from, to),
            None => snippet.to_string(),
        }
    }

    /// Append a statement to the current stage's flow code.
    fn add_line_flow_code(&mut self, code: &str);

    /// Bind `snippet` to a fresh `let` in the flow code and return its name.
    fn add_flow_let(&mut self, snippet: &str, ty: ValueType) -> String;

    fn get_vertex_index(&mut self) -> NodeResult<String>;
    fn get_instance_index(&mut self) -> NodeResult<String>;
    fn get_draw_index(&mut self) -> NodeResult<String>;
    fn get_subgroup_index(&mut self) -> NodeResult<String>;
    fn get_subgroup_size(&mut self) -> NodeResult<String>;
    fn get_workgroup_id(&mut self) -> NodeResult<String>;
    fn get_local_id(&mut self) -> NodeResult<String>;
    fn get_num_workgroups(&mut self) -> NodeResult<String>;
    fn get_global_id(&mut self) -> NodeResult<String>;

    /// Idempotent.
    fn enable_subgroups(&mut self);

    /// Request an `enable` directive. Idempotent by name.
    fn get_directive(&mut self, name: &str);

    /// Allocate (or reuse) a varying carrying `node` from the vertex stage and
    /// return its reference in the current stage.
    fn get_varying_from_node(&mut self, node: &NodeRef, ty: ValueType) -> NodeResult<String>;

    /// Declare `var<workgroup> name: array<ty, size>` once per name.
    ///
    /// The declaration registries fail when a name is reused for a different
    /// kind of resource or a different type.
    fn get_workgroup_array(&mut self, name: &str, ty: ValueType, size: u32) -> NodeResult<String>;

    /// Declare `var<workgroup> name: ty` once per name.
    fn get_workgroup_var(&mut self, name: &str, ty: ValueType) -> NodeResult<String>;

    /// Declare a read-write storage array binding once per name.
    fn get_storage_buffer(&mut self, name: &str, ty: ValueType, atomic: bool) -> NodeResult<String>;

    /// Declare a uniform binding once per name.
    fn get_uniform(&mut self, name: &str, ty: ValueType) -> NodeResult<String>;

    fn generate_control_barrier(&mut self, scope: BarrierScope) -> String;

    fn cache(&mut self) -> &mut NodeCache;

    fn current_node(&mut self) -> Option<NodeRef> {
        self.cache().current().cloned()
    }
}
