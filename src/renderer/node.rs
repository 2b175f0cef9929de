//! Base node contract: identity, hashing, type resolution, memoized generation
//! and the plain-record serialization payload.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::builder::{CacheKey, NodeBuilder};
use super::error::{NodeError, NodeResult};
use super::frame::ComputeRenderer;
use super::types::ValueType;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique node identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cache key identifying "the same node" within one compile.
///
/// Named nodes collapse by node kind and name; everything else is keyed by identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKey {
    Named { kind: &'static str, name: String },
    Id(NodeId),
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Named { kind, name } => write!(f, "{kind} `{name}`"),
            HashKey::Id(id) => write!(f, "node {id}"),
        }
    }
}

/// When a node needs side-effecting work around rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeUpdateType {
    #[default]
    None,
    /// Once per frame.
    Frame,
    /// Once per render call.
    Render,
    /// Every time an object using the node is submitted.
    Object,
}

/// State shared by every node kind.
pub struct NodeCore {
    id: NodeId,
    node_type: Option<ValueType>,
    name: Option<String>,
    version: Cell<u64>,
    update_before_type: NodeUpdateType,
    update_after_type: NodeUpdateType,
    dispose_listeners: RefCell<Vec<Box<dyn Fn(NodeId)>>>,
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("name", &self.name)
            .field("version", &self.version.get())
            .finish_non_exhaustive()
    }
}

impl NodeCore {
    /// `node_type` is `None` when the output type depends on the builder context.
    pub fn new(node_type: Option<ValueType>) -> Self {
        Self {
            id: NodeId::next(),
            node_type,
            name: None,
            version: Cell::new(0),
            update_before_type: NodeUpdateType::None,
            update_after_type: NodeUpdateType::None,
            dispose_listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(self, version: u64) -> Self {
        self.version.set(version);
        self
    }

    pub fn with_update_before(mut self, update: NodeUpdateType) -> Self {
        self.update_before_type = update;
        self
    }

    pub fn with_update_after(mut self, update: NodeUpdateType) -> Self {
        self.update_after_type = update;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> Option<ValueType> {
        self.node_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn update_before_type(&self) -> NodeUpdateType {
        self.update_before_type
    }

    pub fn update_after_type(&self) -> NodeUpdateType {
        self.update_after_type
    }

    /// Invalidates downstream caches by bumping `version`.
    pub fn set_needs_update(&self, value: bool) {
        if value {
            self.version.set(self.version.get() + 1);
        }
    }

    pub fn on_dispose(&self, listener: impl Fn(NodeId) + 'static) {
        self.dispose_listeners.borrow_mut().push(Box::new(listener));
    }

    /// Notifies every dispose listener.
    pub fn dispose(&self) {
        for listener in self.dispose_listeners.borrow().iter() {
            listener(self.id);
        }
    }
}

/// Explicit generation context threaded down the `build` call chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GenContext {
    /// Requested output type; `None` means the node's own type,
    /// `Some(Void)` requests statement form.
    pub output: Option<ValueType>,
    /// The node is being generated as the target of an assignment.
    pub assign: bool,
}

impl GenContext {
    pub const fn value() -> Self {
        Self {
            output: None,
            assign: false,
        }
    }

    pub const fn output(ty: ValueType) -> Self {
        Self {
            output: Some(ty),
            assign: false,
        }
    }

    pub const fn statement() -> Self {
        Self::output(ValueType::Void)
    }

    pub const fn assign_target() -> Self {
        Self {
            output: None,
            assign: true,
        }
    }

    pub fn is_statement(&self) -> bool {
        self.output == Some(ValueType::Void)
    }
}

/// Plain-record serialization payload: the node kind, its identity and the
/// declared tag fields. Derived and cached state is never written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub node_type: String,
    pub uuid: NodeId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NodeRecord {
    pub fn new(node_type: impl Into<String>, uuid: NodeId) -> Self {
        Self {
            node_type: node_type.into(),
            uuid,
            fields: serde_json::Map::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Serialize) -> NodeResult<()> {
        let value = serde_json::to_value(value).map_err(|e| {
            NodeError::malformed("NodeRecord", format!("field `{key}` of {}: {e}", self.node_type))
        })?;
        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Reads a field; `None` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.fields
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
    }

    pub fn raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// A unit of the shader IR producing a typed value or a side-effecting statement.
pub trait ShaderNode: fmt::Debug {
    fn core(&self) -> &NodeCore;

    /// Node kind name used in diagnostics and records.
    fn type_name(&self) -> &'static str;

    fn node_type(&self, _builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        self.core()
            .node_type()
            .ok_or_else(|| NodeError::TypeResolution {
                node: self.type_name(),
                reason: "node has no declared type".to_string(),
            })
    }

    fn hash_key(&self) -> HashKey {
        let core = self.core();
        match core.name() {
            Some(name) => HashKey::Named {
                kind: self.type_name(),
                name: name.to_string(),
            },
            None => HashKey::Id(core.id()),
        }
    }

    /// Nodes that append statements when generated. They run once per
    /// `(hash, stage)`; later requests reuse the emitted value.
    fn has_side_effects(&self) -> bool {
        false
    }

    /// Stage-aware code production. Statement-like nodes append lines through
    /// the builder and return `None`.
    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>>;

    /// Work executed before an object using this node is submitted.
    fn update_before(&self, _renderer: &mut dyn ComputeRenderer) -> anyhow::Result<()> {
        Ok(())
    }

    /// Work executed after an object using this node was submitted.
    fn update_after(&self, _renderer: &mut dyn ComputeRenderer) -> anyhow::Result<()> {
        Ok(())
    }

    /// Writes tag fields beyond the base `type`/`uuid`.
    fn serialize(&self, _data: &mut NodeRecord) -> NodeResult<()> {
        Ok(())
    }

    fn deserialize(&self, _data: &NodeRecord) -> NodeResult<()> {
        Ok(())
    }
}

/// Shared handle to a node. A node may have many parents; it lives as long as
/// its longest holder.
#[derive(Clone)]
pub struct NodeRef(Rc<dyn ShaderNode>);

impl NodeRef {
    pub fn new<N: ShaderNode + 'static>(node: N) -> Self {
        NodeRef(Rc::new(node))
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Generates this node once per `(hash, stage, output, assign)` within a compile.
    ///
    /// A second request for the same key returns the cached result without
    /// emitting again. Side-effecting nodes are keyed by `(hash, stage)` only.
    /// Re-entering a node that is still being generated fails with `CyclicGraph`.
    pub fn build(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        if self.has_side_effects() {
            return self.build_once(builder, ctx);
        }
        let key = CacheKey {
            hash: self.hash_key(),
            stage: builder.shader_stage(),
            output: ctx.output,
            assign: ctx.assign,
        };
        self.generate_cached(builder, key, ctx)
    }

    fn build_once(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let key = CacheKey {
            hash: self.hash_key(),
            stage: builder.shader_stage(),
            output: None,
            assign: false,
        };
        let first = if ctx.is_statement() {
            GenContext::statement()
        } else {
            GenContext::value()
        };
        let emitted = self.generate_cached(builder, key, first)?;
        if ctx.is_statement() {
            return Ok(None);
        }

        // An earlier statement-form request discarded the value.
        let value = emitted.ok_or_else(|| NodeError::malformed(self.type_name(), "node produced no value"))?;
        let ty = self.node_type(&*builder)?;
        Ok(Some(builder.format(&value, ty, ctx.output)))
    }

    fn generate_cached(
        &self,
        builder: &mut dyn NodeBuilder,
        key: CacheKey,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        if matches!(key.hash, HashKey::Named { .. }) {
            builder.cache().claim_name(self)?;
        }
        if let Some(hit) = builder.cache().get(&key) {
            log::trace!("[builder] cache hit for {} ({})", key.hash, self.type_name());
            return Ok(hit);
        }

        builder.cache().enter(self)?;
        let result = self.0.generate(builder, ctx);
        builder.cache().leave();

        let snippet = result?;
        builder.cache().insert(key, snippet.clone());
        Ok(snippet)
    }

    /// Builds the node as an operand; fails if it produced no value.
    pub fn build_expr(
        &self,
        builder: &mut dyn NodeBuilder,
        output: Option<ValueType>,
    ) -> NodeResult<String> {
        self.build(
            builder,
            GenContext {
                output,
                assign: false,
            },
        )?
        .ok_or_else(|| NodeError::malformed(self.type_name(), "node produced no value"))
    }

    pub fn to_record(&self) -> NodeResult<NodeRecord> {
        let mut record = NodeRecord::new(self.type_name(), self.core().id());
        self.serialize(&mut record)?;
        Ok(record)
    }
}

impl Deref for NodeRef {
    type Target = dyn ShaderNode;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<N: ShaderNode + 'static> From<Rc<N>> for NodeRef {
    fn from(node: Rc<N>) -> Self {
        NodeRef(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::renderer::builder::WgslNodeBuilder;
    use crate::renderer::nodes::code_nodes::{ExpressionNode, StackNode, assign, expression};
    use crate::renderer::nodes::storage_nodes::storage;
    use crate::renderer::nodes::workgroup_nodes::workgroup_array;
    use crate::renderer::types::ShaderStage;

    #[test]
    fn named_nodes_hash_by_kind_and_name() {
        let a: NodeRef = storage("counter", ValueType::U32, None).into();
        let b: NodeRef = storage("counter", ValueType::U32, None).into();
        assert_ne!(a.core().id(), b.core().id());
        assert_eq!(
            a.hash_key(),
            HashKey::Named {
                kind: "StorageBufferNode",
                name: "counter".to_string(),
            }
        );
        assert_eq!(a.hash_key(), b.hash_key());

        let shared: NodeRef = workgroup_array("counter", ValueType::U32, 64).into();
        assert_ne!(a.hash_key(), shared.hash_key());
    }

    #[test]
    fn unnamed_nodes_hash_by_identity() {
        let a = expression("1u", ValueType::U32);
        let b = expression("1u", ValueType::U32);
        assert_ne!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn same_name_with_different_attributes_is_rejected() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let small: NodeRef = workgroup_array("data", ValueType::U32, 64).into();
        let large: NodeRef = workgroup_array("data", ValueType::U32, 128).into();
        let twin: NodeRef = workgroup_array("data", ValueType::U32, 64).into();

        small.build_expr(&mut builder, None).unwrap();
        assert_eq!(twin.build_expr(&mut builder, None).unwrap(), "data");
        let err = large.build_expr(&mut builder, None).unwrap_err();
        assert!(matches!(err, NodeError::MalformedNode { node: "WorkgroupArrayNode", .. }));
        assert_eq!(builder.workgroup_declarations(), ["var<workgroup> data: array<u32, 64>;"]);
    }

    #[test]
    fn side_effects_are_emitted_once_across_contexts() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let write = assign(&expression("total", ValueType::U32), &expression("1u", ValueType::U32));

        assert_eq!(write.build(&mut builder, GenContext::statement()).unwrap(), None);
        assert_eq!(
            write.build_expr(&mut builder, Some(ValueType::F32)).unwrap(),
            "f32( total )"
        );
        assert_eq!(builder.flow_code(), ["total = 1u;"]);
    }

    #[test]
    fn needs_update_bumps_version() {
        let core = NodeCore::new(None);
        core.set_needs_update(false);
        assert_eq!(core.version(), 0);
        core.set_needs_update(true);
        core.set_needs_update(true);
        assert_eq!(core.version(), 2);
    }

    #[test]
    fn dispose_notifies_listeners() {
        let core = NodeCore::new(None);
        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();
        core.on_dispose(move |id| sink.set(Some(id)));
        core.dispose();
        assert_eq!(seen.get(), Some(core.id()));
    }

    #[test]
    fn build_is_memoized_per_compile() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = expression("workgroupBarrier()", ValueType::Void);

        let stack = StackNode::new();
        stack.push(node.clone());
        stack.push(node.clone());
        NodeRef::from(stack)
            .build(&mut builder, GenContext::statement())
            .unwrap();
        let again = node.build(&mut builder, GenContext::statement()).unwrap();

        assert_eq!(again, None);
        assert_eq!(builder.flow_code(), ["workgroupBarrier();".to_string()]);
    }

    #[test]
    fn self_referencing_graph_is_rejected() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let stack = StackNode::new();
        let as_ref = NodeRef::from(stack.clone());
        stack.push(as_ref.clone());

        let err = as_ref.build(&mut builder, GenContext::statement()).unwrap_err();
        assert!(matches!(err, NodeError::CyclicGraph { .. }));
    }

    #[test]
    fn build_expr_rejects_statement_only_nodes() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let stack: NodeRef = StackNode::new().into();
        let err = stack.build_expr(&mut builder, None).unwrap_err();
        assert!(matches!(err, NodeError::MalformedNode { .. }));
    }

    #[test]
    fn record_carries_type_and_uuid() {
        let node: NodeRef = Rc::new(ExpressionNode::new("1u", ValueType::U32)).into();
        let record = node.to_record().unwrap();
        assert_eq!(record.node_type, "ExpressionNode");
        assert_eq!(record.uuid, node.core().id());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "ExpressionNode");
    }
}
