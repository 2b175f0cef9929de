//! Resource bindings: read-write storage arrays and uniforms.

use std::rc::Rc;

use super::code_nodes::generate_array_element;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::NodeResult;
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::ValueType;

/// `var<storage, read_write> name: array<T>` (or `array<atomic<T>>`),
/// bound once per name per compile.
#[derive(Debug)]
pub struct StorageBufferNode {
    core: NodeCore,
    element_type: ValueType,
    count: Option<u32>,
    atomic: bool,
}

impl StorageBufferNode {
    pub fn new(name: impl Into<String>, element_type: ValueType, count: Option<u32>) -> Rc<Self> {
        Rc::new(Self {
            core: NodeCore::new(Some(element_type)).named(name),
            element_type,
            count,
            atomic: false,
        })
    }

    /// Elements are `atomic<T>`; only usable through atomic functions.
    pub fn atomic(name: impl Into<String>, element_type: ValueType, count: Option<u32>) -> Rc<Self> {
        Rc::new(Self {
            core: NodeCore::new(Some(element_type)).named(name),
            element_type,
            count,
            atomic: true,
        })
    }

    pub fn element_type(&self) -> ValueType {
        self.element_type
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn element(self: &Rc<Self>, index: &NodeRef) -> NodeRef {
        NodeRef::new(StorageElementNode {
            core: NodeCore::new(Some(self.element_type)),
            buffer: self.clone().into(),
            index: index.clone(),
        })
    }
}

impl ShaderNode for StorageBufferNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "StorageBufferNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        _ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let name = self.core.name().unwrap_or("storageBuffer");
        Ok(Some(builder.get_storage_buffer(name, self.element_type, self.atomic)?))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("name", self.core.name())?;
        data.set("elementType", self.element_type)?;
        data.set("count", self.count)?;
        data.set("atomic", self.atomic)?;
        Ok(())
    }
}

/// `buffer[ index ]`. Bare as an assignment or atomic target, formatted when read.
#[derive(Debug)]
pub struct StorageElementNode {
    core: NodeCore,
    buffer: NodeRef,
    index: NodeRef,
}

impl ShaderNode for StorageElementNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "StorageElementNode"
    }

    fn node_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        self.buffer.node_type(builder)
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        generate_array_element(builder, ctx, &self.buffer, &self.index)
    }
}

#[derive(Debug)]
pub struct UniformNode {
    core: NodeCore,
    value_type: ValueType,
}

impl UniformNode {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            core: NodeCore::new(Some(value_type)).named(name),
            value_type,
        }
    }
}

impl ShaderNode for UniformNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "UniformNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let name = self.core.name().unwrap_or("uniformValue");
        let ident = builder.get_uniform(name, self.value_type)?;
        Ok(Some(builder.format(&ident, self.value_type, ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("name", self.core.name())?;
        data.set("valueType", self.value_type)?;
        Ok(())
    }
}

pub fn storage(name: &str, element_type: ValueType, count: Option<u32>) -> Rc<StorageBufferNode> {
    StorageBufferNode::new(name, element_type, count)
}

pub fn atomic_storage(name: &str, element_type: ValueType, count: Option<u32>) -> Rc<StorageBufferNode> {
    StorageBufferNode::atomic(name, element_type, count)
}

pub fn uniform(name: &str, value_type: ValueType) -> NodeRef {
    NodeRef::new(UniformNode::new(name, value_type))
}
