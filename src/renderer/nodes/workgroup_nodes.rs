//! Workgroup-shared memory: arrays, single values and element access.

use std::rc::Rc;

use super::code_nodes::generate_array_element;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::NodeResult;
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::ValueType;

pub const DEFAULT_WORKGROUP_ARRAY_SIZE: u32 = 64;

/// `var<workgroup> name: array<T, size>`, declared once per name per compile.
#[derive(Debug)]
pub struct WorkgroupArrayNode {
    core: NodeCore,
    element_type: ValueType,
    size: u32,
}

impl WorkgroupArrayNode {
    pub fn new(name: impl Into<String>, element_type: ValueType, size: u32) -> Rc<Self> {
        Rc::new(Self {
            core: NodeCore::new(Some(element_type)).named(name),
            element_type,
            size,
        })
    }

    pub fn with_default_size(name: impl Into<String>, element_type: ValueType) -> Rc<Self> {
        Self::new(name, element_type, DEFAULT_WORKGROUP_ARRAY_SIZE)
    }

    pub fn element_type(&self) -> ValueType {
        self.element_type
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn element(self: &Rc<Self>, index: &NodeRef) -> NodeRef {
        NodeRef::new(WorkgroupArrayElementNode {
            core: NodeCore::new(Some(self.element_type)),
            array: self.clone().into(),
            index: index.clone(),
        })
    }
}

impl ShaderNode for WorkgroupArrayNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "WorkgroupArrayNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        _ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let name = self.core.name().unwrap_or("workgroupArray");
        Ok(Some(builder.get_workgroup_array(name, self.element_type, self.size)?))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("name", self.core.name())?;
        data.set("elementType", self.element_type)?;
        data.set("size", self.size)?;
        Ok(())
    }
}

/// `array[ index ]`. Bare as an assignment target, formatted when read.
#[derive(Debug)]
pub struct WorkgroupArrayElementNode {
    core: NodeCore,
    array: NodeRef,
    index: NodeRef,
}

impl ShaderNode for WorkgroupArrayElementNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "WorkgroupArrayElementNode"
    }

    fn node_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        self.array.node_type(builder)
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        generate_array_element(builder, ctx, &self.array, &self.index)
    }
}

/// `var<workgroup> name: T`.
#[derive(Debug)]
pub struct WorkgroupLocalNode {
    core: NodeCore,
    value_type: ValueType,
}

impl WorkgroupLocalNode {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            core: NodeCore::new(Some(value_type)).named(name),
            value_type,
        }
    }
}

impl ShaderNode for WorkgroupLocalNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "WorkgroupLocalNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let name = self.core.name().unwrap_or("workgroupLocal");
        let ident = builder.get_workgroup_var(name, self.value_type)?;
        if ctx.assign {
            return Ok(Some(ident));
        }
        Ok(Some(builder.format(&ident, self.value_type, ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("name", self.core.name())?;
        data.set("valueType", self.value_type)?;
        Ok(())
    }
}

pub fn workgroup_array(name: &str, element_type: ValueType, size: u32) -> Rc<WorkgroupArrayNode> {
    WorkgroupArrayNode::new(name, element_type, size)
}

pub fn workgroup_local(name: &str, value_type: ValueType) -> NodeRef {
    NodeRef::new(WorkgroupLocalNode::new(name, value_type))
}
