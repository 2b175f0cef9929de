//! Compute-stage built-ins.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::read_tag;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::{ShaderStage, ValueType};

const NODE: &str = "BuiltinNode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuiltinScope {
    SubgroupSize,
    WorkgroupId,
    LocalId,
    NumWorkgroups,
    GlobalId,
}

impl BuiltinScope {
    pub fn value_type(self) -> ValueType {
        match self {
            BuiltinScope::SubgroupSize => ValueType::U32,
            BuiltinScope::WorkgroupId
            | BuiltinScope::LocalId
            | BuiltinScope::NumWorkgroups
            | BuiltinScope::GlobalId => ValueType::UVec3,
        }
    }

    /// Legal only while generating the compute stage.
    pub fn is_compute_only(self) -> bool {
        !matches!(self, BuiltinScope::SubgroupSize)
    }
}

impl fmt::Display for BuiltinScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinScope::SubgroupSize => write!(f, "subgroupSize"),
            BuiltinScope::WorkgroupId => write!(f, "workgroupId"),
            BuiltinScope::LocalId => write!(f, "localId"),
            BuiltinScope::NumWorkgroups => write!(f, "numWorkgroups"),
            BuiltinScope::GlobalId => write!(f, "globalId"),
        }
    }
}

#[derive(Debug)]
pub struct BuiltinNode {
    core: NodeCore,
    scope: Cell<BuiltinScope>,
}

impl BuiltinNode {
    pub fn new(scope: BuiltinScope) -> Self {
        Self {
            core: NodeCore::new(Some(scope.value_type())),
            scope: Cell::new(scope),
        }
    }

    pub fn scope(&self) -> BuiltinScope {
        self.scope.get()
    }
}

impl ShaderNode for BuiltinNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn node_type(&self, _builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        Ok(self.scope.get().value_type())
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let scope = self.scope.get();
        let stage = builder.shader_stage();

        if scope.is_compute_only() && stage != ShaderStage::Compute {
            return Err(NodeError::InvalidStage {
                node: NODE,
                what: scope.to_string(),
                stage,
            });
        }

        let snippet = match scope {
            BuiltinScope::SubgroupSize => {
                if stage == ShaderStage::Vertex {
                    return Err(NodeError::StageRestriction {
                        node: NODE,
                        scope: scope.to_string(),
                        stage,
                    });
                }
                builder.enable_subgroups();
                builder.get_subgroup_size()?
            }
            BuiltinScope::WorkgroupId => builder.get_workgroup_id()?,
            BuiltinScope::LocalId => builder.get_local_id()?,
            BuiltinScope::NumWorkgroups => builder.get_num_workgroups()?,
            BuiltinScope::GlobalId => builder.get_global_id()?,
        };

        Ok(Some(builder.format(&snippet, scope.value_type(), ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("scope", self.scope.get())?;
        Ok(())
    }

    fn deserialize(&self, data: &NodeRecord) -> NodeResult<()> {
        let scope = read_tag(data, "scope", |scope| NodeError::UnknownScope { node: NODE, scope })?;
        if let Some(scope) = scope {
            self.scope.set(scope);
        }
        Ok(())
    }
}

pub fn subgroup_size() -> NodeRef {
    NodeRef::new(BuiltinNode::new(BuiltinScope::SubgroupSize))
}

pub fn workgroup_id() -> NodeRef {
    NodeRef::new(BuiltinNode::new(BuiltinScope::WorkgroupId))
}

pub fn local_id() -> NodeRef {
    NodeRef::new(BuiltinNode::new(BuiltinScope::LocalId))
}

pub fn num_workgroups() -> NodeRef {
    NodeRef::new(BuiltinNode::new(BuiltinScope::NumWorkgroups))
}

pub fn global_id() -> NodeRef {
    NodeRef::new(BuiltinNode::new(BuiltinScope::GlobalId))
}
