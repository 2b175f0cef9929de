//! Memory and execution barriers.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::read_tag;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::{ShaderStage, ValueType};

const NODE: &str = "BarrierNode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierScope {
    Workgroup,
    Subgroup,
    Texture,
    Storage,
}

impl fmt::Display for BarrierScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierScope::Workgroup => write!(f, "workgroup"),
            BarrierScope::Subgroup => write!(f, "subgroup"),
            BarrierScope::Texture => write!(f, "texture"),
            BarrierScope::Storage => write!(f, "storage"),
        }
    }
}

/// Effect node: appends a barrier statement, yields no value.
#[derive(Debug)]
pub struct BarrierNode {
    core: NodeCore,
    scope: Cell<BarrierScope>,
}

impl BarrierNode {
    pub fn new(scope: BarrierScope) -> Self {
        Self {
            core: NodeCore::new(Some(ValueType::Void)),
            scope: Cell::new(scope),
        }
    }

    pub fn scope(&self) -> BarrierScope {
        self.scope.get()
    }
}

impl ShaderNode for BarrierNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn has_side_effects(&self) -> bool {
        true
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        _ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let scope = self.scope.get();
        let stage = builder.shader_stage();
        if stage != ShaderStage::Compute {
            return Err(NodeError::InvalidStage {
                node: NODE,
                what: format!("{scope}Barrier"),
                stage,
            });
        }

        let snippet = builder.generate_control_barrier(scope);
        builder.add_line_flow_code(&snippet);
        Ok(None)
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

pub fn barrier(scope: BarrierScope) -> NodeRef {
    NodeRef::new(BarrierNode::new(scope))
}

pub fn workgroup_barrier() -> NodeRef {
    barrier(BarrierScope::Workgroup)
}

pub fn subgroup_barrier() -> NodeRef {
    barrier(BarrierScope::Subgroup)
}

pub fn texture_barrier() -> NodeRef {
    barrier(BarrierScope::Texture)
}

pub fn storage_barrier() -> NodeRef {
    barrier(BarrierScope::Storage)
}
