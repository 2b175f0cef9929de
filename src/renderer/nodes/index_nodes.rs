//! Index built-ins: vertex, instance, draw and subgroup invocation index.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::read_tag;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::{ShaderStage, ValueType};

const NODE: &str = "IndexNode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexScope {
    Vertex,
    Instance,
    Draw,
    Subgroup,
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexScope::Vertex => write!(f, "vertex"),
            IndexScope::Instance => write!(f, "instance"),
            IndexScope::Draw => write!(f, "draw"),
            IndexScope::Subgroup => write!(f, "subgroup"),
        }
    }
}

/// Resolves a `u32` index built-in.
///
/// Vertex and compute stages read the raw identifier. A fragment stage reads
/// vertex-stage indices through a varying; the subgroup index is native to
/// every stage but vertex, where it is rejected.
#[derive(Debug)]
pub struct IndexNode {
    core: NodeCore,
    scope: Cell<IndexScope>,
}

impl IndexNode {
    pub fn new(scope: IndexScope) -> Self {
        Self {
            core: NodeCore::new(Some(ValueType::U32)),
            scope: Cell::new(scope),
        }
    }

    pub fn scope(&self) -> IndexScope {
        self.scope.get()
    }
}

impl ShaderNode for IndexNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let scope = self.scope.get();
        let stage = builder.shader_stage();
        let ty = ValueType::U32;

        if scope == IndexScope::Subgroup {
            if stage == ShaderStage::Vertex {
                return Err(NodeError::StageRestriction {
                    node: NODE,
                    scope: scope.to_string(),
                    stage,
                });
            }
            builder.enable_subgroups();
        }

        let raw = matches!(stage, ShaderStage::Vertex | ShaderStage::Compute)
            || scope == IndexScope::Subgroup;

        let snippet = if raw {
            match scope {
                IndexScope::Vertex => builder.get_vertex_index()?,
                IndexScope::Instance => builder.get_instance_index()?,
                IndexScope::Draw => builder.get_draw_index()?,
                IndexScope::Subgroup => builder.get_subgroup_index()?,
            }
        } else {
            let node = builder.current_node().ok_or_else(|| {
                NodeError::malformed(NODE, "varying requested outside of a build")
            })?;
            builder.get_varying_from_node(&node, ty)?
        };

        Ok(Some(builder.format(&snippet, ty, ctx.output)))
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

pub fn vertex_index() -> NodeRef {
    NodeRef::new(IndexNode::new(IndexScope::Vertex))
}

pub fn instance_index() -> NodeRef {
    NodeRef::new(IndexNode::new(IndexScope::Instance))
}

pub fn draw_index() -> NodeRef {
    NodeRef::new(IndexNode::new(IndexScope::Draw))
}

pub fn subgroup_index() -> NodeRef {
    NodeRef::new(IndexNode::new(IndexScope::Subgroup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::builder::WgslNodeBuilder;

    #[test]
    fn subgroup_index_is_rejected_in_vertex_stage() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Vertex);
        let err = subgroup_index().build_expr(&mut builder, None).unwrap_err();
        assert_eq!(
            err,
            NodeError::StageRestriction {
                node: "IndexNode",
                scope: "subgroup".to_string(),
                stage: ShaderStage::Vertex,
            }
        );
    }

    #[test]
    fn subgroup_index_is_raw_in_fragment_stage() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Fragment);
        let snippet = subgroup_index().build_expr(&mut builder, None).unwrap();
        assert_eq!(snippet, "subgroupIndex");
        assert!(builder.varying_names().is_empty());
        assert_eq!(builder.directives(), ["subgroups"]);
    }

    #[test]
    fn vertex_index_is_raw_in_vertex_stage() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Vertex);
        let snippet = vertex_index().build_expr(&mut builder, None).unwrap();
        assert_eq!(snippet, "vertexIndex");
    }

    #[test]
    fn instance_index_reaches_fragment_through_one_varying() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Fragment);
        let node = instance_index();
        let as_uint = node.build_expr(&mut builder, None).unwrap();
        let as_float = node.build_expr(&mut builder, Some(ValueType::F32)).unwrap();
        assert_eq!(as_uint, "input.nodeVarying0");
        assert_eq!(as_float, "f32( input.nodeVarying0 )");
        assert_eq!(builder.varying_names(), ["nodeVarying0"]);
    }

    #[test]
    fn instance_index_in_compute_is_linearized() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let snippet = instance_index().build_expr(&mut builder, None).unwrap();
        assert_eq!(snippet, "instanceIndex");
    }

    #[test]
    fn scope_round_trips_through_record() {
        let node = IndexNode::new(IndexScope::Draw);
        let mut record = NodeRecord::new("IndexNode", node.core().id());
        node.serialize(&mut record);
        assert_eq!(record.raw("scope"), Some(&serde_json::json!("draw")));

        let other = IndexNode::new(IndexScope::Vertex);
        other.deserialize(&record).unwrap();
        assert_eq!(other.scope(), IndexScope::Draw);
    }

    #[test]
    fn unknown_scope_in_record_fails() {
        let node = IndexNode::new(IndexScope::Vertex);
        let mut record = NodeRecord::new("IndexNode", node.core().id());
        record.set("scope", "primitive").unwrap();
        let err = node.deserialize(&record).unwrap_err();
        assert_eq!(
            err,
            NodeError::UnknownScope {
                node: "IndexNode",
                scope: "primitive".to_string(),
            }
        );
    }
}
