//! Subgroup collective operations.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::read_tag;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::ValueType;

const NODE: &str = "SubgroupFunctionNode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubgroupMethod {
    #[serde(rename = "subgroupElect")]
    Elect,
    #[serde(rename = "subgroupAll")]
    All,
    #[serde(rename = "subgroupAny")]
    Any,
    #[serde(rename = "subgroupBroadcast")]
    Broadcast,
    #[serde(rename = "subgroupBroadcastFirst")]
    BroadcastFirst,
    #[serde(rename = "subgroupBallot")]
    Ballot,
    #[serde(rename = "subgroupAdd")]
    Add,
    #[serde(rename = "subgroupExclusiveAdd")]
    ExclusiveAdd,
    #[serde(rename = "subgroupMul")]
    Mul,
    #[serde(rename = "subgroupAnd")]
    And,
    #[serde(rename = "subgroupOr")]
    Or,
    #[serde(rename = "subgroupXor")]
    Xor,
    #[serde(rename = "subgroupMin")]
    Min,
    #[serde(rename = "subgroupMax")]
    Max,
    #[serde(rename = "subgroupShuffle")]
    Shuffle,
    #[serde(rename = "subgroupShuffleXor")]
    ShuffleXor,
    #[serde(rename = "subgroupShuffleUp")]
    ShuffleUp,
    #[serde(rename = "subgroupShuffleDown")]
    ShuffleDown,
}

impl SubgroupMethod {
    pub fn name(self) -> &'static str {
        match self {
            SubgroupMethod::Elect => "subgroupElect",
            SubgroupMethod::All => "subgroupAll",
            SubgroupMethod::Any => "subgroupAny",
            SubgroupMethod::Broadcast => "subgroupBroadcast",
            SubgroupMethod::BroadcastFirst => "subgroupBroadcastFirst",
            SubgroupMethod::Ballot => "subgroupBallot",
            SubgroupMethod::Add => "subgroupAdd",
            SubgroupMethod::ExclusiveAdd => "subgroupExclusiveAdd",
            SubgroupMethod::Mul => "subgroupMul",
            SubgroupMethod::And => "subgroupAnd",
            SubgroupMethod::Or => "subgroupOr",
            SubgroupMethod::Xor => "subgroupXor",
            SubgroupMethod::Min => "subgroupMin",
            SubgroupMethod::Max => "subgroupMax",
            SubgroupMethod::Shuffle => "subgroupShuffle",
            SubgroupMethod::ShuffleXor => "subgroupShuffleXor",
            SubgroupMethod::ShuffleUp => "subgroupShuffleUp",
            SubgroupMethod::ShuffleDown => "subgroupShuffleDown",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            SubgroupMethod::Elect => 0,
            SubgroupMethod::Broadcast
            | SubgroupMethod::Shuffle
            | SubgroupMethod::ShuffleXor
            | SubgroupMethod::ShuffleUp
            | SubgroupMethod::ShuffleDown => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for SubgroupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct SubgroupFunctionNode {
    core: NodeCore,
    method: Cell<SubgroupMethod>,
    a_node: Option<NodeRef>,
    b_node: Option<NodeRef>,
}

impl SubgroupFunctionNode {
    pub fn new(method: SubgroupMethod, a_node: Option<NodeRef>, b_node: Option<NodeRef>) -> Self {
        Self {
            core: NodeCore::new(None),
            method: Cell::new(method),
            a_node,
            b_node,
        }
    }

    pub fn method(&self) -> SubgroupMethod {
        self.method.get()
    }

    /// The wider operand type; matrices count as zero-width and ties go to
    /// the first operand.
    fn input_type(&self, builder: &dyn NodeBuilder) -> NodeResult<Option<ValueType>> {
        let width = |ty: ValueType| if ty.is_matrix() { 0 } else { ty.length() };
        let a = self.a_node.as_ref().map(|n| n.node_type(builder)).transpose()?;
        let b = self.b_node.as_ref().map(|n| n.node_type(builder)).transpose()?;
        Ok(match (a, b) {
            (Some(a), Some(b)) if width(b) > width(a) => Some(b),
            (Some(a), _) => Some(a),
            (None, b) => b,
        })
    }
}

impl ShaderNode for SubgroupFunctionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn node_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        match self.method.get() {
            SubgroupMethod::Elect => Ok(ValueType::Bool),
            SubgroupMethod::Ballot => Ok(ValueType::UVec4),
            method => self.input_type(builder)?.ok_or_else(|| NodeError::TypeResolution {
                node: NODE,
                reason: format!("{method} has no operand to take its type from"),
            }),
        }
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        builder.enable_subgroups();

        let method = self.method.get();
        let operands: Vec<&NodeRef> = self.a_node.iter().chain(self.b_node.iter()).collect();
        if operands.len() != method.arity() || (self.a_node.is_none() && self.b_node.is_some()) {
            return Err(NodeError::malformed(
                NODE,
                format!("{method} takes {} operand(s), got {}", method.arity(), operands.len()),
            ));
        }

        let ty = self.node_type(&*builder)?;
        let input = self.input_type(&*builder)?;

        let mut params = Vec::with_capacity(operands.len());
        match (method, &self.a_node, &self.b_node) {
            (SubgroupMethod::Broadcast | SubgroupMethod::Shuffle, Some(a), Some(b)) => {
                params.push(a.build_expr(builder, input)?);
                let b_ty = b.node_type(&*builder)?;
                let lane = if b_ty == ValueType::F32 { ValueType::I32 } else { b_ty };
                params.push(b.build_expr(builder, Some(lane))?);
            }
            (
                SubgroupMethod::ShuffleXor | SubgroupMethod::ShuffleUp | SubgroupMethod::ShuffleDown,
                Some(a),
                Some(b),
            ) => {
                params.push(a.build_expr(builder, input)?);
                params.push(b.build_expr(builder, Some(ValueType::U32))?);
            }
            _ => {
                for operand in operands {
                    params.push(operand.build_expr(builder, input)?);
                }
            }
        }

        let name = builder.get_method(method.name(), ty);
        let call = if params.is_empty() {
            format!("{name}()")
        } else {
            format!("{name}( {} )", params.join(", "))
        };
        Ok(Some(builder.format(&call, ty, ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("method", self.method.get())?;
        Ok(())
    }

    fn deserialize(&self, data: &NodeRecord) -> NodeResult<()> {
        let method = read_tag(data, "method", |method| NodeError::UnknownOperation { node: NODE, method })?;
        if let Some(method) = method {
            self.method.set(method);
        }
        Ok(())
    }
}

pub fn subgroup_func(method: SubgroupMethod, a: Option<&NodeRef>, b: Option<&NodeRef>) -> NodeRef {
    NodeRef::new(SubgroupFunctionNode::new(method, a.cloned(), b.cloned()))
}

pub fn subgroup_elect() -> NodeRef {
    subgroup_func(SubgroupMethod::Elect, None, None)
}

pub fn subgroup_ballot(pred: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::Ballot, Some(pred), None)
}

pub fn subgroup_add(e: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::Add, Some(e), None)
}

pub fn subgroup_exclusive_add(e: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::ExclusiveAdd, Some(e), None)
}

pub fn subgroup_max(e: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::Max, Some(e), None)
}

pub fn subgroup_broadcast(e: &NodeRef, id: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::Broadcast, Some(e), Some(id))
}

pub fn subgroup_shuffle(e: &NodeRef, id: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::Shuffle, Some(e), Some(id))
}

pub fn subgroup_shuffle_xor(e: &NodeRef, mask: &NodeRef) -> NodeRef {
    subgroup_func(SubgroupMethod::ShuffleXor, Some(e), Some(mask))
}
