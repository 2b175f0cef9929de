//! Atomic read-modify-write operations on storage or workgroup memory.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::read_tag;
use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::ValueType;

const NODE: &str = "AtomicFunctionNode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicMethod {
    #[serde(rename = "atomicLoad")]
    Load,
    #[serde(rename = "atomicStore")]
    Store,
    #[serde(rename = "atomicAdd")]
    Add,
    #[serde(rename = "atomicSub")]
    Sub,
    #[serde(rename = "atomicMax")]
    Max,
    #[serde(rename = "atomicMin")]
    Min,
    #[serde(rename = "atomicAnd")]
    And,
    #[serde(rename = "atomicOr")]
    Or,
    #[serde(rename = "atomicXor")]
    Xor,
}

impl AtomicMethod {
    pub fn name(self) -> &'static str {
        match self {
            AtomicMethod::Load => "atomicLoad",
            AtomicMethod::Store => "atomicStore",
            AtomicMethod::Add => "atomicAdd",
            AtomicMethod::Sub => "atomicSub",
            AtomicMethod::Max => "atomicMax",
            AtomicMethod::Min => "atomicMin",
            AtomicMethod::And => "atomicAnd",
            AtomicMethod::Or => "atomicOr",
            AtomicMethod::Xor => "atomicXor",
        }
    }

    /// Operand count including the memory location.
    pub fn arity(self) -> usize {
        match self {
            AtomicMethod::Load => 1,
            _ => 2,
        }
    }

    pub fn returns_value(self) -> bool {
        self != AtomicMethod::Store
    }
}

impl fmt::Display for AtomicMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `method( &location, value )`.
///
/// The call is emitted once per compile. With a destination the result is
/// assigned to it; otherwise a statement-form request discards the result and
/// an operand request binds it to a `let` that every later read reuses.
#[derive(Debug)]
pub struct AtomicFunctionNode {
    core: NodeCore,
    method: Cell<AtomicMethod>,
    a_node: NodeRef,
    b_node: Option<NodeRef>,
    store_node: Option<NodeRef>,
}

impl AtomicFunctionNode {
    pub fn new(method: AtomicMethod, a_node: NodeRef, b_node: Option<NodeRef>) -> Self {
        Self {
            core: NodeCore::new(None),
            method: Cell::new(method),
            a_node,
            b_node,
            store_node: None,
        }
    }

    /// Assigns the call result to `dest`.
    pub fn store_into(mut self, dest: NodeRef) -> Self {
        self.store_node = Some(dest);
        self
    }

    pub fn method(&self) -> AtomicMethod {
        self.method.get()
    }

    fn location_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        let ty = self.a_node.node_type(builder)?;
        match ty {
            ValueType::I32 | ValueType::U32 => Ok(ty),
            found => Err(NodeError::TypeMismatch {
                node: NODE,
                method: self.method.get().to_string(),
                expected: ValueType::U32,
                found,
            }),
        }
    }

    fn check_shape(&self) -> NodeResult<()> {
        let method = self.method.get();
        let given = 1 + usize::from(self.b_node.is_some());
        if given != method.arity() {
            return Err(NodeError::malformed(
                NODE,
                format!("{method} takes {} operand(s), got {given}", method.arity()),
            ));
        }
        if self.store_node.is_some() && !method.returns_value() {
            return Err(NodeError::malformed(
                NODE,
                format!("{method} returns nothing and cannot be assigned"),
            ));
        }
        Ok(())
    }
}

impl ShaderNode for AtomicFunctionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn node_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        if !self.method.get().returns_value() {
            return Ok(ValueType::Void);
        }
        match &self.store_node {
            Some(dest) => dest.node_type(builder),
            None => self.location_type(builder),
        }
    }

    fn has_side_effects(&self) -> bool {
        true
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        self.check_shape()?;
        let method = self.method.get();
        let ty = self.location_type(&*builder)?;

        let location = self
            .a_node
            .build(builder, GenContext::assign_target())?
            .ok_or_else(|| NodeError::malformed(NODE, "atomic location produced no value"))?;
        let mut params = vec![format!("&{location}")];

        if let Some(b_node) = &self.b_node {
            let b_ty = b_node.node_type(&*builder)?;
            if b_ty != ty {
                return Err(NodeError::TypeMismatch {
                    node: NODE,
                    method: method.to_string(),
                    expected: ty,
                    found: b_ty,
                });
            }
            params.push(b_node.build_expr(builder, Some(ty))?);
        }

        let call = format!("{}( {} )", builder.get_method(method.name(), ty), params.join(", "));

        if let Some(dest) = &self.store_node {
            let dest_ty = dest.node_type(&*builder)?;
            let target = dest
                .build(builder, GenContext::assign_target())?
                .ok_or_else(|| NodeError::malformed(NODE, "atomic destination produced no value"))?;
            let value = builder.format(&call, ty, Some(dest_ty));
            builder.add_line_flow_code(&format!("{target} = {value}"));
            return Ok(Some(target));
        }

        if ctx.is_statement() || !method.returns_value() {
            builder.add_line_flow_code(&call);
            return Ok(None);
        }
        Ok(Some(builder.add_flow_let(&call, ty)))
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

pub fn atomic_func(method: AtomicMethod, location: &NodeRef, value: Option<&NodeRef>) -> NodeRef {
    NodeRef::new(AtomicFunctionNode::new(method, location.clone(), value.cloned()))
}

pub fn atomic_load(location: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Load, location, None)
}

pub fn atomic_store(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Store, location, Some(value))
}

pub fn atomic_add(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Add, location, Some(value))
}

pub fn atomic_sub(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Sub, location, Some(value))
}

pub fn atomic_max(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Max, location, Some(value))
}

pub fn atomic_min(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Min, location, Some(value))
}

pub fn atomic_and(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::And, location, Some(value))
}

pub fn atomic_or(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Or, location, Some(value))
}

pub fn atomic_xor(location: &NodeRef, value: &NodeRef) -> NodeRef {
    atomic_func(AtomicMethod::Xor, location, Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::builder::WgslNodeBuilder;
    use crate::renderer::nodes::code_nodes::{StackNode, assign, expression, float, int, uint};
    use crate::renderer::types::ShaderStage;

    fn counter() -> NodeRef {
        expression("counter[ 0u ]", ValueType::U32)
    }

    #[test]
    fn atomic_add_without_destination_is_one_statement() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = atomic_add(&counter(), &uint(1));
        let out = node.build(&mut builder, GenContext::statement()).unwrap();
        let again = node.build(&mut builder, GenContext::statement()).unwrap();
        assert_eq!(out, None);
        assert_eq!(again, None);
        assert_eq!(builder.flow_code(), ["atomicAdd( &counter[ 0u ], 1u );"]);
    }

    #[test]
    fn atomic_operand_is_bound_to_a_let() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = atomic_load(&counter());
        let snippet = node.build_expr(&mut builder, Some(ValueType::F32)).unwrap();
        assert_eq!(snippet, "f32( nodeVar0 )");
        assert_eq!(builder.flow_code(), ["let nodeVar0: u32 = atomicLoad( &counter[ 0u ] );"]);
    }

    #[test]
    fn shared_atomic_runs_once_for_every_reader() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let ticket = atomic_add(&counter(), &uint(1));
        let body = StackNode::new();
        body.push(assign(&expression("outU[ 0u ]", ValueType::U32), &ticket));
        body.push(assign(&expression("outF[ 0u ]", ValueType::F32), &ticket));

        NodeRef::from(body)
            .build(&mut builder, GenContext::statement())
            .unwrap();

        assert_eq!(
            builder.flow_code(),
            [
                "let nodeVar0: u32 = atomicAdd( &counter[ 0u ], 1u );",
                "outU[ 0u ] = nodeVar0;",
                "outF[ 0u ] = f32( nodeVar0 );",
            ]
        );
    }

    #[test]
    fn destination_is_written_once_and_read_afterwards() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = NodeRef::new(
            AtomicFunctionNode::new(AtomicMethod::Add, counter(), Some(uint(1)))
                .store_into(expression("prev", ValueType::F32)),
        );
        assert_eq!(node.build(&mut builder, GenContext::statement()).unwrap(), None);
        assert_eq!(node.build_expr(&mut builder, None).unwrap(), "prev");
        assert_eq!(
            node.build_expr(&mut builder, Some(ValueType::U32)).unwrap(),
            "u32( prev )"
        );
        assert_eq!(builder.flow_code(), ["prev = f32( atomicAdd( &counter[ 0u ], 1u ) );"]);
    }

    #[test]
    fn discarded_result_cannot_be_read_later() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = atomic_add(&counter(), &uint(1));
        node.build(&mut builder, GenContext::statement()).unwrap();
        let err = node.build_expr(&mut builder, None).unwrap_err();
        assert!(matches!(err, NodeError::MalformedNode { node: NODE, .. }));
        assert_eq!(builder.flow_code(), ["atomicAdd( &counter[ 0u ], 1u );"]);
    }

    #[test]
    fn destination_receives_the_previous_value() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let dest = expression("previous", ValueType::U32);
        let node = NodeRef::new(
            AtomicFunctionNode::new(AtomicMethod::Max, counter(), Some(uint(9))).store_into(dest),
        );
        node.build(&mut builder, GenContext::statement()).unwrap();
        assert_eq!(builder.flow_code(), ["previous = atomicMax( &counter[ 0u ], 9u );"]);
    }

    #[test]
    fn store_cannot_have_destination() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = NodeRef::new(
            AtomicFunctionNode::new(AtomicMethod::Store, counter(), Some(uint(0)))
                .store_into(expression("x", ValueType::U32)),
        );
        let err = node.build(&mut builder, GenContext::statement()).unwrap_err();
        assert!(matches!(err, NodeError::MalformedNode { .. }));
    }

    #[test]
    fn store_is_always_a_statement() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = atomic_store(&counter(), &uint(0));
        assert!(node.build_expr(&mut builder, None).is_err());
        assert_eq!(builder.flow_code(), ["atomicStore( &counter[ 0u ], 0u );"]);
    }

    #[test]
    fn arity_is_checked() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let missing = atomic_func(AtomicMethod::Add, &counter(), None);
        assert!(matches!(
            missing.build(&mut builder, GenContext::statement()),
            Err(NodeError::MalformedNode { .. })
        ));
        let extra = atomic_func(AtomicMethod::Load, &counter(), Some(&uint(1)));
        assert!(matches!(
            extra.build(&mut builder, GenContext::statement()),
            Err(NodeError::MalformedNode { .. })
        ));
    }

    #[test]
    fn operand_types_must_agree() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let err = atomic_add(&counter(), &int(1))
            .build(&mut builder, GenContext::statement())
            .unwrap_err();
        assert_eq!(
            err,
            NodeError::TypeMismatch {
                node: NODE,
                method: "atomicAdd".to_string(),
                expected: ValueType::U32,
                found: ValueType::I32,
            }
        );

        let float_location = expression("weights[ 0u ]", ValueType::F32);
        let err = atomic_add(&float_location, &float(1.0))
            .build(&mut builder, GenContext::statement())
            .unwrap_err();
        assert!(matches!(err, NodeError::TypeMismatch { found: ValueType::F32, .. }));
    }

    #[test]
    fn method_round_trips_through_record() {
        let node = atomic_xor(&counter(), &uint(3));
        let record = node.to_record().unwrap();
        assert_eq!(record.raw("method"), Some(&serde_json::json!("atomicXor")));

        let other = AtomicFunctionNode::new(AtomicMethod::Add, counter(), Some(uint(1)));
        other.deserialize(&record).unwrap();
        assert_eq!(other.method(), AtomicMethod::Xor);
    }

    #[test]
    fn unknown_method_in_record_fails() {
        let node = AtomicFunctionNode::new(AtomicMethod::Add, counter(), Some(uint(1)));
        let mut record = NodeRecord::new(NODE, node.core().id());
        record.set("method", "atomicExchange").unwrap();
        assert_eq!(
            node.deserialize(&record).unwrap_err(),
            NodeError::UnknownOperation {
                node: NODE,
                method: "atomicExchange".to_string(),
            }
        );
    }
}
