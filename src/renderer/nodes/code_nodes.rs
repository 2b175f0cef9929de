//! Support nodes used to compose shader bodies: literals, raw expressions,
//! statement stacks and assignments.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, NodeCore, NodeRecord, NodeRef, ShaderNode};
use crate::renderer::types::ValueType;
use crate::renderer::utils::fmt_f32;

/// Literal value carried by a [`ConstNode`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ConstValue {
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f32),
}

impl ConstValue {
    pub fn value_type(self) -> ValueType {
        match self {
            ConstValue::Bool(_) => ValueType::Bool,
            ConstValue::Int(_) => ValueType::I32,
            ConstValue::Uint(_) => ValueType::U32,
            ConstValue::Float(_) => ValueType::F32,
        }
    }

    pub fn wgsl(self) -> String {
        match self {
            ConstValue::Bool(v) => v.to_string(),
            ConstValue::Int(v) => format!("{v}i"),
            ConstValue::Uint(v) => format!("{v}u"),
            ConstValue::Float(v) => fmt_f32(v),
        }
    }
}

#[derive(Debug)]
pub struct ConstNode {
    core: NodeCore,
    value: ConstValue,
}

impl ConstNode {
    pub fn new(value: ConstValue) -> Self {
        Self {
            core: NodeCore::new(Some(value.value_type())),
            value,
        }
    }

    pub fn value(&self) -> ConstValue {
        self.value
    }
}

impl ShaderNode for ConstNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "ConstNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let ty = self.value.value_type();
        Ok(Some(builder.format(&self.value.wgsl(), ty, ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("value", self.value)?;
        Ok(())
    }
}

pub fn uint(v: u32) -> NodeRef {
    NodeRef::new(ConstNode::new(ConstValue::Uint(v)))
}

pub fn int(v: i32) -> NodeRef {
    NodeRef::new(ConstNode::new(ConstValue::Int(v)))
}

pub fn float(v: f32) -> NodeRef {
    NodeRef::new(ConstNode::new(ConstValue::Float(v)))
}

pub fn bool_const(v: bool) -> NodeRef {
    NodeRef::new(ConstNode::new(ConstValue::Bool(v)))
}

/// Raw WGSL snippet with a declared type. A `void` expression is a statement
/// and is appended to the flow code when generated.
#[derive(Debug)]
pub struct ExpressionNode {
    core: NodeCore,
    snippet: String,
}

impl ExpressionNode {
    pub fn new(snippet: impl Into<String>, ty: ValueType) -> Self {
        Self {
            core: NodeCore::new(Some(ty)),
            snippet: snippet.into(),
        }
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }
}

impl ShaderNode for ExpressionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "ExpressionNode"
    }

    /// `void` snippets are statements.
    fn has_side_effects(&self) -> bool {
        self.core.node_type() == Some(ValueType::Void)
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let ty = self.node_type(&*builder)?;
        if ty == ValueType::Void {
            builder.add_line_flow_code(&self.snippet);
            return Ok(None);
        }
        Ok(Some(builder.format(&self.snippet, ty, ctx.output)))
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("snippet", &self.snippet)?;
        Ok(())
    }
}

pub fn expression(snippet: impl Into<String>, ty: ValueType) -> NodeRef {
    NodeRef::new(ExpressionNode::new(snippet, ty))
}

/// Ordered statement list. Children are generated in statement form, in
/// insertion order, and never reordered.
#[derive(Debug)]
pub struct StackNode {
    core: NodeCore,
    nodes: RefCell<Vec<NodeRef>>,
}

impl StackNode {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            core: NodeCore::new(Some(ValueType::Void)),
            nodes: RefCell::new(Vec::new()),
        })
    }

    pub fn push(&self, node: NodeRef) {
        self.nodes.borrow_mut().push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }
}

impl ShaderNode for StackNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "StackNode"
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        _ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let nodes = self.nodes.borrow().clone();
        for node in nodes {
            if let Some(snippet) = node.build(builder, GenContext::statement())? {
                builder.add_line_flow_code(&snippet);
            }
        }
        Ok(None)
    }
}

/// `target = value`, with `target` generated as an assignment target.
#[derive(Debug)]
pub struct AssignNode {
    core: NodeCore,
    target: NodeRef,
    value: NodeRef,
}

impl AssignNode {
    pub fn new(target: NodeRef, value: NodeRef) -> Self {
        Self {
            core: NodeCore::new(None),
            target,
            value,
        }
    }
}

impl ShaderNode for AssignNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "AssignNode"
    }

    fn has_side_effects(&self) -> bool {
        true
    }

    fn node_type(&self, builder: &dyn NodeBuilder) -> NodeResult<ValueType> {
        self.target.node_type(builder)
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        let ty = self.target.node_type(&*builder)?;
        let target = self
            .target
            .build(builder, GenContext::assign_target())?
            .ok_or_else(|| NodeError::malformed("AssignNode", "assignment target produced no value"))?;
        let value = self.value.build_expr(builder, Some(ty))?;

        builder.add_line_flow_code(&format!("{target} = {value}"));

        if ctx.is_statement() {
            return Ok(None);
        }
        Ok(Some(builder.format(&target, ty, ctx.output)))
    }
}

pub fn assign(target: &NodeRef, value: &NodeRef) -> NodeRef {
    NodeRef::new(AssignNode::new(target.clone(), value.clone()))
}

/// Shared generation for `array[index]` element accessors.
///
/// In an assignment context the bare reference is returned; otherwise it is
/// formatted to the requested output type.
pub(crate) fn generate_array_element(
    builder: &mut dyn NodeBuilder,
    ctx: GenContext,
    array: &NodeRef,
    index: &NodeRef,
) -> NodeResult<Option<String>> {
    let ty = array.node_type(&*builder)?;
    let array = array.build_expr(builder, None)?;
    let index = index.build_expr(builder, Some(ValueType::U32))?;
    let snippet = format!("{array}[ {index} ]");

    if ctx.assign {
        return Ok(Some(snippet));
    }
    Ok(Some(builder.format(&snippet, ty, ctx.output)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::builder::WgslNodeBuilder;
    use crate::renderer::types::ShaderStage;

    #[test]
    fn literals_format_by_kind() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        assert_eq!(uint(3).build_expr(&mut builder, None).unwrap(), "3u");
        assert_eq!(int(-2).build_expr(&mut builder, None).unwrap(), "-2i");
        assert_eq!(float(1.0).build_expr(&mut builder, None).unwrap(), "1.0");
        assert_eq!(
            float(2.0).build_expr(&mut builder, Some(ValueType::I32)).unwrap(),
            "i32( 2.0 )"
        );
    }

    #[test]
    fn void_expression_is_appended() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let node = expression("storageBarrier()", ValueType::Void);
        assert_eq!(node.build(&mut builder, GenContext::statement()).unwrap(), None);
        assert_eq!(builder.flow_code(), ["storageBarrier();"]);
    }

    #[test]
    fn stack_preserves_emission_order() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let stack = StackNode::new();
        stack.push(expression("a()", ValueType::Void));
        stack.push(expression("b()", ValueType::Void));
        stack.push(expression("c()", ValueType::Void));
        NodeRef::from(stack)
            .build(&mut builder, GenContext::statement())
            .unwrap();
        assert_eq!(builder.flow_code(), ["a();", "b();", "c();"]);
    }

    #[test]
    fn assign_converts_value_to_target_type() {
        let mut builder = WgslNodeBuilder::new(ShaderStage::Compute);
        let target = expression("total", ValueType::U32);
        let node = assign(&target, &float(2.0));
        node.build(&mut builder, GenContext::statement()).unwrap();
        assert_eq!(builder.flow_code(), ["total = u32( 2.0 );"]);
    }

    #[test]
    fn const_record_carries_value() {
        let record = uint(7).to_record().unwrap();
        assert_eq!(
            record.raw("value"),
            Some(&serde_json::json!({ "kind": "uint", "value": 7 }))
        );
    }
}
