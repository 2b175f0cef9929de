//! Compute dispatch wrapper and launch-grid arithmetic.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::renderer::builder::NodeBuilder;
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::frame::ComputeRenderer;
use crate::renderer::node::{
    GenContext, NodeCore, NodeRecord, NodeRef, NodeUpdateType, ShaderNode,
};
use crate::renderer::types::{ShaderStage, ValueType};

const NODE: &str = "ComputeNode";

/// Feature name -> WGSL `enable` directive.
const FEATURE_DIRECTIVES: &[(&str, &str)] = &[
    ("chromium-experimental-subgroups", "chromium_experimental_subgroups"),
    ("subgroups", "subgroups"),
    ("shader-f16", "f16"),
];

fn feature_directive(feature: &str) -> Option<&'static str> {
    FEATURE_DIRECTIVES
        .iter()
        .find(|(name, _)| *name == feature)
        .map(|(_, directive)| *directive)
}

fn is_subgroup_feature(feature: &str) -> bool {
    feature.contains("subgroups")
}

/// Indirect dispatch arguments as laid out in a GPU buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DispatchIndirectArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// One compute launch handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDispatch {
    pub dispatch_count: [u32; 3],
    pub workgroup_size: [u32; 3],
}

impl ComputeDispatch {
    /// Spreads `total` workgroups over x, y, z so no dimension exceeds
    /// `max_per_dimension`. The grid may overshoot `total`; the shader
    /// bounds-checks with its own index.
    pub fn split(total: u32, workgroup_size: [u32; 3], max_per_dimension: u32) -> NodeResult<Self> {
        let max = max_per_dimension.max(1);
        if total == 0 {
            return Ok(Self {
                dispatch_count: [0, 1, 1],
                workgroup_size,
            });
        }

        let x = total.min(max);
        let rest = total.div_ceil(x);
        let y = rest.min(max);
        let z = rest.div_ceil(y);
        if z > max {
            return Err(NodeError::malformed(
                NODE,
                format!("{total} workgroups exceed {max} per dimension on all three axes"),
            ));
        }

        Ok(Self {
            dispatch_count: [x, y, z],
            workgroup_size,
        })
    }

    pub fn total_workgroups(&self) -> u64 {
        self.dispatch_count.iter().map(|&d| u64::from(d)).product()
    }

    pub fn indirect_args(&self) -> DispatchIndirectArgs {
        let [x, y, z] = self.dispatch_count;
        DispatchIndirectArgs { x, y, z }
    }
}

fn check_workgroup_size(size: &[u32]) -> NodeResult<()> {
    if size.is_empty() || size.len() > 3 {
        return Err(NodeError::malformed(
            NODE,
            format!("workgroup size needs 1 to 3 dimensions, got {}", size.len()),
        ));
    }
    if size.contains(&0) {
        return Err(NodeError::malformed(NODE, "workgroup size dimensions must be non-zero"));
    }
    if invocations_per_workgroup(size).is_none() {
        return Err(NodeError::malformed(
            NODE,
            format!("workgroup size {size:?} overflows the invocation count"),
        ));
    }
    Ok(())
}

fn invocations_per_workgroup(size: &[u32]) -> Option<u32> {
    size.iter().try_fold(1u32, |acc, &dim| acc.checked_mul(dim))
}

/// Body of one compute invocation plus its launch configuration.
///
/// Before each submission that uses it, the node asks the renderer for one
/// dispatch covering `count` invocations.
#[derive(Debug)]
pub struct ComputeNode {
    core: NodeCore,
    compute_node: NodeRef,
    count: Cell<u32>,
    workgroup_size: RefCell<Vec<u32>>,
    dispatch_count: Cell<u32>,
    features: RefCell<Vec<String>>,
}

impl ComputeNode {
    pub fn new(compute_node: NodeRef, count: u32, workgroup_size: &[u32]) -> NodeResult<Rc<Self>> {
        check_workgroup_size(workgroup_size)?;
        let node = Self {
            core: NodeCore::new(Some(ValueType::Void))
                .with_version(1)
                .with_update_before(NodeUpdateType::Object),
            compute_node,
            count: Cell::new(count),
            workgroup_size: RefCell::new(workgroup_size.to_vec()),
            dispatch_count: Cell::new(0),
            features: RefCell::new(Vec::new()),
        };
        node.update_dispatch_count();
        Ok(Rc::new(node))
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn set_count(&self, count: u32) {
        self.count.set(count);
        self.update_dispatch_count();
    }

    pub fn workgroup_size(&self) -> Vec<u32> {
        self.workgroup_size.borrow().clone()
    }

    /// Workgroup size padded with 1s to three dimensions.
    pub fn workgroup_size_3d(&self) -> [u32; 3] {
        let mut out = [1; 3];
        for (slot, &dim) in out.iter_mut().zip(self.workgroup_size.borrow().iter()) {
            *slot = dim;
        }
        out
    }

    /// Changes the shader, so the node version is bumped.
    pub fn set_workgroup_size(&self, workgroup_size: &[u32]) -> NodeResult<()> {
        check_workgroup_size(workgroup_size)?;
        *self.workgroup_size.borrow_mut() = workgroup_size.to_vec();
        self.update_dispatch_count();
        self.core.set_needs_update(true);
        Ok(())
    }

    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count.get()
    }

    fn update_dispatch_count(&self) {
        let size = invocations_per_workgroup(&self.workgroup_size.borrow()).unwrap_or(u32::MAX);
        self.dispatch_count.set(self.count.get().div_ceil(size.max(1)));
    }

    /// Requests a device feature. Duplicates are kept; directives are emitted once.
    pub fn enable_feature(&self, name: impl Into<String>) {
        self.features.borrow_mut().push(name.into());
    }

    pub fn features(&self) -> Vec<String> {
        self.features.borrow().clone()
    }

    pub fn dispatch(&self, max_per_dimension: u32) -> NodeResult<ComputeDispatch> {
        ComputeDispatch::split(self.dispatch_count.get(), self.workgroup_size_3d(), max_per_dimension)
    }

    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl ShaderNode for ComputeNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        NODE
    }

    fn generate(
        &self,
        builder: &mut dyn NodeBuilder,
        _ctx: GenContext,
    ) -> NodeResult<Option<String>> {
        if builder.shader_stage() != ShaderStage::Compute {
            return Ok(None);
        }

        let features = self.features.borrow().clone();
        let mut seen: Vec<&str> = Vec::new();
        for feature in &features {
            if seen.contains(&feature.as_str()) {
                log::warn!("[compute] feature {feature} requested more than once");
                continue;
            }
            seen.push(feature);

            let directive = feature_directive(feature).ok_or_else(|| NodeError::UnknownOperation {
                node: NODE,
                method: feature.clone(),
            })?;
            // The feature's own directive goes first so the subgroup built-ins
            // do not enable the default one.
            builder.get_directive(directive);
            if is_subgroup_feature(feature) {
                builder.get_subgroup_size()?;
                builder.get_subgroup_index()?;
            }
        }

        if let Some(snippet) = self.compute_node.build(builder, GenContext::statement())? {
            builder.add_line_flow_code(&snippet);
        }
        Ok(None)
    }

    fn update_before(&self, renderer: &mut dyn ComputeRenderer) -> anyhow::Result<()> {
        let dispatch = self.dispatch(renderer.max_workgroups_per_dimension())?;
        log::debug!(
            "[compute] dispatch {:?} x workgroup {:?}",
            dispatch.dispatch_count,
            dispatch.workgroup_size
        );
        renderer.compute(&dispatch)
    }

    fn serialize(&self, data: &mut NodeRecord) -> NodeResult<()> {
        data.set("count", self.count.get())?;
        data.set("workgroupSize", &*self.workgroup_size.borrow())?;
        data.set("features", &*self.features.borrow())?;
        Ok(())
    }

    fn deserialize(&self, data: &NodeRecord) -> NodeResult<()> {
        let field = |key: &str, e: serde_json::Error| NodeError::malformed(NODE, format!("bad {key}: {e}"));

        if let Some(count) = data.get::<u32>("count") {
            self.set_count(count.map_err(|e| field("count", e))?);
        }
        if let Some(size) = data.get::<Vec<u32>>("workgroupSize") {
            self.set_workgroup_size(&size.map_err(|e| field("workgroupSize", e))?)?;
        }
        if let Some(features) = data.get::<Vec<String>>("features") {
            *self.features.borrow_mut() = features.map_err(|e| field("features", e))?;
        }
        Ok(())
    }
}

/// Wraps `body` as a compute node over `count` invocations.
pub fn compute(body: &NodeRef, count: u32, workgroup_size: &[u32]) -> NodeResult<Rc<ComputeNode>> {
    ComputeNode::new(body.clone(), count, workgroup_size)
}
