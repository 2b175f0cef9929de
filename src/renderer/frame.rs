//! Per-frame driver for node side effects around submission.

use std::collections::HashMap;

use anyhow::{Context, Result};

use super::node::{NodeId, NodeRef, NodeUpdateType};
use super::nodes::compute_nodes::ComputeDispatch;

/// Renderer collaborator that executes compute dispatches.
pub trait ComputeRenderer {
    fn compute(&mut self, dispatch: &ComputeDispatch) -> Result<()>;

    fn max_workgroups_per_dimension(&self) -> u32 {
        65_535
    }
}

#[derive(Debug, Default)]
struct UpdateMap {
    frame: HashMap<NodeId, u64>,
    render: HashMap<NodeId, u64>,
}

impl UpdateMap {
    fn due(&mut self, id: NodeId, update: NodeUpdateType, frame_id: u64, render_id: u64) -> bool {
        match update {
            NodeUpdateType::None => false,
            NodeUpdateType::Frame => Self::mark(&mut self.frame, id, frame_id),
            NodeUpdateType::Render => Self::mark(&mut self.render, id, render_id),
            NodeUpdateType::Object => true,
        }
    }

    fn mark(map: &mut HashMap<NodeId, u64>, id: NodeId, current: u64) -> bool {
        if map.get(&id) == Some(&current) {
            return false;
        }
        map.insert(id, current);
        true
    }

    fn remove(&mut self, id: NodeId) {
        self.frame.remove(&id);
        self.render.remove(&id);
    }
}

/// Tracks frame and render ids so `Frame`/`Render` updates run once per id.
#[derive(Debug, Default)]
pub struct NodeFrame {
    frame_id: u64,
    render_id: u64,
    before: UpdateMap,
    after: UpdateMap,
}

impl NodeFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn render_id(&self) -> u64 {
        self.render_id
    }

    pub fn next_frame(&mut self) {
        self.frame_id += 1;
    }

    pub fn next_render(&mut self) {
        self.render_id += 1;
    }

    /// Runs `update_before` on `node` if its update type is due.
    /// Returns whether it ran.
    pub fn update_before_node(
        &mut self,
        node: &NodeRef,
        renderer: &mut dyn ComputeRenderer,
    ) -> Result<bool> {
        let core = node.core();
        let id = core.id();
        if !self
            .before
            .due(id, core.update_before_type(), self.frame_id, self.render_id)
        {
            return Ok(false);
        }

        log::trace!("[frame] update_before {} {id}", node.type_name());
        node.update_before(renderer)
            .with_context(|| format!("update_before failed for {} {id}", node.type_name()))?;
        Ok(true)
    }

    pub fn update_after_node(
        &mut self,
        node: &NodeRef,
        renderer: &mut dyn ComputeRenderer,
    ) -> Result<bool> {
        let core = node.core();
        let id = core.id();
        if !self
            .after
            .due(id, core.update_after_type(), self.frame_id, self.render_id)
        {
            return Ok(false);
        }

        log::trace!("[frame] update_after {} {id}", node.type_name());
        node.update_after(renderer)
            .with_context(|| format!("update_after failed for {} {id}", node.type_name()))?;
        Ok(true)
    }

    /// Forgets a disposed node.
    pub fn release(&mut self, id: NodeId) {
        self.before.remove(id);
        self.after.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::builder::NodeBuilder;
    use crate::renderer::error::NodeResult;
    use crate::renderer::node::{GenContext, NodeCore, ShaderNode};
    use crate::renderer::nodes::code_nodes::StackNode;
    use crate::renderer::nodes::compute_nodes::compute;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingRenderer {
        dispatches: Vec<ComputeDispatch>,
        max: Option<u32>,
    }

    impl ComputeRenderer for RecordingRenderer {
        fn compute(&mut self, dispatch: &ComputeDispatch) -> Result<()> {
            self.dispatches.push(*dispatch);
            Ok(())
        }

        fn max_workgroups_per_dimension(&self) -> u32 {
            self.max.unwrap_or(65_535)
        }
    }

    #[derive(Debug)]
    struct Ticker {
        core: NodeCore,
        ticks: Cell<u32>,
    }

    impl ShaderNode for Ticker {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        fn type_name(&self) -> &'static str {
            "Ticker"
        }

        fn generate(&self, _: &mut dyn NodeBuilder, _: GenContext) -> NodeResult<Option<String>> {
            Ok(None)
        }

        fn update_before(&self, _: &mut dyn ComputeRenderer) -> Result<()> {
            self.ticks.set(self.ticks.get() + 1);
            Ok(())
        }

        fn update_after(&self, _: &mut dyn ComputeRenderer) -> Result<()> {
            self.ticks.set(self.ticks.get() + 100);
            Ok(())
        }
    }

    fn ticker(update: NodeUpdateType) -> Rc<Ticker> {
        Rc::new(Ticker {
            core: NodeCore::new(None).with_update_before(update),
            ticks: Cell::new(0),
        })
    }

    #[test]
    fn compute_node_dispatches_on_every_object() {
        let node = compute(&StackNode::new().into(), 100, &[64]).unwrap();
        let node_ref: NodeRef = node.into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer::default();

        assert!(frame.update_before_node(&node_ref, &mut renderer).unwrap());
        assert!(frame.update_before_node(&node_ref, &mut renderer).unwrap());

        assert_eq!(renderer.dispatches.len(), 2);
        assert_eq!(
            renderer.dispatches[0],
            ComputeDispatch {
                dispatch_count: [2, 1, 1],
                workgroup_size: [64, 1, 1],
            }
        );
    }

    #[test]
    fn frame_updates_run_once_per_frame() {
        let node = ticker(NodeUpdateType::Frame);
        let node_ref: NodeRef = node.clone().into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer::default();

        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        frame.next_render();
        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        assert_eq!(node.ticks.get(), 1);

        frame.next_frame();
        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        assert_eq!(node.ticks.get(), 2);
    }

    #[test]
    fn render_updates_run_once_per_render() {
        let node = ticker(NodeUpdateType::Render);
        let node_ref: NodeRef = node.clone().into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer::default();

        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        frame.next_render();
        frame.update_before_node(&node_ref, &mut renderer).unwrap();
        assert_eq!(node.ticks.get(), 2);
    }

    #[test]
    fn nodes_without_update_are_skipped() {
        let node = ticker(NodeUpdateType::None);
        let node_ref: NodeRef = node.clone().into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer::default();
        assert!(!frame.update_before_node(&node_ref, &mut renderer).unwrap());
        assert_eq!(node.ticks.get(), 0);
    }

    #[test]
    fn oversized_dispatch_surfaces_as_error() {
        let node = compute(&StackNode::new().into(), 1_000, &[1]).unwrap();
        let node_ref: NodeRef = node.into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer {
            max: Some(4),
            ..Default::default()
        };
        let err = frame.update_before_node(&node_ref, &mut renderer).unwrap_err();
        assert!(format!("{err:#}").contains("ComputeNode"));
        assert!(renderer.dispatches.is_empty());
    }

    #[test]
    fn after_updates_have_their_own_schedule() {
        let node = Rc::new(Ticker {
            core: NodeCore::new(None)
                .with_update_before(NodeUpdateType::Frame)
                .with_update_after(NodeUpdateType::Frame),
            ticks: Cell::new(0),
        });
        let node_ref: NodeRef = node.clone().into();
        let mut frame = NodeFrame::new();
        let mut renderer = RecordingRenderer::default();

        assert!(frame.update_before_node(&node_ref, &mut renderer).unwrap());
        assert!(frame.update_after_node(&node_ref, &mut renderer).unwrap());
        assert!(!frame.update_after_node(&node_ref, &mut renderer).unwrap());
        assert_eq!(node.ticks.get(), 101);

        frame.release(node.core().id());
        assert!(frame.update_after_node(&node_ref, &mut renderer).unwrap());
        assert_eq!(node.ticks.get(), 201);
    }
}
