//! WGSL node builder and module assembly.
//!
//! The builder owns everything one compile produces: per-stage flow code and
//! built-in parameters, directives, bindings, workgroup declarations and
//! varyings. Registries are idempotent by name and keep first-request order.

use std::rc::Rc;

use anyhow::{Context, Result};

use super::{NodeBuilder, NodeCache};
use crate::renderer::error::{NodeError, NodeResult};
use crate::renderer::node::{GenContext, HashKey, NodeRef};
use crate::renderer::nodes::barrier_nodes::BarrierScope;
use crate::renderer::nodes::compute_nodes::ComputeNode;
use crate::renderer::options::BuilderOptions;
use crate::renderer::types::{ComputeModule, ShaderStage, ValueType, WgslShaderBundle};
use crate::renderer::utils::sanitize_wgsl_ident;
use crate::renderer::validation::{has_enable_directives, validate_wgsl_with_context};

const BUILDER: &str = "WgslNodeBuilder";

/// Directive names of the subgroup extension; a module enables at most one.
const SUBGROUP_DIRECTIVES: &[&str] = &["subgroups", "chromium_experimental_subgroups"];

#[derive(Clone, Debug)]
struct BuiltinParam {
    builtin: &'static str,
    name: &'static str,
    ty: ValueType,
}

#[derive(Debug, Default)]
struct StageCode {
    flow: Vec<String>,
    builtins: Vec<BuiltinParam>,
    preludes: Vec<String>,
}

impl StageCode {
    fn require_builtin(&mut self, builtin: &'static str, name: &'static str, ty: ValueType) -> String {
        if !self.builtins.iter().any(|b| b.name == name) {
            self.builtins.push(BuiltinParam { builtin, name, ty });
        }
        name.to_string()
    }

    fn params(&self) -> Vec<String> {
        self.builtins
            .iter()
            .map(|b| format!("@builtin({}) {}: {}", b.builtin, b.name, b.ty.wgsl()))
            .collect()
    }

    fn body(&self, indent: &str) -> String {
        self.preludes
            .iter()
            .chain(self.flow.iter())
            .map(|line| format!("{indent}{line}\n"))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeclKind {
    WorkgroupArray,
    WorkgroupVar,
    StorageBuffer,
    Uniform,
}

impl DeclKind {
    fn is_binding(self) -> bool {
        matches!(self, DeclKind::StorageBuffer | DeclKind::Uniform)
    }

    fn label(self) -> &'static str {
        match self {
            DeclKind::WorkgroupArray => "workgroup array",
            DeclKind::WorkgroupVar => "workgroup variable",
            DeclKind::StorageBuffer => "storage buffer",
            DeclKind::Uniform => "uniform",
        }
    }
}

#[derive(Clone, Debug)]
struct Declaration {
    name: String,
    kind: DeclKind,
    /// WGSL type of the declared identifier.
    ty: String,
    code: String,
}

#[derive(Clone, Debug)]
struct Varying {
    name: String,
    ty: ValueType,
    hash: HashKey,
    node: NodeRef,
}

/// WGSL implementation of [`NodeBuilder`].
#[derive(Debug)]
pub struct WgslNodeBuilder {
    options: BuilderOptions,
    stage: ShaderStage,
    cache: NodeCache,
    vertex: StageCode,
    fragment: StageCode,
    compute: StageCode,
    directives: Vec<String>,
    bindings: Vec<Declaration>,
    workgroup: Vec<Declaration>,
    varyings: Vec<Varying>,
    temp_count: usize,
    workgroup_size: [u32; 3],
}

impl WgslNodeBuilder {
    pub fn new(stage: ShaderStage) -> Self {
        Self::with_options(stage, BuilderOptions::default())
    }

    pub fn with_options(stage: ShaderStage, options: BuilderOptions) -> Self {
        Self {
            options,
            stage,
            cache: NodeCache::default(),
            vertex: StageCode::default(),
            fragment: StageCode::default(),
            compute: StageCode::default(),
            directives: Vec::new(),
            bindings: Vec::new(),
            workgroup: Vec::new(),
            varyings: Vec::new(),
            temp_count: 0,
            workgroup_size: [64, 1, 1],
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn set_stage(&mut self, stage: ShaderStage) {
        self.stage = stage;
    }

    pub fn set_workgroup_size(&mut self, size: [u32; 3]) {
        self.workgroup_size = size;
    }

    /// Flow code of the active stage, one statement per entry.
    pub fn flow_code(&self) -> &[String] {
        &self.stage_code().flow
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    pub fn workgroup_declarations(&self) -> Vec<&str> {
        self.workgroup.iter().map(|d| d.code.as_str()).collect()
    }

    pub fn binding_declarations(&self) -> Vec<&str> {
        self.bindings.iter().map(|d| d.code.as_str()).collect()
    }

    pub fn varying_names(&self) -> Vec<&str> {
        self.varyings.iter().map(|v| v.name.as_str()).collect()
    }

    /// Built-in parameter names requested so far in the active stage.
    pub fn builtin_names(&self) -> Vec<&'static str> {
        self.stage_code().builtins.iter().map(|b| b.name).collect()
    }

    fn stage_code(&self) -> &StageCode {
        match self.stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
            ShaderStage::Compute => &self.compute,
        }
    }

    fn stage_code_mut(&mut self) -> &mut StageCode {
        match self.stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Fragment => &mut self.fragment,
            ShaderStage::Compute => &mut self.compute,
        }
    }

    fn require_compute(&self, what: &str) -> NodeResult<()> {
        if self.stage == ShaderStage::Compute {
            Ok(())
        } else {
            Err(NodeError::InvalidStage {
                node: BUILDER,
                what: what.to_string(),
                stage: self.stage,
            })
        }
    }

    fn forbid_vertex(&self, scope: &str) -> NodeResult<()> {
        if self.stage == ShaderStage::Vertex {
            Err(NodeError::StageRestriction {
                node: BUILDER,
                scope: scope.to_string(),
                stage: self.stage,
            })
        } else {
            Ok(())
        }
    }

    fn compute_instance_index(&mut self) -> String {
        let global = self
            .compute
            .require_builtin("global_invocation_id", "globalId", ValueType::UVec3);
        let num = self
            .compute
            .require_builtin("num_workgroups", "numWorkgroups", ValueType::UVec3);
        let [wx, wy, _] = self.workgroup_size;
        let prelude = format!(
            "let instanceIndex = {global}.x + {global}.y * ( {num}.x * {wx}u ) + {global}.z * ( {num}.x * {wx}u ) * ( {num}.y * {wy}u );"
        );
        if !self.compute.preludes.contains(&prelude) {
            self.compute.preludes.push(prelude);
        }
        "instanceIndex".to_string()
    }

    fn declare(
        &mut self,
        kind: DeclKind,
        name: &str,
        ty: String,
        code: impl FnOnce(&str, &str) -> String,
    ) -> NodeResult<String> {
        let ident = sanitize_wgsl_ident(name);
        let existing = self
            .bindings
            .iter()
            .chain(self.workgroup.iter())
            .find(|d| d.name == ident);
        if let Some(existing) = existing {
            if existing.kind != kind || existing.ty != ty {
                return Err(NodeError::malformed(
                    BUILDER,
                    format!(
                        "`{ident}` is already declared as {} `{}`, cannot redeclare it as {} `{ty}`",
                        existing.kind.label(),
                        existing.ty,
                        kind.label()
                    ),
                ));
            }
            return Ok(ident);
        }

        let code = code(&ident, &ty);
        log::debug!("[builder] declare {code}");
        let list = if kind.is_binding() {
            &mut self.bindings
        } else {
            &mut self.workgroup
        };
        list.push(Declaration {
            name: ident.clone(),
            kind,
            ty,
            code,
        });
        Ok(ident)
    }

    fn assemble_header(&self) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            out.push_str(&format!("enable {directive};\n"));
        }
        for group in [&self.bindings, &self.workgroup] {
            if group.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            for decl in group {
                out.push_str(&decl.code);
                out.push('\n');
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn assemble_compute(&self) -> String {
        let [x, y, z] = self.workgroup_size;
        let mut out = self.assemble_header();
        out.push_str(&format!("@compute @workgroup_size({x}, {y}, {z})\n"));
        out.push_str(&format!("fn main({}) {{\n", self.compute.params().join(", ")));
        out.push_str(&self.compute.body(&self.options.indent));
        out.push_str("}\n");
        out
    }

    fn assemble_varying_struct(&self) -> String {
        let indent = &self.options.indent;
        let mut out = String::from("struct VertexOutput {\n");
        out.push_str(&format!("{indent}@builtin(position) position: vec4f,\n"));
        for (location, varying) in self.varyings.iter().enumerate() {
            let interpolate = match varying.ty.component() {
                Some(kind) if kind.is_integer() => " @interpolate(flat)",
                _ => "",
            };
            out.push_str(&format!(
                "{indent}@location({location}){interpolate} {}: {},\n",
                varying.name,
                varying.ty.wgsl()
            ));
        }
        out.push_str("}\n\n");
        out
    }

    /// Compile the compute stage of `compute` into a standalone module.
    pub fn build_compute(mut self, compute: &Rc<ComputeNode>) -> Result<ComputeModule> {
        self.stage = ShaderStage::Compute;
        self.workgroup_size = compute.workgroup_size_3d();

        let node: NodeRef = compute.clone().into();
        node.build(&mut self, GenContext::statement())
            .context("failed to generate compute stage")?;

        let code = self.assemble_compute();
        if self.options.validate && !has_enable_directives(&code) {
            validate_wgsl_with_context(&code, "compute module")?;
        }
        let dispatch = compute
            .dispatch(self.options.max_workgroups_per_dimension)
            .context("failed to split compute dispatch")?;
        log::debug!(
            "[builder] compute module: {} lines, workgroup {:?}, dispatch {:?}",
            code.lines().count(),
            self.workgroup_size,
            dispatch.dispatch_count
        );

        Ok(ComputeModule {
            code,
            workgroup_size: self.workgroup_size,
            directives: self.directives,
            bindings: self.bindings.into_iter().map(|d| d.name).collect(),
            dispatch,
        })
    }

    /// Compile a vertex/fragment pair: `position` in the vertex stage, `color`
    /// in the fragment stage, then every varying the fragment stage requested.
    pub fn build_render(mut self, position: &NodeRef, color: &NodeRef) -> Result<WgslShaderBundle> {
        self.stage = ShaderStage::Vertex;
        let position = position
            .build_expr(&mut self, Some(ValueType::Vec4))
            .context("failed to generate vertex stage")?;

        self.stage = ShaderStage::Fragment;
        let color = color
            .build_expr(&mut self, Some(ValueType::Vec4))
            .context("failed to generate fragment stage")?;

        self.stage = ShaderStage::Vertex;
        let mut assignments = Vec::new();
        let mut i = 0;
        while i < self.varyings.len() {
            let Varying { name, ty, node, .. } = self.varyings[i].clone();
            let expr = node
                .build_expr(&mut self, Some(ty))
                .with_context(|| format!("failed to generate varying {name}"))?;
            assignments.push(format!("vertexOutput.{name} = {expr};"));
            i += 1;
        }

        let indent = self.options.indent.clone();
        let mut common = self.assemble_header();
        common.push_str(&self.assemble_varying_struct());

        let mut vertex = String::from("@vertex\n");
        vertex.push_str(&format!(
            "fn vs_main({}) -> VertexOutput {{\n",
            self.vertex.params().join(", ")
        ));
        vertex.push_str(&format!("{indent}var vertexOutput: VertexOutput;\n"));
        vertex.push_str(&self.vertex.body(&indent));
        vertex.push_str(&format!("{indent}vertexOutput.position = {position};\n"));
        for line in &assignments {
            vertex.push_str(&format!("{indent}{line}\n"));
        }
        vertex.push_str(&format!("{indent}return vertexOutput;\n}}\n"));

        let mut fragment_params = vec!["input: VertexOutput".to_string()];
        fragment_params.extend(self.fragment.params());
        let mut fragment = String::from("@fragment\n");
        fragment.push_str(&format!(
            "fn fs_main({}) -> @location(0) vec4f {{\n",
            fragment_params.join(", ")
        ));
        fragment.push_str(&self.fragment.body(&indent));
        fragment.push_str(&format!("{indent}return {color};\n}}\n"));

        let module = format!("{common}{vertex}\n{fragment}");
        if self.options.validate && !has_enable_directives(&module) {
            validate_wgsl_with_context(&module, "render module")?;
        }

        Ok(WgslShaderBundle {
            vertex: format!("{common}{vertex}"),
            fragment: format!("{common}{fragment}"),
            common,
            module,
        })
    }
}

impl NodeBuilder for WgslNodeBuilder {
    fn shader_stage(&self) -> ShaderStage {
        self.stage
    }

    fn add_line_flow_code(&mut self, code: &str) {
        let code = code.trim();
        if code.is_empty() {
            return;
        }
        let line = if code.ends_with(';') || code.ends_with('{') || code.ends_with('}') {
            code.to_string()
        } else {
            format!("{code};")
        };
        self.stage_code_mut().flow.push(line);
    }

    fn add_flow_let(&mut self, snippet: &str, ty: ValueType) -> String {
        let name = format!("nodeVar{}", self.temp_count);
        self.temp_count += 1;
        self.add_line_flow_code(&format!("let {name}: {} = {snippet};", ty.wgsl()));
        name
    }

    fn get_vertex_index(&mut self) -> NodeResult<String> {
        match self.stage {
            ShaderStage::Vertex => Ok(self
                .vertex
                .require_builtin("vertex_index", "vertexIndex", ValueType::U32)),
            stage => Err(NodeError::InvalidStage {
                node: BUILDER,
                what: "vertex_index".to_string(),
                stage,
            }),
        }
    }

    fn get_instance_index(&mut self) -> NodeResult<String> {
        match self.stage {
            ShaderStage::Vertex => Ok(self
                .vertex
                .require_builtin("instance_index", "instanceIndex", ValueType::U32)),
            ShaderStage::Compute => Ok(self.compute_instance_index()),
            stage => Err(NodeError::InvalidStage {
                node: BUILDER,
                what: "instance_index".to_string(),
                stage,
            }),
        }
    }

    fn get_draw_index(&mut self) -> NodeResult<String> {
        self.get_uniform("drawIndex", ValueType::U32)
    }

    fn get_subgroup_index(&mut self) -> NodeResult<String> {
        self.forbid_vertex("subgroup")?;
        self.enable_subgroups();
        Ok(self
            .stage_code_mut()
            .require_builtin("subgroup_invocation_id", "subgroupIndex", ValueType::U32))
    }

    fn get_subgroup_size(&mut self) -> NodeResult<String> {
        self.forbid_vertex("subgroupSize")?;
        self.enable_subgroups();
        Ok(self
            .stage_code_mut()
            .require_builtin("subgroup_size", "subgroupSize", ValueType::U32))
    }

    fn get_workgroup_id(&mut self) -> NodeResult<String> {
        self.require_compute("workgroup_id")?;
        Ok(self
            .compute
            .require_builtin("workgroup_id", "workgroupId", ValueType::UVec3))
    }

    fn get_local_id(&mut self) -> NodeResult<String> {
        self.require_compute("local_invocation_id")?;
        Ok(self
            .compute
            .require_builtin("local_invocation_id", "localId", ValueType::UVec3))
    }

    fn get_num_workgroups(&mut self) -> NodeResult<String> {
        self.require_compute("num_workgroups")?;
        Ok(self
            .compute
            .require_builtin("num_workgroups", "numWorkgroups", ValueType::UVec3))
    }

    fn get_global_id(&mut self) -> NodeResult<String> {
        self.require_compute("global_invocation_id")?;
        Ok(self
            .compute
            .require_builtin("global_invocation_id", "globalId", ValueType::UVec3))
    }

    fn enable_subgroups(&mut self) {
        let enabled = self
            .directives
            .iter()
            .any(|d| SUBGROUP_DIRECTIVES.contains(&d.as_str()));
        if !enabled {
            let directive = self.options.subgroup_directive.clone();
            self.get_directive(&directive);
        }
    }

    fn get_directive(&mut self, name: &str) {
        if self.directives.iter().any(|d| d == name) {
            return;
        }
        if SUBGROUP_DIRECTIVES.contains(&name) {
            let enabled = self
                .directives
                .iter()
                .find(|d| SUBGROUP_DIRECTIVES.contains(&d.as_str()));
            if let Some(enabled) = enabled {
                log::warn!("[builder] subgroups already enabled as {enabled}, ignoring {name}");
                return;
            }
        }
        log::debug!("[builder] enable directive {name}");
        self.directives.push(name.to_string());
    }

    fn get_varying_from_node(&mut self, node: &NodeRef, ty: ValueType) -> NodeResult<String> {
        if self.stage != ShaderStage::Fragment {
            return Err(NodeError::InvalidStage {
                node: node.type_name(),
                what: "varying read".to_string(),
                stage: self.stage,
            });
        }

        let hash = node.hash_key();
        if let Some(varying) = self.varyings.iter().find(|v| v.hash == hash) {
            return Ok(format!("input.{}", varying.name));
        }

        let name = format!("nodeVarying{}", self.varyings.len());
        log::debug!("[builder] allocate varying {name}: {ty} for {hash}");
        self.varyings.push(Varying {
            name: name.clone(),
            ty,
            hash,
            node: node.clone(),
        });
        Ok(format!("input.{name}"))
    }

    fn get_workgroup_array(&mut self, name: &str, ty: ValueType, size: u32) -> NodeResult<String> {
        let decl_ty = format!("array<{}, {size}>", ty.wgsl());
        self.declare(DeclKind::WorkgroupArray, name, decl_ty, |ident, ty| {
            format!("var<workgroup> {ident}: {ty};")
        })
    }

    fn get_workgroup_var(&mut self, name: &str, ty: ValueType) -> NodeResult<String> {
        self.declare(DeclKind::WorkgroupVar, name, ty.wgsl().to_string(), |ident, ty| {
            format!("var<workgroup> {ident}: {ty};")
        })
    }

    fn get_storage_buffer(&mut self, name: &str, ty: ValueType, atomic: bool) -> NodeResult<String> {
        let decl_ty = if atomic {
            format!("array<atomic<{}>>", ty.wgsl())
        } else {
            format!("array<{}>", ty.wgsl())
        };
        let group = self.options.storage_group;
        let binding = self.bindings.len();
        self.declare(DeclKind::StorageBuffer, name, decl_ty, |ident, ty| {
            format!("@group({group}) @binding({binding}) var<storage, read_write> {ident}: {ty};")
        })
    }

    fn get_uniform(&mut self, name: &str, ty: ValueType) -> NodeResult<String> {
        let group = self.options.storage_group;
        let binding = self.bindings.len();
        self.declare(DeclKind::Uniform, name, ty.wgsl().to_string(), |ident, ty| {
            format!("@group({group}) @binding({binding}) var<uniform> {ident}: {ty};")
        })
    }

    fn generate_control_barrier(&mut self, scope: BarrierScope) -> String {
        if scope == BarrierScope::Subgroup {
            self.enable_subgroups();
        }
        format!("{scope}Barrier()")
    }

    fn cache(&mut self) -> &mut NodeCache {
        &mut self.cache
    }
}
