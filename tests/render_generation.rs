use node_forge_gpgpu::renderer::nodes::builtin_nodes::workgroup_id;
use node_forge_gpgpu::renderer::nodes::code_nodes::expression;
use node_forge_gpgpu::renderer::nodes::index_nodes::{instance_index, subgroup_index, vertex_index};
use node_forge_gpgpu::{BuilderOptions, NodeError, ShaderStage, ValueType, WgslNodeBuilder, validate_wgsl};

#[test]
fn fragment_reads_instance_index_through_varying() {
    let options = BuilderOptions {
        validate: true,
        ..BuilderOptions::default()
    };
    let bundle = WgslNodeBuilder::with_options(ShaderStage::Vertex, options)
        .build_render(&vertex_index(), &instance_index())
        .unwrap();

    assert!(bundle.common.contains("@location(0) @interpolate(flat) nodeVarying0: u32,"));
    assert!(bundle.vertex.contains(
        "fn vs_main(@builtin(vertex_index) vertexIndex: u32, @builtin(instance_index) instanceIndex: u32) -> VertexOutput {"
    ));
    assert!(bundle.vertex.contains("vertexOutput.position = vec4f( f32( vertexIndex ) );"));
    assert!(bundle.vertex.contains("vertexOutput.nodeVarying0 = instanceIndex;"));
    assert!(bundle.fragment.contains("fn fs_main(input: VertexOutput) -> @location(0) vec4f {"));
    assert!(bundle.fragment.contains("return vec4f( f32( input.nodeVarying0 ) );"));

    validate_wgsl(&bundle.module).unwrap();
    validate_wgsl(&bundle.vertex).unwrap();
    validate_wgsl(&bundle.fragment).unwrap();
}

#[test]
fn shared_index_node_allocates_one_varying() {
    let index = instance_index();
    let color = expression("vec4f( 1.0 )", ValueType::Vec4);
    let bundle = WgslNodeBuilder::new(ShaderStage::Vertex)
        .build_render(&index, &color)
        .unwrap();
    assert!(!bundle.common.contains("nodeVarying"));

    let tinted = WgslNodeBuilder::new(ShaderStage::Vertex)
        .build_render(&vertex_index(), &index)
        .unwrap();
    assert_eq!(tinted.common.matches("nodeVarying").count(), 1);
}

#[test]
fn subgroup_index_in_vertex_fails_the_bundle() {
    let err = WgslNodeBuilder::new(ShaderStage::Vertex)
        .build_render(&subgroup_index(), &expression("vec4f( 1.0 )", ValueType::Vec4))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NodeError>(),
        Some(NodeError::StageRestriction { stage: ShaderStage::Vertex, .. })
    ));
}

#[test]
fn compute_builtin_in_fragment_fails_the_bundle() {
    let err = WgslNodeBuilder::new(ShaderStage::Vertex)
        .build_render(&vertex_index(), &workgroup_id())
        .unwrap_err();
    assert!(format!("{err:#}").contains("fragment"));
    assert!(matches!(
        err.downcast_ref::<NodeError>(),
        Some(NodeError::InvalidStage { stage: ShaderStage::Fragment, .. })
    ));
}
