//! Shader node IR and WGSL code generator with compute/GPGPU specialisation.

pub mod renderer;

pub use renderer::*;
