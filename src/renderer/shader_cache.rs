use std::collections::BTreeMap;

use crate::errors::{BatchError, Result};
use crate::renderer::backend::{
    BufferHandle, GpuBackend, PipelineDescriptor, PipelineHandle, VertexArrayHandle,
};
use crate::renderer::shaders::{ShaderType, VertexAttribute};

/// Per-pipeline programs and attribute wiring, shared by every batcher.
///
/// Implementations must outlive the batchers built on top of them; batchers
/// only hold a shared reference.
pub trait PipelineResourceProvider {
    type Backend: GpuBackend;

    fn backend(&self) -> &Self::Backend;

    /// Wires `buffer` as the source of `attribute` for `shader` inside `vertex_array`.
    fn bind_attribute(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        shader: ShaderType,
        attribute: VertexAttribute,
    ) -> Result<()>;

    /// Makes `shader`'s program current for subsequent draws.
    fn activate(&self, shader: ShaderType) -> Result<()>;

    fn deactivate(&self);
}

/// Compiles every requested shader up front and hands out their programs.
pub struct ShaderCache<B: GpuBackend> {
    backend: B,
    programs: BTreeMap<ShaderType, PipelineHandle>,
}

impl<B: GpuBackend> ShaderCache<B> {
    pub fn new(backend: B, shaders: &[ShaderType]) -> Result<Self> {
        let mut programs = BTreeMap::new();
        for &shader in shaders {
            if programs.contains_key(&shader) {
                continue;
            }
            let pipeline = backend.create_pipeline(&PipelineDescriptor::for_shader(shader))?;
            log::info!("Compiled shader {} ({:?})", shader, pipeline);
            programs.insert(shader, pipeline);
        }

        Ok(Self { backend, programs })
    }

    /// Compiles every shader this crate knows about.
    pub fn with_all_shaders(backend: B) -> Result<Self> {
        Self::new(backend, &ShaderType::ALL)
    }

    pub fn is_compiled(&self, shader: ShaderType) -> bool {
        self.programs.contains_key(&shader)
    }

    pub fn compiled_shaders(&self) -> impl Iterator<Item = ShaderType> + '_ {
        self.programs.keys().copied()
    }

    pub fn program(&self, shader: ShaderType) -> Result<PipelineHandle> {
        self.programs
            .get(&shader)
            .copied()
            .ok_or(BatchError::ShaderNotCompiled(shader))
    }
}

impl<B: GpuBackend> PipelineResourceProvider for ShaderCache<B> {
    type Backend = B;

    fn backend(&self) -> &B {
        &self.backend
    }

    fn bind_attribute(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        shader: ShaderType,
        attribute: VertexAttribute,
    ) -> Result<()> {
        if !self.is_compiled(shader) {
            return Err(BatchError::ShaderNotCompiled(shader));
        }
        if !shader.uses_attribute(attribute) {
            return Err(BatchError::AttributeNotUsed { shader, attribute });
        }
        self.backend
            .attach_vertex_buffer(vertex_array, buffer, attribute.location())?;
        Ok(())
    }

    fn activate(&self, shader: ShaderType) -> Result<()> {
        let program = self.program(shader)?;
        self.backend.use_pipeline(Some(program));
        Ok(())
    }

    fn deactivate(&self) {
        self.backend.use_pipeline(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::BufferKind;
    use crate::renderer::recording::{GpuCommand, RecordingBackend};

    #[test]
    fn compiles_each_requested_shader_once() {
        let backend = RecordingBackend::new();
        let cache = ShaderCache::new(
            &backend,
            &[
                ShaderType::TransformVWithTextures,
                ShaderType::TransformVWithTextures,
            ],
        )
        .unwrap();

        assert!(cache.is_compiled(ShaderType::TransformVWithTextures));
        assert!(!cache.is_compiled(ShaderType::AbsolutePositionWithSolidColor));
        let creations = backend
            .commands()
            .iter()
            .filter(|command| matches!(command, GpuCommand::CreatePipeline(..)))
            .count();
        assert_eq!(creations, 1);
    }

    #[test]
    fn activating_an_uncompiled_shader_fails() {
        let backend = RecordingBackend::new();
        let cache = ShaderCache::new(&backend, &[ShaderType::TransformVWithTextures]).unwrap();

        assert!(matches!(
            cache.activate(ShaderType::AbsolutePositionWithSolidColor),
            Err(BatchError::ShaderNotCompiled(
                ShaderType::AbsolutePositionWithSolidColor
            ))
        ));
    }

    #[test]
    fn binding_an_attribute_the_shader_ignores_fails() {
        let backend = RecordingBackend::new();
        let cache = ShaderCache::with_all_shaders(&backend).unwrap();
        let vao = backend.create_vertex_array("vao").unwrap();
        let buffer = backend.create_buffer("colors", BufferKind::Vertex).unwrap();

        let result = cache.bind_attribute(
            vao,
            buffer,
            ShaderType::TransformVWithTextures,
            VertexAttribute::PassthroughColor,
        );

        assert!(matches!(result, Err(BatchError::AttributeNotUsed { .. })));
        assert_eq!(backend.vertex_buffer_at(vao, 1), None);
    }

    #[test]
    fn binding_wires_the_attribute_location() {
        let backend = RecordingBackend::new();
        let cache = ShaderCache::with_all_shaders(&backend).unwrap();
        let vao = backend.create_vertex_array("vao").unwrap();
        let buffer = backend.create_buffer("uvs", BufferKind::Vertex).unwrap();

        cache
            .bind_attribute(
                vao,
                buffer,
                ShaderType::TransformVWithTextures,
                VertexAttribute::PassthroughTextureCoordinate,
            )
            .unwrap();

        assert_eq!(backend.vertex_buffer_at(vao, 2), Some(buffer));
    }
}
