use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

/// Per-vertex input consumed by a shader. Each attribute lives in its own
/// (non-interleaved) vertex buffer bound at a fixed shader location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    XyzPosition,
    PassthroughColor,
    PassthroughTextureCoordinate,
}

impl VertexAttribute {
    const XYZ_POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const COLOR_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
    const TEXTURE_COORDINATE_ATTRS: [wgpu::VertexAttribute; 1] =
        wgpu::vertex_attr_array![2 => Float32x2];

    pub const fn location(self) -> u32 {
        self.attributes()[0].shader_location
    }

    pub const fn format(self) -> wgpu::VertexFormat {
        self.attributes()[0].format
    }

    /// Size in bytes of one element of this attribute's stream.
    pub const fn size(self) -> usize {
        match self {
            VertexAttribute::XyzPosition | VertexAttribute::PassthroughColor => {
                mem::size_of::<[f32; 3]>()
            }
            VertexAttribute::PassthroughTextureCoordinate => mem::size_of::<[f32; 2]>(),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            VertexAttribute::XyzPosition => "xyz_position",
            VertexAttribute::PassthroughColor => "passthrough_color",
            VertexAttribute::PassthroughTextureCoordinate => "passthrough_texture_coordinate",
        }
    }

    const fn attributes(self) -> &'static [wgpu::VertexAttribute] {
        match self {
            VertexAttribute::XyzPosition => &Self::XYZ_POSITION_ATTRS,
            VertexAttribute::PassthroughColor => &Self::COLOR_ATTRS,
            VertexAttribute::PassthroughTextureCoordinate => &Self::TEXTURE_COORDINATE_ATTRS,
        }
    }

    /// Buffer layout for a vertex buffer carrying only this attribute.
    pub fn layout(self) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: self.size() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: self.attributes(),
        }
    }
}

impl fmt::Display for VertexAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A shader program together with the fixed set of vertex attributes it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderType {
    AbsolutePositionWithSolidColor,
    TransformVWithTextures,
}

impl ShaderType {
    pub const ALL: [ShaderType; 2] = [
        ShaderType::AbsolutePositionWithSolidColor,
        ShaderType::TransformVWithTextures,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ShaderType::AbsolutePositionWithSolidColor => "absolute_position_with_solid_color",
            ShaderType::TransformVWithTextures => "transform_v_with_textures",
        }
    }

    /// Case-insensitive lookup by snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|shader| shader.name().eq_ignore_ascii_case(name))
    }

    /// Attributes in the order their streams are passed to `queue_draw`.
    pub const fn vertex_attributes(self) -> &'static [VertexAttribute] {
        match self {
            ShaderType::AbsolutePositionWithSolidColor => &[
                VertexAttribute::XyzPosition,
                VertexAttribute::PassthroughColor,
            ],
            ShaderType::TransformVWithTextures => &[
                VertexAttribute::XyzPosition,
                VertexAttribute::PassthroughTextureCoordinate,
            ],
        }
    }

    pub fn uses_attribute(self, attribute: VertexAttribute) -> bool {
        self.vertex_attributes().contains(&attribute)
    }

    pub const fn source(self) -> &'static str {
        match self {
            ShaderType::AbsolutePositionWithSolidColor => {
                include_str!("../shader/absolute_position_with_solid_color.wgsl")
            }
            ShaderType::TransformVWithTextures => {
                include_str!("../shader/transform_v_with_textures.wgsl")
            }
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_stride_matches_element_size() {
        for attribute in [
            VertexAttribute::XyzPosition,
            VertexAttribute::PassthroughColor,
            VertexAttribute::PassthroughTextureCoordinate,
        ] {
            assert_eq!(
                attribute.layout().array_stride,
                attribute.format().size(),
                "{attribute}"
            );
        }
    }

    #[test]
    fn attribute_locations_are_distinct() {
        assert_eq!(VertexAttribute::XyzPosition.location(), 0);
        assert_eq!(VertexAttribute::PassthroughColor.location(), 1);
        assert_eq!(VertexAttribute::PassthroughTextureCoordinate.location(), 2);
    }

    #[test]
    fn shader_names_parse_case_insensitively() {
        assert_eq!(
            ShaderType::from_name("TRANSFORM_V_WITH_TEXTURES"),
            Some(ShaderType::TransformVWithTextures)
        );
        assert_eq!(
            ShaderType::from_name(" absolute_position_with_solid_color "),
            Some(ShaderType::AbsolutePositionWithSolidColor)
        );
        assert_eq!(ShaderType::from_name("cel_shading"), None);
    }

    #[test]
    fn every_shader_starts_with_a_position_stream() {
        for shader in ShaderType::ALL {
            assert_eq!(shader.vertex_attributes()[0], VertexAttribute::XyzPosition);
        }
    }
}
