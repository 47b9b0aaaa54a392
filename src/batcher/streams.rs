//! Vertex attribute streams carried by each pipeline.
//!
//! A stream set holds one `Vec` per attribute of its shader, in the shader's
//! attribute order; element `i` of every stream describes vertex `i`.

use glam::{Vec2, Vec3};

use crate::errors::{BatchError, Result};
use crate::renderer::shaders::ShaderType;

pub trait VertexStreams: Default {
    const SHADER: ShaderType;

    /// Size in bytes of one element of each stream.
    const ELEMENT_SIZES: &'static [usize];

    /// Borrowed streams of one submission, one slice per attribute.
    type Submission<'a>: Copy
    where
        Self: 'a;

    fn submission_lengths(submission: &Self::Submission<'_>) -> Vec<usize>;

    fn submission_bytes<'a>(submission: &Self::Submission<'a>) -> Vec<&'a [u8]>;

    /// Number of vertices held; all streams have this length.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&mut self, submission: Self::Submission<'_>);

    fn clear(&mut self);

    fn as_submission(&self) -> Self::Submission<'_>;

    /// Raw contents of each stream, ready for upload.
    fn stream_bytes(&self) -> Vec<&[u8]>;

    /// Vertex count of `submission`, or an error if its streams disagree.
    fn submission_vertex_count(submission: &Self::Submission<'_>) -> Result<usize> {
        let lengths = Self::submission_lengths(submission);
        match lengths.split_first() {
            Some((&first, rest)) if rest.iter().all(|&len| len == first) => Ok(first),
            Some(_) => Err(BatchError::MismatchedStreams {
                shader: Self::SHADER,
                lengths,
            }),
            None => Ok(0),
        }
    }
}

macro_rules! vertex_streams {
    (
        $(#[$meta:meta])*
        $name:ident for $shader:path {
            $($field:ident: $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $(pub $field: Vec<$ty>,)+
        }

        impl VertexStreams for $name {
            const SHADER: ShaderType = $shader;
            const ELEMENT_SIZES: &'static [usize] = &[$(std::mem::size_of::<$ty>()),+];

            type Submission<'a> = ($(&'a [$ty],)+);

            fn submission_lengths(submission: &Self::Submission<'_>) -> Vec<usize> {
                let ($($field,)+) = *submission;
                vec![$($field.len()),+]
            }

            fn submission_bytes<'a>(submission: &Self::Submission<'a>) -> Vec<&'a [u8]> {
                let ($($field,)+) = *submission;
                vec![$(bytemuck::cast_slice($field)),+]
            }

            fn len(&self) -> usize {
                [$(self.$field.len()),+][0]
            }

            fn append(&mut self, submission: Self::Submission<'_>) {
                let ($($field,)+) = submission;
                $(self.$field.extend_from_slice($field);)+
            }

            fn clear(&mut self) {
                $(self.$field.clear();)+
            }

            fn as_submission(&self) -> Self::Submission<'_> {
                ($(self.$field.as_slice(),)+)
            }

            fn stream_bytes(&self) -> Vec<&[u8]> {
                vec![$(bytemuck::cast_slice(self.$field.as_slice())),+]
            }
        }
    };
}

vertex_streams! {
    /// Absolute (clip-space) positions with one flat color per vertex.
    SolidColorStreams for ShaderType::AbsolutePositionWithSolidColor {
        positions: Vec3,
        colors: Vec3,
    }
}

vertex_streams! {
    /// Positions with texture coordinates.
    TexturedStreams for ShaderType::TransformVWithTextures {
        positions: Vec3,
        texture_coordinates: Vec2,
    }
}

/// One owned submission: locally indexed geometry for a single pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawData<S: VertexStreams> {
    pub indices: Vec<u32>,
    pub vertices: S,
}

impl<S: VertexStreams> DrawData<S> {
    pub fn new(indices: Vec<u32>, vertices: S) -> Self {
        Self { indices, vertices }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
