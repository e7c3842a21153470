//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Usage hint for a device buffer.
///
/// Static buffers are written once before first use and treated as
/// read-only by the device afterwards; dynamic buffers may be rewritten
/// across their whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Static,
    Dynamic,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Vertex layouts recognized by the renderer.
///
/// The set is closed: each call site fixes its layout at compile time,
/// so an unsupported layout tag is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Position, normal and a single texture coordinate ([`Vertex3D`])
    PosNormalTex,
    /// Position and a single texture coordinate ([`TexelVertex`])
    PosTex,
}

impl VertexLayout {
    /// Per-vertex size in bytes.
    pub fn stride(&self) -> u32 {
        match self {
            VertexLayout::PosNormalTex => std::mem::size_of::<Vertex3D>() as u32,
            VertexLayout::PosTex => std::mem::size_of::<TexelVertex>() as u32,
        }
    }

    /// Attribute descriptions for pipeline construction.
    pub fn attributes(&self) -> Vec<VertexAttribute> {
        match self {
            VertexLayout::PosNormalTex => Vertex3D::attributes(),
            VertexLayout::PosTex => TexelVertex::attributes(),
        }
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Full vertex with position, normal and one texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex3D {
    pub fn attributes() -> Vec<VertexAttribute> {
        vec![
            VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: VertexFormat::Float32x3,
                offset: 12,
            },
            VertexAttribute {
                location: 2,
                format: VertexFormat::Float32x2,
                offset: 24,
            },
        ]
    }
}

/// Position plus a single texture coordinate, for screen-space geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TexelVertex {
    pub position: Vec3,
    pub uv: Vec2,
}

impl TexelVertex {
    pub fn attributes() -> Vec<VertexAttribute> {
        vec![
            VertexAttribute {
                location: 0,
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                format: VertexFormat::Float32x2,
                offset: 12,
            },
        ]
    }
}
