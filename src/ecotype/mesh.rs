//! Source meshes for detail objects.
//!
//! Meshes are stored expanded to triangle lists. Besides JSON mesh files
//! two built-in grass cards are available: `quad` (one vertical card) and
//! `cross` (two cards at right angles).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, Vec2, Vec3};

/// One unindexed mesh vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub uv: Vec2,
}

/// On-disk mesh format.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MeshFile {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

/// Triangle-list mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloraMesh {
    pub vertices: Vec<MeshVertex>,
}

impl FloraMesh {
    /// Resolve a mesh name: a built-in card or a JSON file under `root`.
    pub fn load(name: &str, root: &Path) -> Result<Self> {
        match name {
            "quad" => Ok(Self::quad(1.0, 1.0)),
            "cross" => Ok(Self::cross(1.0, 1.0)),
            path => {
                let text = std::fs::read_to_string(root.join(path))?;
                let file: MeshFile = serde_json::from_str(&text)?;
                Self::from_file(&file)
            }
        }
    }

    pub fn from_file(file: &MeshFile) -> Result<Self> {
        if file.positions.len() != file.uvs.len() {
            return Err(Error::Config(format!(
                "mesh has {} positions but {} uvs",
                file.positions.len(),
                file.uvs.len()
            )));
        }
        if file.indices.len() % 3 != 0 {
            return Err(Error::Config(format!("mesh index count {} is not a multiple of 3", file.indices.len())));
        }

        let vertices = file
            .indices
            .iter()
            .map(|&i| {
                let i = i as usize;
                match (file.positions.get(i), file.uvs.get(i)) {
                    (Some(p), Some(uv)) => Ok(MeshVertex {
                        position: Vec3::from_array(*p),
                        uv: Vec2::from_array(*uv),
                    }),
                    _ => Err(Error::Config(format!("mesh index {} out of range", i))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { vertices })
    }

    /// Vertical card facing +Z, base centred on the origin.
    pub fn quad(width: f32, height: f32) -> Self {
        Self::card(Vec3::X * (width * 0.5), height)
    }

    /// Two vertical cards crossing at the origin.
    pub fn cross(width: f32, height: f32) -> Self {
        let mut mesh = Self::card(Vec3::X * (width * 0.5), height);
        mesh.vertices.extend(Self::card(Vec3::Z * (width * 0.5), height).vertices);
        mesh
    }

    fn card(half: Vec3, height: f32) -> Self {
        let up = Vec3::Y * height;
        let bl = MeshVertex { position: -half, uv: Vec2::new(0.0, 1.0) };
        let br = MeshVertex { position: half, uv: Vec2::new(1.0, 1.0) };
        let tl = MeshVertex { position: -half + up, uv: Vec2::new(0.0, 0.0) };
        let tr = MeshVertex { position: half + up, uv: Vec2::new(1.0, 0.0) };
        Self { vertices: vec![bl, br, tr, bl, tr, tl] }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Lowest Y of the mesh, never above the origin.
    pub fn base_height(&self) -> f32 {
        self.vertices.iter().map(|v| v.position.y).fold(0.0, f32::min)
    }
}
