//! Ecotype generators.
//!
//! A generator writes one placement's worth of detail-object vertices.
//! Passing no sink counts vertices without writing anything; the block
//! fill uses that for its dry run. Both kinds of call must consume the
//! same lookup-table entries so the commit pass replays the dry run.

use std::path::Path;

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec2, Vec3};
use crate::flora::constants::{BLOCK_WIDTH, EMPTY_PLACEMENT_VERTICES};
use crate::flora::lut::OffsetTable;
use crate::math::Aabb;
use crate::render::{FloraVertex, VertexSink};
use crate::texture::{AtlasLayout, TextureSource};

use super::choose_max::{ChooseMaxGenerator, SuitabilityFunction};
use super::def::GeneratorDef;
use super::mesh::FloraMesh;

/// Per-placement inputs to [`EcotypeGenerator::generate`].
#[derive(Clone, Copy, Debug)]
pub struct Placement {
    /// UV offset of the ecotype's atlas slot.
    pub uv_offset: Vec2,
    /// Placement number within the block.
    pub index: usize,
    /// Vertices still free in the block's range.
    pub max_vertices: usize,
    pub object_to_world: Mat4,
    /// Object to terrain-block space, the space vertices are stored in.
    pub object_to_chunk: Mat4,
}

impl Placement {
    pub fn world_position(&self) -> Vec3 {
        self.object_to_world.w_axis.truncate()
    }
}

/// One source mesh prepared for the vertex buffer.
#[derive(Clone, Debug)]
pub struct VisualCopy {
    vertices: Vec<FloraVertex>,
    scale_variation: f32,
}

impl VisualCopy {
    /// Copy `mesh`, scaling its UVs into one atlas slot and deriving each
    /// vertex's flex from its height above the mesh base.
    pub fn new(mesh: &FloraMesh, flex: f32, scale_variation: f32, uv_scale: Vec2) -> Self {
        let base = mesh.base_height();
        let vertices = mesh
            .vertices
            .iter()
            .map(|v| {
                let relative_height = ((v.position.y - base) / 2.0).min(1.0);
                let flex = if relative_height > 0.1 { flex * relative_height } else { 0.0 };
                FloraVertex::new(v.position, v.uv * uv_scale, flex)
            })
            .collect();
        Self { vertices, scale_variation }
    }

    pub fn vertices(&self) -> &[FloraVertex] {
        &self.vertices
    }
}

/// Scatters a cycling list of meshes at a fixed density.
#[derive(Clone, Debug, Default)]
pub struct VisualsGenerator {
    visuals: Vec<VisualCopy>,
    density: f32,
}

impl VisualsGenerator {
    pub fn new(visuals: Vec<VisualCopy>, density: f32) -> Self {
        Self { visuals, density }
    }

    pub fn generate(
        &self,
        sink: Option<&mut dyn VertexSink>,
        placement: &Placement,
        lut: &mut OffsetTable,
        bounds: &mut Aabb,
    ) -> usize {
        if self.visuals.is_empty() {
            return 0;
        }
        let visual = &self.visuals[placement.index % self.visuals.len()];
        let count = visual.vertices.len();
        if count > placement.max_vertices {
            return 0;
        }

        // Always drawn, accepted or not.
        let r_density = lut.next_random();
        let r_scale = lut.next_random();

        let Some(sink) = sink else {
            return count;
        };

        if r_density < self.density {
            let scale = Mat4::from_scale(Vec3::splat(r_scale.abs() * visual.scale_variation + 1.0));
            let to_chunk = placement.object_to_chunk * scale;
            let to_world = placement.object_to_world * scale;

            let origin = placement.world_position();
            let bx = ((origin.x / BLOCK_WIDTH).floor() as i32).unsigned_abs();
            let bz = ((origin.z / BLOCK_WIDTH).floor() as i32).unsigned_abs();

            sink.set_uv_offset(placement.uv_offset);
            sink.set_anim_block(bx % 7 + (bz % 7) * 7);
            sink.add_vertices(&visual.vertices, &to_chunk);
            for v in &visual.vertices {
                bounds.expand(to_world.transform_point3(v.position()));
            }
        } else {
            sink.clear(count);
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

/// Generator variants.
#[derive(Clone, Debug)]
pub enum EcotypeGenerator {
    /// Emits degenerate vertices only; neighbours never encroach on it.
    Empty,
    Visuals(VisualsGenerator),
    ChooseMax(ChooseMaxGenerator),
}

impl Default for EcotypeGenerator {
    fn default() -> Self {
        Self::Empty
    }
}

impl EcotypeGenerator {
    /// Produce one placement and return the number of vertices it takes.
    /// Zero means nothing more fits in the block.
    pub fn generate(
        &self,
        sink: Option<&mut dyn VertexSink>,
        placement: &Placement,
        lut: &mut OffsetTable,
        bounds: &mut Aabb,
    ) -> usize {
        match self {
            Self::Empty => {
                let count = placement.max_vertices.min(EMPTY_PLACEMENT_VERTICES);
                if let Some(sink) = sink {
                    sink.clear(count);
                }
                count
            }
            Self::Visuals(visuals) => visuals.generate(sink, placement, lut, bounds),
            Self::ChooseMax(choose) => choose.generate(sink, placement, lut, bounds),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Visuals(visuals) => visuals.is_empty(),
            Self::ChooseMax(_) => false,
        }
    }

    /// Build a generator from its definition, loading meshes from `root`.
    /// Returns the texture the generator's UVs refer to.
    pub fn build(def: &GeneratorDef, root: &Path, layout: &AtlasLayout) -> Result<(Self, Option<TextureSource>)> {
        match def {
            GeneratorDef::Empty => Ok((Self::Empty, None)),
            GeneratorDef::Visual { density, texture, visuals } => {
                let uv_scale = layout.uv_scale();
                let copies = visuals
                    .iter()
                    .map(|v| {
                        let mesh = FloraMesh::load(&v.mesh, root)?;
                        if mesh.is_empty() {
                            return Err(Error::Config(format!("mesh '{}' has no triangles", v.mesh)));
                        }
                        Ok(VisualCopy::new(&mesh, v.flex, v.scale_variation, uv_scale))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let source = TextureSource::parse(texture)?;
                Ok((Self::Visuals(VisualsGenerator::new(copies, *density)), Some(source)))
            }
            GeneratorDef::ChooseMax { choices } => {
                let mut texture: Option<TextureSource> = None;
                let mut built = Vec::with_capacity(choices.len());
                for (i, choice) in choices.iter().enumerate() {
                    let (generator, child_texture) = Self::build(&choice.generator, root, layout)?;
                    match (&texture, child_texture) {
                        (None, t) => texture = t,
                        (Some(first), Some(other)) if *first != other => {
                            log::error!(
                                "choose_max children must share one texture; using {} instead of {}",
                                first.name(),
                                other.name()
                            );
                        }
                        _ => {}
                    }
                    built.push((SuitabilityFunction::from_def(&choice.function, i as u32), generator));
                }
                Ok((Self::ChooseMax(ChooseMaxGenerator::new(built)), texture))
            }
        }
    }
}
