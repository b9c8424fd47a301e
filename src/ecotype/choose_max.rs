//! Suitability-driven choice between sub-generators.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::core::types::Vec2;
use crate::flora::lut::OffsetTable;
use crate::math::Aabb;
use crate::render::VertexSink;

use super::def::FunctionDef;
use super::generator::{EcotypeGenerator, Placement};

/// Scalar field scoring how well a sub-generator suits a location.
#[derive(Clone, Debug)]
pub enum SuitabilityFunction {
    /// Fractal noise; `frequency` is the feature size in metres.
    Noise { noise: Fbm<Perlin>, frequency: f32 },
    /// Positional hash in [0, 1).
    Random { seed: u32 },
    Fixed(f32),
}

impl SuitabilityFunction {
    pub fn noise(frequency: f32, seed: u32) -> Self {
        let noise = Fbm::<Perlin>::new(seed).set_octaves(3).set_persistence(0.75);
        Self::Noise { noise, frequency: frequency.max(f32::EPSILON) }
    }

    pub fn from_def(def: &FunctionDef, seed: u32) -> Self {
        match def {
            FunctionDef::Noise { frequency } => Self::noise(*frequency, seed),
            FunctionDef::Random => Self::Random { seed },
            FunctionDef::Fixed { value } => Self::Fixed(*value),
        }
    }

    pub fn evaluate(&self, position: Vec2) -> f32 {
        match self {
            Self::Noise { noise, frequency } => {
                let p = position / *frequency;
                noise.get([p.x as f64, p.y as f64]) as f32
            }
            Self::Random { seed } => position_hash(position, *seed),
            Self::Fixed(value) => *value,
        }
    }
}

fn position_hash(position: Vec2, seed: u32) -> f32 {
    let mut h = u64::from(position.x.to_bits())
        | (u64::from(position.y.to_bits()) << 32);
    h ^= u64::from(seed).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    // splitmix64 finalizer
    h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^= h >> 31;
    (h >> 40) as f32 / (1u64 << 24) as f32
}

/// Delegates each placement to the sub-generator scoring highest at the
/// placement's position.
#[derive(Clone, Debug, Default)]
pub struct ChooseMaxGenerator {
    choices: Vec<(SuitabilityFunction, EcotypeGenerator)>,
}

impl ChooseMaxGenerator {
    pub fn new(choices: Vec<(SuitabilityFunction, EcotypeGenerator)>) -> Self {
        Self { choices }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Index of the chosen sub-generator. Scores must beat -0.1 and the
    /// first of equal maxima wins.
    pub fn choose(&self, position: Vec2) -> Option<usize> {
        let mut best = -0.1;
        let mut chosen = None;
        for (i, (function, _)) in self.choices.iter().enumerate() {
            let value = function.evaluate(position);
            if value > best {
                best = value;
                chosen = Some(i);
            }
        }
        chosen
    }

    pub fn generate(
        &self,
        sink: Option<&mut dyn VertexSink>,
        placement: &Placement,
        lut: &mut OffsetTable,
        bounds: &mut Aabb,
    ) -> usize {
        let p = placement.world_position();
        match self.choose(Vec2::new(p.x, p.z)) {
            Some(i) => self.choices[i].1.generate(sink, placement, lut, bounds),
            None => 0,
        }
    }
}
