//! Serialized ecotype definitions.

use serde::{Deserialize, Serialize};

/// One entry of the ecotype list; its index is the ecotype ID.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcotypeDef {
    /// Terrain texture roots (file stems, no extension) mapping to this ID.
    pub textures: Vec<String>,
    /// Missing means the ecotype is empty.
    pub generator: Option<GeneratorDef>,
}

/// Generator variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorDef {
    Empty,
    Visual {
        /// Fraction of placements that produce an object.
        #[serde(default = "default_density")]
        density: f32,
        /// Texture file, or a `#rrggbb[aa]` colour.
        texture: String,
        visuals: Vec<VisualDef>,
    },
    ChooseMax {
        choices: Vec<ChoiceDef>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualDef {
    /// `quad`, `cross` or a JSON mesh file.
    pub mesh: String,
    #[serde(default = "default_flex")]
    pub flex: f32,
    #[serde(default)]
    pub scale_variation: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDef {
    pub function: FunctionDef,
    pub generator: GeneratorDef,
}

/// Suitability function variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunctionDef {
    Noise {
        /// Feature size of the noise in metres.
        #[serde(default = "default_frequency")]
        frequency: f32,
    },
    Random,
    Fixed {
        #[serde(default = "default_value")]
        value: f32,
    },
}

fn default_density() -> f32 {
    1.0
}

fn default_flex() -> f32 {
    1.0
}

fn default_frequency() -> f32 {
    10.0
}

fn default_value() -> f32 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_generator() {
        let json = r##"{
            "textures": ["grass", "meadow"],
            "generator": {
                "type": "choose_max",
                "choices": [
                    { "function": { "type": "noise" },
                      "generator": { "type": "visual", "texture": "#00ff00",
                                     "visuals": [ { "mesh": "cross", "scale_variation": 0.5 } ] } },
                    { "function": { "type": "fixed", "value": 0.2 },
                      "generator": { "type": "empty" } }
                ]
            }
        }"##;
        let def: EcotypeDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.textures, vec!["grass", "meadow"]);

        let Some(GeneratorDef::ChooseMax { choices }) = def.generator else {
            panic!("expected choose_max");
        };
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].function, FunctionDef::Noise { frequency: 10.0 });
        match &choices[0].generator {
            GeneratorDef::Visual { density, visuals, .. } => {
                assert_eq!(*density, 1.0);
                assert_eq!(visuals[0].flex, 1.0);
                assert_eq!(visuals[0].scale_variation, 0.5);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(choices[1].generator, GeneratorDef::Empty);
    }

    #[test]
    fn test_empty_def() {
        let def: EcotypeDef = serde_json::from_str("{}").unwrap();
        assert!(def.textures.is_empty());
        assert!(def.generator.is_none());
    }
}
