use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::IVec2;
use image::RgbaImage;
use serde::{Deserialize, Deserializer};

use crate::error::{EngineError, Result};

// ── Sequence ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Switch to `image`, offset by `displacement` from the sprite position.
    Show { image: String, displacement: IVec2 },
    /// Pause for this many milliseconds (before the time factor is applied).
    Wait(u64),
}

/// A named script of image swaps and delays.
///
/// The JSON form is the flat list used by level data files:
/// `[true, ["main", [0, 0]], 1000, ["hidden", [0, 0]], 1000]`. The leading
/// boolean is the loop flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    looping: bool,
    steps: Vec<Step>,
}

impl Sequence {
    pub fn new(looping: bool, steps: Vec<Step>) -> Result<Self> {
        if steps.iter().any(|s| matches!(s, Step::Wait(0))) {
            return Err(EngineError::InvalidSequence("delays must be positive".into()));
        }
        if looping && !steps.iter().any(|s| matches!(s, Step::Wait(_))) {
            return Err(EngineError::InvalidSequence("a looping sequence needs at least one delay".into()));
        }
        Ok(Self { looping, steps })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Image names the script refers to, in order of first use.
    pub fn images(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if let Step::Show { image, .. } = step {
                if !names.contains(&image.as_str()) {
                    names.push(image);
                }
            }
        }
        names
    }

    fn from_raw(raw: Vec<RawStep>) -> Result<Self> {
        let mut iter = raw.into_iter();
        let looping = match iter.next() {
            Some(RawStep::Flag(b)) => b,
            _ => return Err(EngineError::InvalidSequence("first element must be the loop flag".into())),
        };
        let mut steps = Vec::new();
        for item in iter {
            let step = match item {
                RawStep::Flag(_) => {
                    return Err(EngineError::InvalidSequence("loop flag may only appear first".into()));
                }
                RawStep::Wait(ms) if ms <= 0 => {
                    return Err(EngineError::InvalidSequence(format!("delay must be positive, got {ms}")));
                }
                RawStep::Wait(ms) => Step::Wait(ms as u64),
                RawStep::Show(image, [dx, dy]) => Step::Show { image, displacement: IVec2::new(dx, dy) },
                RawStep::Image(image) => Step::Show { image, displacement: IVec2::ZERO },
            };
            steps.push(step);
        }
        Self::new(looping, steps)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Flag(bool),
    Wait(i64),
    Show(String, [i32; 2]),
    Image(String),
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = Vec::<RawStep>::deserialize(d)?;
        Sequence::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Everything a sprite can show: still images by name plus sequences by name.
///
/// Images are shared (`Arc`) so several sprites built from the same level data
/// do not copy pixels.
#[derive(Clone, Debug, Default)]
pub struct Model {
    images: HashMap<String, Arc<RgbaImage>>,
    sequences: HashMap<String, Sequence>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, name: &str, image: RgbaImage) -> Self {
        self.insert_image(name, image);
        self
    }

    pub fn with_sequence(mut self, name: &str, sequence: Sequence) -> Self {
        self.insert_sequence(name, sequence);
        self
    }

    pub fn insert_image(&mut self, name: &str, image: RgbaImage) {
        self.images.insert(name.to_string(), Arc::new(image));
    }

    /// Decode an image file from disk and store it under `name`.
    pub fn insert_image_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        let image = image::open(path.as_ref())?.to_rgba8();
        self.insert_image(name, image);
        Ok(())
    }

    pub fn insert_sequence(&mut self, name: &str, sequence: Sequence) {
        self.sequences.insert(name.to_string(), sequence);
    }

    /// Add every sequence from a JSON object of `name -> [loop, ...]` lists.
    pub fn load_sequences_json(&mut self, json: &str) -> Result<usize> {
        let parsed: HashMap<String, Sequence> = serde_json::from_str(json)?;
        let count = parsed.len();
        self.sequences.extend(parsed);
        Ok(count)
    }

    pub fn image(&self, name: &str) -> Option<Arc<RgbaImage>> {
        self.images.get(name).cloned()
    }

    pub fn has_image(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }
}
