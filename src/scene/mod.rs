use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const DEFAULT_SCENES: &[&str] = &[
    "Krishna playing flute",
    "Krishna with Radha in Vrindavan",
    "Baby Krishna stealing butter",
    "Krishna lifting Govardhan hill",
    "Krishna guiding Arjuna on the chariot",
    "Krishna dancing on the serpent Kaliya",
    "Krishna meditating by the Yamuna river",
];

/// A theme shared by the generated image and the generated caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Short label, e.g. "Krishna playing flute"
    pub label: String,
    /// Prompt sent to the image generator
    pub image_prompt: String,
}

impl Scene {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let image_prompt = format!(
            "Divine devotional painting of Lord {}, vertical portrait, soft golden light, \
             rich colors, highly detailed, peaceful expression, no text",
            label.trim_start_matches("Lord ")
        );
        Self {
            label,
            image_prompt,
        }
    }

    pub fn choose<R: Rng + ?Sized>(scenes: &[Scene], rng: &mut R) -> Option<Scene> {
        scenes.choose(rng).cloned()
    }
}

pub fn default_scenes() -> Vec<Scene> {
    DEFAULT_SCENES.iter().map(|label| Scene::new(*label)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_prompt_mentions_label() {
        let scene = Scene::new("Krishna playing flute");
        assert!(scene.image_prompt.contains("Lord Krishna playing flute"));
        assert!(scene.image_prompt.contains("no text"));
    }

    #[test]
    fn test_choose_from_defaults() {
        let scenes = default_scenes();
        let mut rng = StdRng::seed_from_u64(42);
        let scene = Scene::choose(&scenes, &mut rng).unwrap();
        assert!(scenes.contains(&scene));
    }

    #[test]
    fn test_choose_from_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Scene::choose(&[], &mut rng).is_none());
    }
}
