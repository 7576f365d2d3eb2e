//! Picks the image a run is built around.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::api::ImageGenerator;
use crate::error::{PipelineError, Result};
use crate::scene::Scene;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Taken from the unused image pool; archived after upload.
    Local,
    /// Written by the image generator to a fixed path.
    Generated,
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub origin: ImageOrigin,
    /// Read from the file header; `None` when the header is not recognised
    pub dimensions: Option<(u32, u32)>,
}

impl SourceImage {
    fn new(path: PathBuf, origin: ImageOrigin) -> Self {
        let dimensions = image::image_dimensions(&path).ok();
        Self {
            path,
            origin,
            dimensions,
        }
    }
}

pub struct ImageSelector {
    generator: Option<Box<dyn ImageGenerator>>,
    images_dir: PathBuf,
    generated_path: PathBuf,
    retries: u32,
    retry_delay: Duration,
}

impl ImageSelector {
    pub fn new(images_dir: PathBuf, generated_path: PathBuf) -> Self {
        Self {
            generator: None,
            images_dir,
            generated_path,
            retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn ImageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub async fn select<R: Rng + ?Sized>(
        &self,
        scene: Option<&Scene>,
        rng: &mut R,
    ) -> Result<SourceImage> {
        if let (Some(generator), Some(scene)) = (&self.generator, scene) {
            if self.try_generate(generator.as_ref(), &scene.image_prompt).await {
                return Ok(SourceImage::new(
                    self.generated_path.clone(),
                    ImageOrigin::Generated,
                ));
            }
            warn!("Image generation exhausted, falling back to {}", self.images_dir.display());
        }

        let images = list_pool(&self.images_dir).await?;
        let path = images
            .choose(rng)
            .cloned()
            .ok_or_else(|| PipelineError::NoImages(self.images_dir.clone()))?;

        let image = SourceImage::new(path, ImageOrigin::Local);
        match image.dimensions {
            Some((w, h)) => info!("Processing local image: {} ({}x{})", image.path.display(), w, h),
            None => info!("Processing local image: {}", image.path.display()),
        }
        Ok(image)
    }

    async fn try_generate(&self, generator: &dyn ImageGenerator, prompt: &str) -> bool {
        for attempt in 1..=self.retries {
            match generator.generate(prompt, &self.generated_path).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Image generation attempt {}/{} failed: {}",
                        attempt, self.retries, e
                    );
                }
            }
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        false
    }
}

/// Image files in `dir`, sorted by name. A missing directory is an empty pool.
pub async fn list_pool(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && has_extension(&path, IMAGE_EXTENSIONS) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails a fixed number of times, then writes a tiny file.
    pub(crate) struct FlakyGenerator {
        pub failures: usize,
        pub calls: Arc<AtomicUsize>,
    }

    impl FlakyGenerator {
        pub(crate) fn always_failing() -> Self {
            Self {
                failures: usize::MAX,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for FlakyGenerator {
        async fn generate(&self, _prompt: &str, output_path: &Path) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(PipelineError::Api("connection refused".to_string()));
            }
            tokio::fs::write(output_path, b"generated").await?;
            Ok(())
        }
    }

    fn selector(dir: &Path) -> ImageSelector {
        ImageSelector::new(dir.join("images"), dir.join("generated.jpg"))
            .with_retries(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_list_pool_filters_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.webp"] {
            std::fs::write(images.join(name), b"x").unwrap();
        }
        std::fs::create_dir(images.join("nested.jpg")).unwrap();

        let pool = list_pool(&images).await.unwrap();
        let names: Vec<_> = pool
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.webp"]);
    }

    #[tokio::test]
    async fn test_missing_pool_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_pool(&tmp.path().join("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_succeeds_after_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = FlakyGenerator {
            failures: 2,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let calls = generator.calls.clone();
        let selector = selector(tmp.path()).with_generator(Box::new(generator));
        let scene = Scene::new("Krishna playing flute");

        let image = selector
            .select(Some(&scene), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();
        assert_eq!(image.origin, ImageOrigin::Generated);
        assert_eq!(image.path, tmp.path().join("generated.jpg"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_falls_back_to_local_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir(&images).unwrap();
        std::fs::write(images.join("one.jpg"), b"1").unwrap();
        std::fs::write(images.join("two.png"), b"2").unwrap();

        let generator = FlakyGenerator::always_failing();
        let calls = generator.calls.clone();
        let selector = selector(tmp.path()).with_generator(Box::new(generator));
        let scene = Scene::new("Krishna playing flute");

        let image = selector
            .select(Some(&scene), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();
        assert_eq!(image.origin, ImageOrigin::Local);
        assert!(image.path.starts_with(&images));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_pool_after_failed_generation_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("images")).unwrap();
        let selector =
            selector(tmp.path()).with_generator(Box::new(FlakyGenerator::always_failing()));
        let scene = Scene::new("Krishna playing flute");

        let err = selector
            .select(Some(&scene), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoImages(_)));
    }

    #[tokio::test]
    async fn test_random_pick_reaches_every_image() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            std::fs::write(images.join(name), b"x").unwrap();
        }
        let selector = selector(tmp.path());
        let mut rng = StdRng::seed_from_u64(9);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(selector.select(None, &mut rng).await.unwrap().path);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_dimensions_read_from_header() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir(&images).unwrap();
        image::RgbImage::new(64, 48)
            .save(images.join("real.png"))
            .unwrap();

        let image = selector(tmp.path())
            .select(None, &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();
        assert_eq!(image.dimensions, Some((64, 48)));
    }
}
