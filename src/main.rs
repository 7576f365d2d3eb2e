mod api;
mod audio;
mod caption;
mod config;
mod error;
mod pipeline;
mod publish;
mod scene;
mod source;
mod video;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use api::{GeminiClient, GeminiModel, GoogleTts, PollinationsClient};
use caption::CaptionGenerator;
use clap::Parser;
use config::{AudioMode, Config};
use error::{PipelineError, Result};
use pipeline::{AudioSource, Pipeline};
use publish::{CredentialProvider, OAuthCredentials, UploadResult, YouTubeUploader};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scene::Scene;
use source::ImageSelector;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use video::{Compositor, FfmpegEncoder};

const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";
const TTS_KEY_VAR: &str = "TTS_API_KEY";

#[derive(Parser, Debug)]
#[command(name = "bhakti-shorts")]
#[command(about = "Generate and publish one devotional short video", long_about = None)]
struct Args {
    /// Theme for the image and caption, e.g. "Krishna playing flute"
    #[arg(short, long)]
    scene: Option<String>,

    /// Narrate the quote instead of using background music
    #[arg(long)]
    voice: bool,

    /// Skip image generation and use the local pool only
    #[arg(long)]
    no_generate: bool,

    /// Render only, do not upload or archive
    #[arg(long)]
    no_upload: bool,

    /// Keep the rendered video after a successful upload
    #[arg(long)]
    keep_video: bool,

    /// Print the text models available to this key and exit
    #[arg(long)]
    list_models: bool,

    #[arg(long, default_value = "images")]
    images_dir: PathBuf,

    #[arg(long, default_value = "bgm")]
    bgm_dir: PathBuf,

    /// Font file tried before the system fallbacks
    #[arg(long)]
    font: Option<PathBuf>,

    /// Output video path (defaults to <work-dir>/short.mp4)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Working directory for generated and temporary files
    #[arg(short = 'w', long, default_value = "./output")]
    work_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = build_config(&args);

    let secrets = Secrets::from_env(config.upload.enabled).unwrap_or_else(|e| fail(e));

    let gemini = Arc::new(
        GeminiClient::new(secrets.gemini_key.clone()).context("Failed to create Gemini client")?,
    );
    info!("Using Gemini key {}", gemini.key_hint());

    if args.list_models {
        let models = gemini.list_models().await.unwrap_or_else(|e| fail(e));
        for model in models {
            println!("{}", model);
        }
        return Ok(());
    }

    prepare_dirs(&config).await?;

    let mut rng = StdRng::from_os_rng();
    let scene = match &args.scene {
        Some(label) => Some(Scene::new(label.as_str())),
        None => Scene::choose(&scene::default_scenes(), &mut rng),
    };
    if let Some(scene) = &scene {
        info!("Scene: {}", scene.label);
    }

    let pipeline = build_pipeline(&config, secrets, gemini).context("Failed to set up pipeline")?;

    info!("Starting bhakti-shorts run...");
    let report = pipeline
        .run(scene.as_ref(), &mut rng)
        .await
        .unwrap_or_else(|e| fail(e));

    match &report.upload {
        Some(UploadResult::Published { video_id }) => {
            info!("Published https://youtube.com/shorts/{}", video_id);
        }
        _ => info!("Video ready: {}", report.video.display()),
    }
    if let Some(dest) = &report.archived_to {
        info!("Archived source image to {}", dest.display());
    }

    Ok(())
}

/// Log a classified pipeline error and exit with its code.
fn fail(e: PipelineError) -> ! {
    error!("{}", e);
    std::process::exit(e.kind().exit_code());
}

fn build_config(args: &Args) -> Config {
    let mut config = Config::from_env();
    config.images_dir = args.images_dir.clone();
    config.bgm_dir = args.bgm_dir.clone();
    config.work_dir = args.work_dir.clone();
    config.output_file = args
        .output
        .clone()
        .unwrap_or_else(|| args.work_dir.join("short.mp4"));
    if args.voice {
        config.audio_mode = AudioMode::Narration;
    }
    if let Some(font) = &args.font {
        config.set_font(font.clone());
    }
    config.generation.enabled = !args.no_generate;
    config.upload.enabled = !args.no_upload;
    config.upload.keep_video = args.keep_video;
    config
}

/// Secrets read once before anything touches the filesystem.
struct Secrets {
    gemini_key: String,
    tts_key: Option<String>,
    youtube: Option<OAuthCredentials>,
}

impl Secrets {
    fn from_env(upload: bool) -> Result<Self> {
        let gemini_key = read_secret(GEMINI_KEY_VAR)?;
        let youtube = if upload {
            Some(OAuthCredentials::from_env()?)
        } else {
            None
        };
        Ok(Self {
            gemini_key,
            tts_key: read_secret(TTS_KEY_VAR).ok(),
            youtube,
        })
    }
}

fn read_secret(name: &'static str) -> Result<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(PipelineError::MissingCredential(name))
}

async fn prepare_dirs(config: &Config) -> anyhow::Result<()> {
    config.ensure_dirs().await.with_context(|| {
        format!(
            "Failed to create working directories {} and {}",
            config.work_dir.display(),
            config.used_dir.display()
        )
    })
}

fn build_pipeline(config: &Config, secrets: Secrets, gemini: Arc<GeminiClient>) -> Result<Pipeline> {
    let mut selector =
        ImageSelector::new(config.images_dir.clone(), config.generated_image_path()).with_retries(
            config.generation.retries,
            config.generation.retry_delay,
        );
    if config.generation.enabled {
        let generator = PollinationsClient::new(config.render.width, config.render.height)?;
        selector = selector.with_generator(Box::new(generator));
    }

    let captions = CaptionGenerator::new(
        GeminiModel::chain(gemini, &config.generation.text_models),
        config.generation.language.clone(),
    );

    let audio = match config.audio_mode {
        AudioMode::Music => AudioSource::Music {
            dir: config.bgm_dir.clone(),
        },
        AudioMode::Narration => {
            let tts_key = secrets.tts_key.unwrap_or(secrets.gemini_key);
            AudioSource::Narration {
                synthesizer: Box::new(GoogleTts::new(
                    tts_key,
                    config.generation.tts_language_code.clone(),
                    config.generation.tts_voice.clone(),
                )?),
                output: config.narration_path(),
            }
        }
    };

    let renderer = Compositor::new(
        config.render.clone(),
        config.work_dir.clone(),
        config.output_file.clone(),
        Box::new(FfmpegEncoder::new()),
    );

    let mut pipeline = Pipeline::new(
        selector,
        captions,
        audio,
        Box::new(renderer),
        config.used_dir.clone(),
    )
    .with_attach_image(config.generation.attach_image);
    if let Some(credentials) = secrets.youtube {
        let uploader = YouTubeUploader::new(CredentialProvider::new(credentials)?);
        pipeline = pipeline.with_publisher(Box::new(uploader), config.upload.clone());
    }
    Ok(pipeline)
}
