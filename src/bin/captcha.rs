use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use araea_captcha::{CaptchaOptions, FontSource, ImageCaptcha, OverflowPolicy};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "captcha", version, about = "Generate a CAPTCHA image")]
struct Cli {
    /// Text to render.
    text: String,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// JSON options file; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Font file (repeatable).
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,

    /// System font family name (repeatable).
    #[arg(long = "family")]
    families: Vec<String>,

    /// Candidate font size (repeatable).
    #[arg(long = "font-size")]
    font_sizes: Vec<f32>,

    /// Seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Clip overflowing text instead of shrinking it to fit.
    #[arg(long)]
    clip: bool,

    /// Write per-character bounding boxes as JSON.
    #[arg(long)]
    boxes: Option<PathBuf>,

    /// Write a copy of the image with bounding boxes drawn on it.
    #[arg(long)]
    annotate: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = build_options(&cli)?;
    let captcha = ImageCaptcha::new(options).context("configure captcha")?;

    let mut rng = captcha.rng();
    let (image, boxes) = captcha
        .generate_with_bounding_boxes(&cli.text, &mut rng)
        .context("generate captcha")?;

    create_parent(&cli.out)?;
    image
        .save(&cli.out)
        .with_context(|| format!("write png '{}'", cli.out.display()))?;
    eprintln!("wrote {}", cli.out.display());

    if let Some(path) = &cli.boxes {
        create_parent(path)?;
        let f = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
        serde_json::to_writer_pretty(f, &boxes).with_context(|| "write bounding boxes")?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(path) = &cli.annotate {
        create_parent(path)?;
        araea_captcha::annotate(&image, &boxes)?
            .save(path)
            .with_context(|| format!("write png '{}'", path.display()))?;
        eprintln!("wrote {}", path.display());
    }

    Ok(())
}

fn build_options(cli: &Cli) -> anyhow::Result<CaptchaOptions> {
    let mut options = match &cli.config {
        Some(path) => read_options(path)?,
        None => CaptchaOptions::default(),
    };

    if let Some(width) = cli.width {
        options.width = width;
    }
    if let Some(height) = cli.height {
        options.height = height;
    }
    if !cli.fonts.is_empty() || !cli.families.is_empty() {
        options.fonts = cli
            .fonts
            .iter()
            .cloned()
            .map(FontSource::Path)
            .chain(cli.families.iter().cloned().map(FontSource::Family))
            .collect();
    }
    if !cli.font_sizes.is_empty() {
        options = options.font_sizes(cli.font_sizes.iter().copied());
    }
    if let Some(seed) = cli.seed {
        options.seed = Some(seed);
    }
    if cli.clip {
        options.overflow = OverflowPolicy::Clip;
    }

    Ok(options)
}

fn read_options(path: &Path) -> anyhow::Result<CaptchaOptions> {
    let f = File::open(path).with_context(|| format!("open options '{}'", path.display()))?;
    let options = serde_json::from_reader(BufReader::new(f)).with_context(|| "parse options JSON")?;
    Ok(options)
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}
