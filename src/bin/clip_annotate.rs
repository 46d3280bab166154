//! clip_annotate - label every fixed-length clip of every video in a directory

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufWriter, IsTerminal};
use std::path::PathBuf;

use clip_annotator::ui::Ui;
use clip_annotator::{
    list_videos, run_batch, AnnotateConfig, CancelToken, Models, OutputSink, Pipeline,
    PipelineError,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CLIP_ANNOTATOR_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory of input videos.
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,
    /// Print one line per frame to stdout.
    #[arg(long, conflicts_with = "video")]
    log: bool,
    /// Write annotated videos instead of log lines.
    #[arg(long)]
    video: bool,
    /// Frames per clip window.
    #[arg(long)]
    window_size: Option<usize>,
    /// Directory for annotated videos.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Output container (mp4|y4m).
    #[arg(long)]
    container: Option<String>,
    /// Model backend (native|tract).
    #[arg(long)]
    backend: Option<String>,
    /// Feature extractor checkpoint.
    #[arg(long, value_name = "PATH")]
    extractor: Option<PathBuf>,
    /// Classifier checkpoint.
    #[arg(long, value_name = "PATH")]
    classifier: Option<PathBuf>,
    /// Write a JSON batch report here.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut AnnotateConfig) -> Result<(), PipelineError> {
        if self.log {
            cfg.log_mode = true;
        }
        if self.video {
            cfg.log_mode = false;
        }
        if let Some(dir) = &self.input_dir {
            cfg.input_dir = dir.clone();
        }
        if let Some(size) = self.window_size {
            cfg.window_size = size;
        }
        if let Some(dir) = &self.output_dir {
            cfg.output.dir = dir.clone();
        }
        if let Some(container) = &self.container {
            cfg.output.container = container.parse()?;
        }
        if let Some(backend) = &self.backend {
            cfg.model.backend = backend.parse()?;
        }
        if let Some(path) = &self.extractor {
            cfg.model.extractor_path = path.clone();
        }
        if let Some(path) = &self.classifier {
            cfg.model.classifier_path = path.clone();
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();

    let cfg = AnnotateConfig::load_with(args.config.as_deref(), |cfg| args.apply(cfg))
        .context("load config")?;
    let ui = Ui::from_args(Some(&args.ui), is_tty, cfg.log_mode && !stdout_is_tty);

    let models = {
        let _stage = ui.stage("Load models");
        Models::load(&cfg.model, cfg.clip_shape()).context("load models")?
    };

    let videos = list_videos(&cfg.input_dir)
        .with_context(|| format!("list videos in {}", cfg.input_dir.display()))?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping after the current frame");
        handler_token.cancel();
    })
    .context("set Ctrl-C handler")?;

    let pipeline = Pipeline::from_config(&models, &cfg)?;
    let stdout = std::io::stdout();
    let mut sink = OutputSink::from_config(&cfg, BufWriter::new(stdout.lock()));
    let batch = run_batch(&pipeline, &videos, &mut sink, &cancel, &ui);
    drop(sink);

    if let Some(path) = &args.report {
        let _stage = ui.stage("Write report");
        std::fs::write(path, batch.to_json()?)
            .with_context(|| format!("write report {}", path.display()))?;
    }

    if batch.cancelled {
        return Err(anyhow!("cancelled"));
    }
    if batch.failed > 0 {
        log::warn!("{} of {} videos failed", batch.failed, batch.videos.len());
    }
    Ok(())
}
