use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use kw_audio::capture::MicSource;
use kw_audio::decode::FileSource;
use kw_core::config::PipelineConfig;
use kw_core::traits::{AudioSource, Classifier};

pub mod app;
pub mod cli;
pub mod pipeline;

use pipeline::Pipeline;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new().filter_level(cli.log_filter()).init();

    // 3. Charger la config et appliquer les overrides CLI
    let mut config = resolve_config(&cli.config)?;
    apply_overrides(&mut config, &cli);

    // 4. Valider avant d'ouvrir l'audio
    config.validate()?;
    let weights = kw_model::weights::load_weights(&cli.model)?;
    weights
        .validate(&config)
        .with_context(|| {
            format!(
                "Poids incompatibles avec la configuration ({})",
                cli.model.display()
            )
        })?;

    log::info!(
        "Fenêtre d'analyse : {} échantillons, chunk : {} échantillons, \
         {} trames/fenêtre, inférence toutes les {} trames",
        config.window_len(),
        config.stream_chunk(),
        config.frames_per_window,
        config.trigger_period()
    );

    // 5. Construire le pipeline
    let pipeline = Pipeline::from_weights(&config, &weights)?;

    // 6. Ouvrir la source audio (avant le terminal : les erreurs restent lisibles)
    if cli.is_mic() {
        let source = MicSource::open(config.sample_rate, config.stream_chunk())
            .context("Impossible d'ouvrir le microphone")?;
        drive(&cli, &config, pipeline, source, "mic".into())
    } else {
        let path = Path::new(&cli.audio);
        // Replay en temps réel dans le TUI, au plus vite en headless.
        let source = FileSource::open(path, config.sample_rate, !cli.headless)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or_else(|| cli.audio.clone(), String::from);
        drive(&cli, &config, pipeline, source, name)
    }
}

/// Run the headless or TUI loop until the source ends or the user quits.
fn drive<S: AudioSource, C: Classifier>(
    cli: &cli::Cli,
    config: &PipelineConfig,
    mut pipeline: Pipeline<C>,
    source: S,
    source_name: String,
) -> Result<()> {
    if cli.headless {
        let stop = Arc::new(AtomicBool::new(false));
        let handler_flag = Arc::clone(&stop);
        ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
            .context("Impossible d'installer le gestionnaire Ctrl-C")?;
        app::run_headless(source, &mut pipeline, &stop)?;
        return Ok(());
    }

    // 7. Initialiser le terminal ratatui
    let terminal = ratatui::init();

    // 8. Boucle principale
    let mut app_instance = app::App::new(pipeline, source_name, config.redraw_fps);
    let result = app_instance.run(terminal, source);

    // 9. Restaurer le terminal (TOUJOURS, même en cas d'erreur)
    ratatui::restore();

    result.map(|_| ())
}

/// Load the config file, falling back to defaults when it does not exist.
fn resolve_config(path: &Path) -> Result<PipelineConfig> {
    if path.exists() {
        kw_core::config::load_config(path)
    } else {
        log::warn!("Config introuvable : {}. Utilisation des défauts.", path.display());
        Ok(PipelineConfig::default())
    }
}

fn apply_overrides(config: &mut PipelineConfig, cli: &cli::Cli) {
    if let Some(frames) = cli.frames_per_window {
        config.frames_per_window = frames;
    }
    if let Some(capacity) = cli.display_capacity {
        config.display_capacity = capacity;
    }
}
