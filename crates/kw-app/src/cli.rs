use std::path::PathBuf;

use clap::Parser;

/// kwspot — Détection de mots-clés en temps réel, probabilités affichées dans le terminal.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Poids du modèle (JSON exporté).
    #[arg(short, long, default_value = "model/weights.json")]
    pub model: PathBuf,

    /// Source audio : "mic" pour le microphone, ou chemin vers un fichier audio.
    #[arg(long, default_value = "mic")]
    pub audio: String,

    /// Pas d'interface : journalise chaque inférence (Ctrl-C pour arrêter).
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Trames MFCC par fenêtre d'analyse (remplace [stft] frames_per_window).
    #[arg(long)]
    pub frames_per_window: Option<usize>,

    /// Vecteurs de probabilités conservés à l'écran (remplace [display] capacity).
    #[arg(long)]
    pub display_capacity: Option<usize>,

    /// Niveau de log : error, warn, info, debug, trace. Défaut : warn, info en --headless.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Whether `--audio` designates the live microphone.
    #[must_use]
    pub fn is_mic(&self) -> bool {
        matches!(self.audio.as_str(), "mic" | "default" | "microphone")
    }

    /// Effective log level; the TUI owns the terminal, so it stays quieter by default.
    #[must_use]
    pub fn log_filter(&self) -> log::LevelFilter {
        let fallback = if self.headless {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        };
        self.log_level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_microphone() {
        let cli = Cli::parse_from(["kwspot"]);
        assert!(cli.is_mic());
        assert!(!cli.headless);
        assert_eq!(cli.log_filter(), log::LevelFilter::Warn);
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = Cli::parse_from([
            "kwspot",
            "--audio",
            "clip.wav",
            "--headless",
            "--frames-per-window",
            "5",
            "--display-capacity",
            "60",
        ]);
        assert!(!cli.is_mic());
        assert_eq!(cli.frames_per_window, Some(5));
        assert_eq!(cli.display_capacity, Some(60));
        assert_eq!(cli.log_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn explicit_log_level_wins() {
        let cli = Cli::parse_from(["kwspot", "--headless", "--log-level", "debug"]);
        assert_eq!(cli.log_filter(), log::LevelFilter::Debug);
    }
}
