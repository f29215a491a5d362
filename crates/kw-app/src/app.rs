use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use kw_audio::guard::SourceGuard;
use kw_core::traits::{AudioSource, Classifier};
use kw_render::rate::RateMeter;
use kw_render::ui::{self, DrawContext, RenderState};
use ratatui::DefaultTerminal;

use crate::pipeline::Pipeline;

/// Application state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    /// Normal running state.
    Running,
    /// Overlay d'aide affiché (touche ?).
    Help,
    /// Fermeture demandée, la boucle sort au prochain tour.
    Quitting,
}

/// How a drive loop ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The finite source ran out of full chunks.
    Exhausted,
    /// Termination was requested (key press or signal).
    Stopped,
}

/// Terminal front-end: acquires, processes, and redraws on its own cadence.
pub struct App<C: Classifier> {
    pub state: AppState,
    pub pipeline: Pipeline<C>,
    /// Nom de la source audio affiché dans la sidebar.
    pub source_name: String,
    /// Set once a finite source is exhausted; the last heatmap stays on screen.
    pub finished: bool,
    redraw_interval: Duration,
    trigger_rate: RateMeter,
    draw_rate: RateMeter,
}

impl<C: Classifier> App<C> {
    #[must_use]
    pub fn new(pipeline: Pipeline<C>, source_name: String, redraw_fps: u32) -> Self {
        Self {
            state: AppState::Running,
            pipeline,
            source_name,
            finished: false,
            redraw_interval: Duration::from_secs_f64(1.0 / f64::from(redraw_fps.max(1))),
            trigger_rate: RateMeter::new(16),
            draw_rate: RateMeter::new(30),
        }
    }

    /// Boucle principale : un chunk, traitement complet, événements, redessin si dû.
    ///
    /// The source is closed exactly once whatever the exit path.
    ///
    /// # Errors
    /// Returns an error if acquisition or terminal operations fail.
    pub fn run<S: AudioSource>(
        &mut self,
        mut terminal: DefaultTerminal,
        source: S,
    ) -> Result<DriveOutcome> {
        let mut source = SourceGuard::new(source);
        let mut chunk = vec![0i16; self.pipeline.chunk_len()];
        let mut last_draw: Option<Instant> = None;

        loop {
            if self.state == AppState::Quitting {
                break;
            }

            // === Acquisition (seul point bloquant) ===
            if !self.finished {
                if source.read_chunk(&mut chunk).context("Échec de l'acquisition audio")? {
                    for _ in 0..self.pipeline.process_chunk(&chunk) {
                        self.trigger_rate.tick();
                    }
                } else {
                    log::info!("Source audio épuisée");
                    self.finished = true;
                    source.close();
                }
            }

            // === Événements ===
            let until_draw = last_draw.map_or(Duration::ZERO, |t| {
                self.redraw_interval.saturating_sub(t.elapsed())
            });
            // Idle once finished: sleep in poll instead of spinning.
            let mut wait = if self.finished { until_draw } else { Duration::ZERO };
            while event::poll(wait)? {
                self.handle_event(&event::read()?);
                wait = Duration::ZERO;
            }

            // === Redessin ===
            if last_draw.is_none_or(|t| t.elapsed() >= self.redraw_interval) {
                let ctx = DrawContext {
                    labels: self.pipeline.labels(),
                    display: self.pipeline.display(),
                    counters: self.pipeline.counters(),
                    trigger_rate: &self.trigger_rate,
                    draw_rate: &self.draw_rate,
                    source: &self.source_name,
                    state: self.render_state(),
                };
                terminal.draw(|frame| ui::draw(frame, &ctx))?;
                self.draw_rate.tick();
                last_draw = Some(Instant::now());
            }
        }

        source.close();
        Ok(if self.finished {
            DriveOutcome::Exhausted
        } else {
            DriveOutcome::Stopped
        })
    }

    fn render_state(&self) -> RenderState {
        match self.state {
            AppState::Help => RenderState::Help,
            AppState::Running | AppState::Quitting if self.finished => RenderState::Finished,
            AppState::Running | AppState::Quitting => RenderState::Running,
        }
    }

    /// Handle a terminal event.
    fn handle_event(&mut self, event: &Event) {
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = *event
        {
            self.handle_key(code, modifiers);
        }
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        // Le mode raw avale SIGINT : Ctrl-C arrive comme une touche.
        if modifiers.contains(KeyModifiers::CONTROL) {
            if code == KeyCode::Char('c') {
                self.state = AppState::Quitting;
            }
            return;
        }

        match (self.state, code) {
            (AppState::Help, KeyCode::Esc | KeyCode::Char('?')) => self.state = AppState::Running,
            (_, KeyCode::Char('q') | KeyCode::Esc) => self.state = AppState::Quitting,
            (_, KeyCode::Char('?')) => self.state = AppState::Help,
            (_, KeyCode::Char('r')) => self.pipeline.reset_classifier(),
            _ => {}
        }
    }
}

/// Boucle sans interface : journalise la classe dominante à chaque inférence.
///
/// Runs until the source is exhausted or `stop` is raised (checked between
/// chunks). The source is closed exactly once whatever the exit path.
///
/// # Errors
/// Returns the first acquisition error; the stream cannot be realigned after one.
pub fn run_headless<S: AudioSource, C: Classifier>(
    source: S,
    pipeline: &mut Pipeline<C>,
    stop: &AtomicBool,
) -> Result<DriveOutcome> {
    let mut source = SourceGuard::new(source);
    let mut chunk = vec![0i16; pipeline.chunk_len()];

    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            log::info!("Arrêt demandé");
            break DriveOutcome::Stopped;
        }
        if !source.read_chunk(&mut chunk).context("Échec de l'acquisition audio")? {
            log::info!("Source audio épuisée");
            break DriveOutcome::Exhausted;
        }
        if pipeline.process_chunk(&chunk) > 0
            && let Some((class, p)) = ui::top_class(pipeline.display().latest())
        {
            let label = pipeline.labels().get(class).map_or("?", String::as_str);
            log::info!("#{} {label} ({p:.2})", pipeline.counters().triggers);
        }
    };

    source.close();
    let counters = pipeline.counters();
    log::info!(
        "{} chunks, {} trames, {} inférences",
        counters.chunks,
        counters.frames,
        counters.triggers
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::pipeline::tests::{chunk, config, recording_pipeline};

    #[derive(Debug, thiserror::Error)]
    #[error("capture interrompue")]
    struct Interrupted;

    /// Scripted source: `good` chunks, then either exhaustion or an error.
    struct Scripted<'a> {
        good: u32,
        read: u32,
        fail: bool,
        closes: Rc<Cell<u32>>,
        /// Raised after `stop_after` reads when set.
        stop: Option<(&'a AtomicBool, u32)>,
    }

    impl AudioSource for Scripted<'_> {
        type Error = Interrupted;

        fn read_chunk(&mut self, out: &mut [i16]) -> Result<bool, Interrupted> {
            assert_eq!(self.closes.get(), 0, "read after close");
            if self.read == self.good {
                return if self.fail { Err(Interrupted) } else { Ok(false) };
            }
            out.copy_from_slice(&chunk(out.len(), self.read));
            self.read += 1;
            if let Some((flag, after)) = self.stop
                && self.read == after
            {
                flag.store(true, Ordering::Relaxed);
            }
            Ok(true)
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    fn scripted(
        good: u32,
        fail: bool,
        stop: Option<(&AtomicBool, u32)>,
    ) -> (Scripted<'_>, Rc<Cell<u32>>) {
        let closes = Rc::new(Cell::new(0));
        let source = Scripted {
            good,
            read: 0,
            fail,
            closes: Rc::clone(&closes),
            stop,
        };
        (source, closes)
    }

    #[test]
    fn exhausted_source_is_closed_once() {
        let stop = AtomicBool::new(false);
        let mut pipeline = recording_pipeline(&config());
        let (source, closes) = scripted(16, false, None);

        let outcome = run_headless(source, &mut pipeline, &stop).expect("clean run");
        assert_eq!(outcome, DriveOutcome::Exhausted);
        assert_eq!(closes.get(), 1);
        assert_eq!(pipeline.counters().triggers, 14);
    }

    #[test]
    fn stop_mid_stream_closes_once() {
        let stop = AtomicBool::new(false);
        let mut pipeline = recording_pipeline(&config());
        let (source, closes) = scripted(1000, false, Some((&stop, 5)));

        let outcome = run_headless(source, &mut pipeline, &stop).expect("clean run");
        assert_eq!(outcome, DriveOutcome::Stopped);
        assert_eq!(closes.get(), 1);
        assert_eq!(pipeline.counters().chunks, 5);
    }

    #[test]
    fn acquisition_error_is_fatal_and_closes_once() {
        let stop = AtomicBool::new(false);
        let mut pipeline = recording_pipeline(&config());
        let (source, closes) = scripted(3, true, None);

        let err = run_headless(source, &mut pipeline, &stop).expect_err("read failure");
        assert!(format!("{err:#}").contains("capture interrompue"));
        assert_eq!(closes.get(), 1);
        assert_eq!(pipeline.counters().chunks, 3);
    }

    #[test]
    fn keys_drive_the_state_machine() {
        let mut app = App::new(recording_pipeline(&config()), "test".into(), 30);
        app.handle_key(KeyCode::Char('?'), KeyModifiers::NONE);
        assert_eq!(app.state, AppState::Help);
        assert_eq!(app.render_state(), RenderState::Help);

        app.handle_key(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(app.state, AppState::Running);

        app.finished = true;
        assert_eq!(app.render_state(), RenderState::Finished);

        app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.state, AppState::Quitting);
    }

    #[test]
    fn reset_key_clears_classifier_memory() {
        let cfg = config();
        let mut app = App::new(recording_pipeline(&cfg), "test".into(), 30);
        for i in 0..8 {
            app.pipeline.process_chunk(&chunk(app.pipeline.chunk_len(), i));
        }
        assert_eq!(app.pipeline.counters().triggers, 7);
        app.handle_key(KeyCode::Char('r'), KeyModifiers::NONE);
        assert!(app.pipeline.classifier().calls.is_empty());
    }
}
