use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use importer_core::{
    update, validate_upload, AppState, ImporterError, Msg, OperationPhase, Section, Tab, UploadFile,
};
use importer_engine::EngineHandle;
use importer_logging::{importer_info, importer_warn};

use super::config::AppConfig;
use super::effects::EffectRunner;
use super::render::{health_line, ticket_lines, Renderer};

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Drives the core state machine from the terminal.
pub struct App {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
    last_tick: Instant,
    health_timeout: Duration,
}

impl App {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let engine = EngineHandle::new(config.service_settings(), config.poll_interval())
            .context("failed to start the engine")?;
        Ok(Self {
            state: AppState::with_settings(config.core_settings()),
            runner: EffectRunner::new(engine, config.ticket_browse_base.clone()),
            renderer: Renderer::new(),
            last_tick: Instant::now(),
            health_timeout: Duration::from_millis(config.request_timeout_ms) + PUMP_INTERVAL,
        })
    }

    pub fn upload(&mut self, path: &Path, assume_yes: bool) -> anyhow::Result<ExitCode> {
        let file = match read_upload(path, self.state.settings().max_upload_bytes)? {
            Ok(file) => file,
            Err(err) => {
                importer_warn!("not uploading {}: {}", path.display(), err);
                println!("! {err}");
                return Ok(ExitCode::FAILURE);
            }
        };

        self.dispatch(Msg::FileSubmitted(file));
        self.pump_while(|state| state.view().uploading);
        if self.state.section() != Section::Preview {
            return Ok(ExitCode::FAILURE);
        }

        let rows = self
            .state
            .preview()
            .map(|preview| preview.total_rows())
            .unwrap_or_default();
        if !assume_yes && !confirm(&format!("Create {rows} tickets?"))? {
            self.dispatch(Msg::ResetClicked);
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }

        self.dispatch(Msg::CreateTicketsClicked);
        self.pump_while(|state| {
            matches!(
                state.orchestrator().phase(),
                OperationPhase::Starting | OperationPhase::Polling
            )
        });

        let phase = self.state.orchestrator().phase();
        importer_info!("upload finished in phase {:?}", phase);
        let clean =
            phase == OperationPhase::Completed && self.state.orchestrator().tally().failed == 0;
        Ok(if clean {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    pub fn lookup(&mut self, key: &str) -> anyhow::Result<ExitCode> {
        self.dispatch(Msg::TabSelected(Tab::View));
        self.dispatch(Msg::LookupRequested(key.to_string()));
        self.pump_while(|state| state.view().lookup.loading);

        match self.state.view().lookup.ticket {
            Some(ticket) => {
                ticket_lines(&ticket).iter().for_each(|line| println!("{line}"));
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::FAILURE),
        }
    }

    pub fn health(&mut self) -> anyhow::Result<ExitCode> {
        match self.runner.check_health(self.health_timeout) {
            Some(Ok(report)) => {
                println!("{}", health_line(&report));
                Ok(if report.is_healthy() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }
            Some(Err(err)) => {
                println!("! {}", err.user_message("Health check failed"));
                Ok(ExitCode::FAILURE)
            }
            None => bail!("no answer from the health check"),
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        self.runner.enqueue(effects);
        if state.consume_dirty() {
            for line in self.renderer.render(&state.view()) {
                println!("{line}");
            }
        }
        self.state = state;
    }

    /// Feeds engine events and clock ticks into the core while `busy` holds.
    fn pump_while(&mut self, busy: impl Fn(&AppState) -> bool) {
        while busy(&self.state) {
            if let Some(msg) = self.runner.next_msg(PUMP_INTERVAL) {
                self.dispatch(msg);
            }
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_tick);
            self.last_tick = now;
            self.dispatch(Msg::Tick { elapsed });
        }
    }
}

/// Reads the file only once its name and on-disk size pass local validation.
fn read_upload(
    path: &Path,
    max_bytes: u64,
) -> anyhow::Result<Result<UploadFile, ImporterError>> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let size = fs::metadata(path)
        .with_context(|| format!("failed to inspect {}", path.display()))?
        .len();
    if let Err(err) = validate_upload(&name, size, max_bytes) {
        return Ok(Err(err));
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Ok(UploadFile::new(name, bytes)))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
