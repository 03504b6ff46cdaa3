//! Live progress for parallel runs, driven by engine events.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use codeagent_core::executor::EngineEvent;

const SPINNER_TICKS_UTF8: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_TICKS_ASCII: &[&str] = &["|", "/", "-", "\\"];

pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: Mutex<HashMap<String, ProgressBar>>,
    ascii: bool,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(total_tasks: usize, enabled: bool, ascii: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: Mutex::new(HashMap::new()),
                ascii,
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:32} {pos}/{len} tasks {msg}")
                .unwrap()
                .progress_chars(if ascii { "#>-" } else { "█▓░" }),
        );
        overall.set_message("starting");

        Self {
            multi,
            overall,
            task_bars: Mutex::new(HashMap::new()),
            ascii,
            enabled: true,
        }
    }

    pub fn handle(&self, event: &EngineEvent) {
        if !self.enabled {
            return;
        }
        match event {
            EngineEvent::RunStart { total_layers, .. } => {
                self.overall.set_message(format!("{total_layers} layers"));
            }
            EngineEvent::LayerStart { index, .. } => {
                self.overall.set_message(format!("layer {}", index + 1));
            }
            EngineEvent::TaskStarted { task_id } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("  {spinner} {msg}")
                        .unwrap()
                        .tick_strings(if self.ascii {
                            SPINNER_TICKS_ASCII
                        } else {
                            SPINNER_TICKS_UTF8
                        }),
                );
                bar.set_message(task_id.clone());
                bar.enable_steady_tick(Duration::from_millis(100));
                self.task_bars.lock().unwrap().insert(task_id.clone(), bar);
            }
            EngineEvent::TaskFinished { result } => {
                let mark = match (result.exit_code == 0, self.ascii) {
                    (true, true) => "ok",
                    (true, false) => "✓",
                    (false, true) => "FAIL",
                    (false, false) => "✗",
                };
                if let Some(bar) = self.task_bars.lock().unwrap().remove(&result.task_id) {
                    bar.finish_with_message(format!(
                        "{mark} {} ({} ms)",
                        result.task_id, result.duration_ms
                    ));
                }
                self.overall.inc(1);
            }
            EngineEvent::RunEnd { succeeded, failed } => {
                self.overall
                    .finish_with_message(format!("{succeeded} succeeded, {failed} failed"));
            }
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.lock().unwrap().drain() {
            bar.finish_and_clear();
        }
    }
}
