//! Saída de terminal do subcomando `process`: spinner e resultado colorido.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::JobResult;

/// Spinner exibido enquanto um desenho é processado.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    pub fn start(filename: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Processing {filename}..."));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow().bold(),
        }
    }

    /// Para o spinner, imprime um resumo colorido e depois o resultado em JSON.
    pub fn complete(&self, result: &JobResult) {
        self.pb.finish_and_clear();
        println!("  {}", self.headline(result));
        println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
    }

    fn headline(&self, result: &JobResult) -> String {
        match result {
            JobResult::Success {
                detection_count,
                download_url,
                ..
            } => format!(
                "{} {detection_count} objects detected, model at {download_url}",
                self.green.apply_to("✓")
            ),
            JobResult::Paused { reason, message, .. } => {
                format!("{} Paused ({reason}): {message}", self.yellow.apply_to("⏸"))
            }
            JobResult::Error { message } | JobResult::Busy { message } => {
                format!("{} {message}", self.red.apply_to("✗"))
            }
        }
    }
}
