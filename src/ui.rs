use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Resolution of fractional progress bars (hundredths of a percent).
const PROGRESS_SCALE: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    /// Silent-ish UI for library callers and tests: plain stage lines only.
    pub fn plain() -> Self {
        Self::new(UiMode::Plain, false, true)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Percentage progress for a long-running phase.
    ///
    /// Pretty mode draws a bar; plain mode prints `Progress: xx.xx%` lines,
    /// at most one per hundredth of a percent.
    pub fn progress(&self, name: &str) -> ProgressReporter {
        if self.use_pretty() {
            let bar = ProgressBar::new(PROGRESS_SCALE);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{msg} [{bar:30}] {percent}% ({elapsed})")
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message(name.to_string());
            ProgressReporter {
                bar: Some(bar),
                last: None,
            }
        } else {
            ProgressReporter {
                bar: None,
                last: None,
            }
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    last: Option<u64>,
}

impl ProgressReporter {
    /// Report completion in `0.0..=1.0`. Out-of-range values are clamped.
    pub fn set_fraction(&mut self, fraction: f64) {
        let scaled = (fraction.clamp(0.0, 1.0) * PROGRESS_SCALE as f64).round() as u64;
        if self.last == Some(scaled) {
            return;
        }
        self.last = Some(scaled);
        match &self.bar {
            Some(bar) => bar.set_position(scaled),
            None => eprintln!("{}", format_progress(fraction)),
        }
    }

    /// Report `done` of `total` units. Unknown totals fall back to a counter
    /// in the debug log.
    pub fn set_count(&mut self, done: u64, total: u64) {
        if total == 0 {
            log::debug!("progress: {} done", done);
            return;
        }
        self.set_fraction(done as f64 / total as f64);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

pub fn format_progress(fraction: f64) -> String {
    format!("Progress: {:.2}%", fraction.clamp(0.0, 1.0) * 100.0)
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_flag_selects_mode() {
        assert_eq!(Ui::from_args(Some("plain"), true, false).mode, UiMode::Plain);
        assert_eq!(Ui::from_args(Some("pretty"), true, false).mode, UiMode::Pretty);
        assert_eq!(Ui::from_args(None, true, false).mode, UiMode::Auto);
        assert!(!Ui::from_args(Some("pretty"), false, false).use_pretty());
        assert!(!Ui::from_args(Some("auto"), true, true).use_pretty());
    }

    #[test]
    fn progress_is_formatted_as_percentage() {
        assert_eq!(format_progress(0.5), "Progress: 50.00%");
        assert_eq!(format_progress(1.0 / 3.0), "Progress: 33.33%");
        assert_eq!(format_progress(2.0), "Progress: 100.00%");
    }
}
