use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use updraft_engine::{LogLevel, Logger};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

impl OutputStyle {
    /// Rich output needs a terminal and no `NO_COLOR` in the environment.
    pub(crate) fn detect(is_terminal: bool, env: &BTreeMap<String, String>) -> Self {
        if is_terminal && !env.contains_key("NO_COLOR") {
            Self::Rich
        } else {
            Self::Plain
        }
    }
}

struct TerminalProgress {
    label: String,
    total: u64,
    progress_bar: ProgressBar,
    started_at: Instant,
}

/// Prints update output: info to stdout, warnings and errors to stderr.
pub(crate) struct TerminalLogger {
    style: OutputStyle,
    verbose: bool,
    progress: RefCell<Option<TerminalProgress>>,
}

impl TerminalLogger {
    pub(crate) fn new(style: OutputStyle, verbose: bool) -> Self {
        Self {
            style,
            verbose,
            progress: RefCell::new(None),
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(progress) = self.progress.borrow_mut().take() {
            progress.progress_bar.finish_and_clear();
        }
    }

    fn emit(&self, level: LogLevel, line: &str) {
        let print = || {
            if level >= LogLevel::Warn {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        };
        match self.progress.borrow().as_ref() {
            Some(progress) => progress.progress_bar.suspend(print),
            None => print(),
        }
    }

    fn start_progress(&self, label: &str, total: u64) -> TerminalProgress {
        let progress_bar = ProgressBar::new(total.max(1));
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
        ) {
            progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
        }
        progress_bar.set_message(label.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        TerminalProgress {
            label: label.to_string(),
            total,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl Logger for TerminalLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if let Some(line) = render_log_line(self.style, level, message, self.verbose) {
            self.emit(level, &line);
        }
    }

    fn progress(&self, label: &str, current: u64, total: u64) {
        if self.style == OutputStyle::Plain {
            return;
        }

        let mut slot = self.progress.borrow_mut();
        let restart = slot
            .as_ref()
            .map_or(true, |progress| progress.label != label || progress.total != total);
        if restart {
            if let Some(previous) = slot.take() {
                previous.progress_bar.finish_and_clear();
            }
            *slot = Some(self.start_progress(label, total));
        }

        let Some(progress) = slot.as_ref() else {
            return;
        };
        progress.progress_bar.set_position(current.min(total.max(1)));

        if current >= total {
            let elapsed = progress.started_at.elapsed();
            progress.progress_bar.finish_and_clear();
            *slot = None;
            if let Some(line) = render_progress_line(self.style, label, current, total, Some(elapsed))
            {
                println!("{line}");
            }
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    match status {
        "ok" => "OK".to_string(),
        "warn" => "WARN".to_string(),
        "error" => "ERR".to_string(),
        "fatal" => "FATAL".to_string(),
        "step" => "..".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// `None` for debug output outside verbose mode.
pub(crate) fn render_log_line(
    style: OutputStyle,
    level: LogLevel,
    message: &str,
    verbose: bool,
) -> Option<String> {
    match level {
        LogLevel::Debug if !verbose => None,
        LogLevel::Debug | LogLevel::Info => Some(message.to_string()),
        LogLevel::Warn | LogLevel::Error | LogLevel::Fatal => {
            let line = render_status_line(style, level.as_str(), message);
            Some(match style {
                OutputStyle::Plain => line,
                OutputStyle::Rich => colorize(level_style(level), &line),
            })
        }
    }
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Warn => Style::new().fg_color(Some(AnsiColor::Yellow.into())),
        LogLevel::Fatal => Style::new()
            .fg_color(Some(AnsiColor::BrightRed.into()))
            .effects(Effects::BOLD),
        _ => Style::new().fg_color(Some(AnsiColor::Red.into())),
    }
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!("{}/{}", HumanCount(current), HumanCount(total));
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}
