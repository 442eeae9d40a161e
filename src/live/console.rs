use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use regex::Regex;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::{Cell, Dashboard, EndedTestRow};

const TICK: Duration = Duration::from_millis(120);

/// A change to the dashboard that the renderer should reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Connection indicator changed (connected, connecting, disconnected).
    Indicator,
    /// Indicator now shows fresh latency figures.
    Latency,
    Status,
    /// Blocking notification raised with this message.
    Alert(String),
    /// A prompt or alert now owns the terminal until `ModalClosed`.
    ModalOpened,
    ModalClosed,
    SessionCleared,
    PackageStarted,
    SuiteStarted,
    TestStarted,
    /// Chunk appended to the test output area.
    TestOutput(String),
    /// Index into `Dashboard::ended_tests`.
    EndedTest(usize),
    MethodMarked(i64),
    Counters,
    GlobalDuration,
    Params,
    SelectedTests,
    LogShown { test_id: i64, found: bool },
    DisconnectDisabled,
    Summary,
}

/// Something that draws the dashboard.
pub trait Renderer {
    fn render(&mut self, update: &Update, dashboard: &Dashboard);

    /// Called once when the session is over.
    fn finish(&mut self, _dashboard: &Dashboard) {}
}

/// Renders the dashboard as scrolling terminal output with a live status line.
///
/// The status line is drawn on stdout. When it is hidden (stdout is not a
/// terminal, or a prompt is open) lines go straight to the output writer.
pub struct ConsoleRenderer {
    status_line: ProgressBar,
    out: Box<dyn Write + Send>,
    live: bool,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::with_output(ProgressDrawTarget::stdout(), Box::new(std::io::stdout()))
    }

    /// Renderer drawing its status line on `target` and plain lines on `out`.
    pub fn with_output(target: ProgressDrawTarget, out: Box<dyn Write + Send>) -> Self {
        let status_line = ProgressBar::with_draw_target(None, target);
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner} {msg}")
        {
            status_line.set_style(style);
        }
        let live = !status_line.is_hidden();
        if live {
            status_line.enable_steady_tick(TICK);
        }
        Self {
            status_line,
            out,
            live,
        }
    }

    fn println(&mut self, line: String) {
        if self.status_line.is_hidden() {
            let _ = writeln!(self.out, "{}", line);
            let _ = self.out.flush();
        } else {
            self.status_line.println(line);
        }
    }

    /// Take the status line off screen so a prompt can own the cursor line.
    fn pause(&mut self) {
        if self.live {
            self.status_line.disable_steady_tick();
            self.status_line.set_draw_target(ProgressDrawTarget::hidden());
        }
    }

    fn resume(&mut self, dashboard: &Dashboard) {
        if self.live {
            self.status_line.set_draw_target(ProgressDrawTarget::stdout());
            self.status_line.enable_steady_tick(TICK);
        }
        self.refresh_status_line(dashboard);
    }

    fn refresh_status_line(&self, dashboard: &Dashboard) {
        let counters = &dashboard.counters;
        let mut msg = format!(
            "{}  {} {} {} {} {}",
            dashboard.indicator.cyan(),
            counters.get("passed").to_string().green(),
            counters.get("failed").to_string().red(),
            counters.get("failed_bug").to_string().magenta(),
            counters.get("skipped").to_string().yellow(),
            format!("/ {}", counters.total()).bold(),
        );
        if !dashboard.global_duration.is_empty() {
            msg.push_str(&format!("  ⏱ {}", dashboard.global_duration));
        }
        self.status_line.set_message(msg);
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, update: &Update, dashboard: &Dashboard) {
        match update {
            Update::Indicator => {
                self.println(format!("{} {}", "●".blue(), dashboard.indicator));
                self.refresh_status_line(dashboard);
            }
            Update::Latency | Update::Counters | Update::GlobalDuration => {
                self.refresh_status_line(dashboard);
            }
            Update::Status => {
                self.println(format!(
                    "{} {} {}",
                    clock().dimmed(),
                    "ℹ".blue(),
                    dashboard.status_message
                ));
            }
            Update::Alert(message) => {
                self.println(format!(
                    "{} {} {}",
                    clock().dimmed(),
                    "⚠ ALERT".red().bold(),
                    message.bold()
                ));
            }
            Update::ModalOpened => self.pause(),
            Update::ModalClosed => self.resume(dashboard),
            Update::SessionCleared => {
                self.println(format!("{}", "── new session ──".dimmed()));
                self.refresh_status_line(dashboard);
            }
            Update::PackageStarted => {
                if let Some(package) = &dashboard.run.package {
                    self.println(format!(
                        "\n{} Package: {} (cycle {})",
                        "▶".green().bold(),
                        package.name.white().bold(),
                        package.cycle
                    ));
                }
            }
            Update::SuiteStarted => {
                if let Some(suite) = &dashboard.run.suite {
                    self.println(format!(
                        "  {} Suite: {} (cycle {})",
                        "→".blue(),
                        suite.name.white().bold(),
                        suite.cycle
                    ));
                }
            }
            Update::TestStarted => {
                if let Some(test) = &dashboard.run.test {
                    let mut line = format!(
                        "    {} {} (cycle {}) meid {} / tid {}",
                        "•".cyan(),
                        test.name,
                        test.cycle,
                        test.method_id,
                        test.test_id
                    );
                    if !test.usecase.is_empty() {
                        line.push_str(&format!(" [{}]", test.usecase.yellow()));
                    }
                    self.println(line);
                    if !test.comment.is_empty() {
                        self.println(format!("      {}", test.comment.dimmed()));
                    }
                }
            }
            Update::TestOutput(chunk) => {
                for line in html_to_text(chunk).lines() {
                    self.println(format!("      {}", line.dimmed()));
                }
                self.println(format!("      {}", "─".repeat(40).dimmed()));
            }
            Update::EndedTest(index) => {
                if let Some(row) = dashboard.ended_tests.get(*index) {
                    self.println(format!("    {}", format_ended_row(row)));
                }
            }
            Update::MethodMarked(_) => {}
            Update::Params => {
                self.println(format!("{}", "Run parameters".bold()));
                for (key, value) in &dashboard.params {
                    self.println(format!("  {:<24} {}", key.cyan(), value));
                }
            }
            Update::SelectedTests => {
                self.println(format!(
                    "{} ({})",
                    "Selected tests".bold(),
                    dashboard.selected_tests.len()
                ));
                for row in &dashboard.selected_tests {
                    self.println(format!("  {}", row.cells.join(" | ")));
                }
            }
            Update::LogShown { test_id, found } => {
                self.println(format!("{}", format!("── log for test {} ──", test_id).bold()));
                if *found {
                    for line in html_to_text(&dashboard.log_viewer).lines() {
                        self.println(format!("  {}", line));
                    }
                } else {
                    self.println(format!("  {}", "(no log captured)".dimmed()));
                }
            }
            Update::DisconnectDisabled => {
                self.println(format!("{} {}", "■".blue().bold(), dashboard.indicator));
            }
            Update::Summary => {
                self.println(summary(dashboard));
            }
        }
    }

    fn finish(&mut self, dashboard: &Dashboard) {
        self.status_line.finish_and_clear();
        let _ = writeln!(self.out, "{}", summary(dashboard));
        let _ = self.out.flush();
    }
}

fn clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn status_colored(text: &str, status_class: &str) -> ColoredString {
    match status_class {
        "passed" => text.green(),
        "failed" => text.red(),
        "failed_bug" => text.magenta(),
        "skipped" => text.yellow(),
        _ => text.white(),
    }
}

fn format_ended_row(row: &EndedTestRow) -> String {
    let cells: Vec<String> = row
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Text(text) => status_colored(text, &row.status_class).to_string(),
            Cell::LogLink { text, test_id } => format!(
                "{} {}",
                status_colored(text, &row.status_class).underline(),
                format!("[log {}]", test_id).dimmed()
            ),
        })
        .collect();
    cells.join(" | ")
}

fn summary(dashboard: &Dashboard) -> String {
    let counters = &dashboard.counters;
    let mut out = format!("\n{} Run summary\n", "■".blue().bold());
    if let Some(package) = &dashboard.run.package {
        out.push_str(&format!("  Package: {} (cycle {})\n", package.name, package.cycle));
    }
    if let Some(suite) = &dashboard.run.suite {
        out.push_str(&format!("  Suite: {} (cycle {})\n", suite.name, suite.cycle));
    }
    if let Some(test) = &dashboard.run.test {
        out.push_str(&format!("  Test: {} (cycle {})\n", test.name, test.cycle));
    }
    out.push_str(&format!("  Total tests: {}\n", counters.total()));
    out.push_str(&format!(
        "  {} passed, {} failed, {} failed (known bug), {} skipped",
        counters.get("passed").to_string().green(),
        counters.get("failed").to_string().red(),
        counters.get("failed_bug").to_string().magenta(),
        counters.get("skipped").to_string().yellow(),
    ));
    for (class, count) in counters.iter() {
        if !super::state::KNOWN_STATUS_CLASSES.contains(&class) {
            out.push_str(&format!(", {} {}", count, class));
        }
    }
    if !dashboard.global_duration.is_empty() {
        out.push_str(&format!("\n  Duration: {}", dashboard.global_duration));
    }
    if let Some(avg) = dashboard.latency.average() {
        out.push_str(&format!("\n  Latency: {}ms average", avg));
    }
    out
}

/// Plain-text rendering of the HTML fragments the reporter sends for test
/// output and logs.
pub fn html_to_text(html: &str) -> String {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static RULES: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    let breaks = BREAKS.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>").unwrap());
    let rules = RULES.get_or_init(|| Regex::new(r"(?i)<hr\s*/?>").unwrap());
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());

    let text = rules.replace_all(html, "\n----\n");
    let text = breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
