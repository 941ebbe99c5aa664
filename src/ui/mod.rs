//! Terminal output: result listing, headers, spinner and the interactive
//! selector.

use owo_colors::OwoColorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::time::Duration;

use crate::models::{SearchResult, SourceType};

/// Get the current terminal width.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(100)
}

/// Check if stdin is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// A `:: message` header line
pub fn header(msg: &str) -> String {
    format!("{} {}", "::".blue().bold(), msg.bold())
}

/// Truncate text to fit within the specified width using unicode-aware truncation.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width <= 3 {
        return "...".to_string();
    }

    let char_widths: Vec<(char, usize)> = text
        .chars()
        .map(|c| (c, unicode_width::UnicodeWidthChar::width(c).unwrap_or(1)))
        .collect();

    let total_width: usize = char_widths.iter().map(|(_, w)| *w).sum();
    if total_width <= max_width {
        return text.to_string();
    }

    // Longest prefix that fits with the ellipsis
    let mut current_width = 0;
    let mut end_idx = 0;
    for (i, (_, w)) in char_widths.iter().enumerate() {
        if current_width + w > max_width - 3 {
            break;
        }
        current_width += w;
        end_idx = i + 1;
    }

    let truncated: String = char_widths[..end_idx].iter().map(|(c, _)| *c).collect();
    format!("{}...", truncated)
}

fn display_width(text: &str) -> usize {
    unicode_width::UnicodeWidthStr::width(text)
}

/// Three-line listing of a result.
///
/// ```text
/// <prefix>Title [Crossref]
///         Jane Doe and John Smith (2020)
///         Publisher, 10.1000/xyz123
/// ```
pub fn itemize(result: &SearchResult, prefix: &str, width: usize) -> String {
    let indent = " ".repeat(display_width(prefix));
    let tag = format!("[{}]", result.source.name());
    let room = width.saturating_sub(display_width(prefix));

    let title = truncate_with_ellipsis(&result.title, room.saturating_sub(tag.len() + 1));
    let first = format!("{}{} {}", prefix, title, tag);
    let mut out = match result.source {
        SourceType::CrossRef => first.yellow().bold().to_string(),
        SourceType::Arxiv => first.red().bold().to_string(),
    };

    let mut second = result.author_string();
    if let Some(year) = &result.year {
        if second.is_empty() {
            second = year.clone();
        } else {
            second.push_str(&format!(" ({})", year));
        }
    }
    if !second.is_empty() {
        out.push_str(&format!("\n{}{}", indent, truncate_with_ellipsis(&second, room)));
    }

    let mut third: Vec<String> = Vec::new();
    match result.source {
        SourceType::CrossRef => {
            if let Some(publisher) = &result.publisher {
                third.push(publisher.clone());
            }
        }
        SourceType::Arxiv => {
            if let Some(id) = &result.arxiv_id {
                match result.category() {
                    Some(cat) => third.push(format!("{} [{}]", id, cat)),
                    None => third.push(id.clone()),
                }
            }
        }
    }
    if let Some(doi) = &result.doi {
        third.push(doi.clone());
    }
    if !third.is_empty() {
        out.push_str(&format!("\n{}{}", indent, truncate_with_ellipsis(&third.join(", "), room)));
    }

    out
}

/// Numbered listing of all results, numbers right-aligned
pub fn list_results(results: &[SearchResult], width: usize) -> String {
    let digits = results.len().to_string().len();
    results
        .iter()
        .enumerate()
        .map(|(i, r)| itemize(r, &format!("  {:>digits$}. ", i + 1, digits = digits), width))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Loading spinner on standard error; hidden when that is not a terminal.
pub struct Spinner {
    pb: indicatif::ProgressBar,
}

impl Spinner {
    /// Create a new spinner with the given message.
    pub fn new(msg: &str) -> Self {
        let pb = indicatif::ProgressBar::new_spinner();
        let style = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
        pb.set_style(style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self { pb }
    }

    /// Remove the spinner line.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Outcome of the interactive selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into the displayed results
    Selected(usize),
    /// The operator asked to enter the entry by hand
    Manual,
    Quit,
}

/// Open `path` with the platform's default viewer
pub fn open_pdf(path: &Path) -> io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(windows) {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        std::process::Command::new("xdg-open")
    };
    command.arg(path);
    spawn_detached(command)
}

/// Start `command` without its output reaching the prompt; a background
/// thread reaps it when it exits.
fn spawn_detached(mut command: std::process::Command) -> io::Result<()> {
    let mut child = command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    std::thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => tracing::debug!("Viewer exited with {}", status),
        Ok(_) => {}
        Err(e) => tracing::debug!("Could not wait for viewer: {}", e),
    });
    Ok(())
}

/// Two-stage prompt over the ranked results.
///
/// Stage one offers the best result; declining lists every result and
/// accepts a number, `s` (first lines of the PDF), `o` (open the PDF),
/// `m` (manual entry), `?` or `q`. Invalid input re-prompts; end of input
/// quits.
pub struct Selector<'a, R, W> {
    input: R,
    output: W,
    results: &'a [SearchResult],
    pdf: Option<&'a Path>,
    show_first_lines: usize,
    width: usize,
}

impl<'a, R: BufRead, W: Write> Selector<'a, R, W> {
    pub fn new(input: R, output: W, results: &'a [SearchResult]) -> Self {
        Self {
            input,
            output,
            results,
            pdf: None,
            show_first_lines: 10,
            width: 100,
        }
    }

    /// The PDF behind `s` and `o`; without one those commands are unavailable
    pub fn pdf(mut self, pdf: Option<&'a Path>) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn show_first_lines(mut self, lines: usize) -> Self {
        self.show_first_lines = lines;
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn run(&mut self) -> io::Result<Selection> {
        if self.results.is_empty() {
            return Ok(Selection::Quit);
        }

        writeln!(self.output, "{}", header("Best query result:"))?;
        writeln!(self.output, "{}", itemize(&self.results[0], "  - ", self.width))?;

        loop {
            let response = self.prompt("Accept? [Y/n/?/q] ", |r| ["", "y", "n", "?", "q"].contains(&r))?;
            match response.as_str() {
                "" | "y" => return Ok(Selection::Selected(0)),
                "q" => return Ok(Selection::Quit),
                "?" => {
                    writeln!(self.output, "  y  yes  (default)")?;
                    writeln!(self.output, "  n  no")?;
                    writeln!(self.output, "  ?  help")?;
                    writeln!(self.output, "  q  quit")?;
                }
                _ => return self.choose(),
            }
        }
    }

    fn choose(&mut self) -> io::Result<Selection> {
        let count = self.results.len();
        writeln!(self.output, "{}", header("All query results:"))?;
        writeln!(self.output, "{}", list_results(self.results, self.width))?;

        let prompt = format!("Select a result: [1-{}/s/o/m/?/q] ", count);
        loop {
            let response = self.prompt(&prompt, |r| {
                ["", "s", "o", "m", "?", "q"].contains(&r)
                    || r.parse::<usize>().is_ok_and(|n| (1..=count).contains(&n))
            })?;

            match response.as_str() {
                "" => return Ok(Selection::Selected(0)),
                "q" => return Ok(Selection::Quit),
                "m" => return Ok(Selection::Manual),
                "s" => self.show_lines()?,
                "o" => self.open()?,
                "?" => {
                    let numbers = format!("1-{}", count);
                    let pad = " ".repeat(numbers.len() - 1);
                    writeln!(self.output, "  {}  entry to select (default: 1)", numbers)?;
                    writeln!(self.output, "{}  s  show first lines of PDF", pad)?;
                    writeln!(self.output, "{}  o  open PDF", pad)?;
                    writeln!(self.output, "{}  m  manual entry", pad)?;
                    writeln!(self.output, "{}  ?  help", pad)?;
                    writeln!(self.output, "{}  q  quit", pad)?;
                }
                number => {
                    if let Ok(n) = number.parse::<usize>() {
                        return Ok(Selection::Selected(n - 1));
                    }
                }
            }
        }
    }

    fn show_lines(&mut self) -> io::Result<()> {
        let Some(path) = self.pdf else {
            return writeln!(self.output, "Not supported with --query.");
        };
        match crate::pdf::first_lines(path, self.show_first_lines) {
            Ok(lines) => {
                for line in lines {
                    writeln!(self.output, "  {}", line)?;
                }
                Ok(())
            }
            Err(e) => writeln!(self.output, "{}", e),
        }
    }

    fn open(&mut self) -> io::Result<()> {
        let Some(path) = self.pdf else {
            return writeln!(self.output, "Not supported with --query.");
        };
        if let Err(e) = open_pdf(path) {
            tracing::warn!("Could not open {}: {}", path.display(), e);
        }
        Ok(())
    }

    /// Read lines until one satisfies `valid`; end of input reads as `q`
    fn prompt(&mut self, prompt: &str, valid: impl Fn(&str) -> bool) -> io::Result<String> {
        loop {
            write!(self.output, "{}", header(prompt))?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok("q".to_string());
            }
            let response = line.trim().to_lowercase();
            if valid(&response) {
                return Ok(response);
            }
        }
    }
}
