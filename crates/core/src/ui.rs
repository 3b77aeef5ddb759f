//! Terminal capabilities, interactivity and user-facing messages.

use std::io::{self, BufRead, IsTerminal, Write};

use colored::*;

use crate::types::{MonospaceError, MonospaceResult};

/// Env var forcing non-interactive mode when set to `1`.
pub const NO_INTERACTIVE_ENV: &str = "MONOSPACE_NO_INTERACTIVE";

/// Label colors: vibrant jewel tones, avoiding the red/yellow/green used by
/// status markers.
pub const PALETTE: [Color; 6] = [
    Color::TrueColor {
        r: 147,
        g: 112,
        b: 219,
    },
    Color::TrueColor {
        r: 64,
        g: 224,
        b: 208,
    },
    Color::TrueColor {
        r: 255,
        g: 140,
        b: 0,
    },
    Color::TrueColor {
        r: 199,
        g: 21,
        b: 133,
    },
    Color::TrueColor {
        r: 72,
        g: 209,
        b: 204,
    },
    Color::TrueColor {
        r: 138,
        g: 43,
        b: 226,
    },
];

/// Palette entry for the `index`-th label.
pub fn palette_color(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

/// A consistent color for a project name.
pub fn get_project_color(project_name: &str) -> Color {
    let hash = project_name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    PALETTE[(hash % PALETTE.len() as u64) as usize]
}

/// Terminal capabilities of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    enhanced: bool,
}

impl Terminal {
    /// Detect from stdout and the environment.
    pub fn detect() -> Self {
        let enhanced =
            io::stdout().is_terminal() && !rendering_disabled(|key| std::env::var(key).ok());
        Self { enhanced }
    }

    /// Whether ANSI styling may be used.
    pub fn enhanced(&self) -> bool {
        self.enhanced
    }

    /// Apply the rendering decision to every `colored` call in the process.
    pub fn apply(&self) {
        colored::control::set_override(self.enhanced);
    }
}

/// True when any of `NO_COLOR`, `ACCESSIBLE`, `CI` is truthy or `TERM` is
/// `dumb`.
fn rendering_disabled(var: impl Fn(&str) -> Option<String>) -> bool {
    let truthy = |key: &str| {
        var(key).is_some_and(|v| {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        })
    };
    truthy("NO_COLOR")
        || truthy("ACCESSIBLE")
        || truthy("CI")
        || var("TERM").is_some_and(|t| t == "dumb")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactivity {
    Interactive,
    NonInteractive,
}

impl Interactivity {
    pub fn detect() -> Self {
        let forced = std::env::var(NO_INTERACTIVE_ENV).is_ok_and(|v| v.trim() == "1");
        if forced || !io::stdin().is_terminal() {
            Interactivity::NonInteractive
        } else {
            Interactivity::Interactive
        }
    }

    pub fn is_interactive(self) -> bool {
        self == Interactivity::Interactive
    }
}

/// Asks the user yes/no questions.
pub trait Prompter {
    /// `Ok(true)` to proceed; an `Aborted` error when the user declines or
    /// nobody can answer.
    fn confirm(&mut self, question: &str) -> MonospaceResult<bool>;
}

/// Prompts on stderr and reads the answer from stdin.
pub struct StdinPrompter {
    mode: Interactivity,
}

impl StdinPrompter {
    pub fn new(mode: Interactivity) -> Self {
        Self { mode }
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&mut self, question: &str) -> MonospaceResult<bool> {
        if !self.mode.is_interactive() {
            return Err(MonospaceError::Aborted);
        }
        let mut stderr = io::stderr();
        write!(stderr, "{} {} ", question.bold(), "[y/N]".bright_black())?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(true),
            _ => Err(MonospaceError::Aborted),
        }
    }
}

/// Answers every question the same way.
pub struct FixedPrompter(pub bool);

impl Prompter for FixedPrompter {
    fn confirm(&mut self, _question: &str) -> MonospaceResult<bool> {
        if self.0 {
            Ok(true)
        } else {
            Err(MonospaceError::Aborted)
        }
    }
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("{} {}", "Error:".red().bold(), message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message.as_ref());
}

pub fn success(message: impl AsRef<str>) {
    eprintln!("{} {}", "✔".green().bold(), message.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn disabled(vars: &[(&str, &str)]) -> bool {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        rendering_disabled(|key| vars.get(key).cloned())
    }

    #[test]
    fn rendering_env_rules() {
        assert!(!disabled(&[]));
        assert!(disabled(&[("NO_COLOR", "1")]));
        assert!(disabled(&[("CI", "true")]));
        assert!(!disabled(&[("CI", "false")]));
        assert!(!disabled(&[("ACCESSIBLE", "0")]));
        assert!(disabled(&[("TERM", "dumb")]));
        assert!(!disabled(&[("TERM", "xterm-256color")]));
    }

    #[test]
    fn project_colors_are_stable() {
        assert_eq!(get_project_color("apps/web"), get_project_color("apps/web"));
        assert_eq!(palette_color(0), palette_color(PALETTE.len()));
    }

    #[test]
    fn fixed_prompter() {
        assert!(FixedPrompter(true).confirm("go?").unwrap());
        assert!(matches!(
            FixedPrompter(false).confirm("go?"),
            Err(MonospaceError::Aborted)
        ));
    }

    #[test]
    fn non_interactive_prompts_abort() {
        let mut prompter = StdinPrompter::new(Interactivity::NonInteractive);
        assert!(matches!(prompter.confirm("go?"), Err(MonospaceError::Aborted)));
    }
}
