use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub fn info(message: impl Display) {
    println!("{} {}", "→".blue(), message.to_string().blue());
}

pub fn success(message: impl Display) {
    println!("{} {}", "✓".green(), message.to_string().green());
}

pub fn error(message: impl Display) {
    eprintln!("{} {}", "✗".red(), message.to_string().red());
}

/// A titled spinner for one pipeline step.
pub struct Step {
    title: String,
    bar: ProgressBar,
}

impl Step {
    pub fn start(title: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap(),
        );
        bar.set_message(title.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            title: title.to_string(),
            bar,
        }
    }

    /// Print a progress line above the spinner.
    pub fn output(&self, line: &str) {
        self.bar.suspend(|| println!("  {}", line.dimmed()));
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
        println!("{} {}", "✓".green(), self.title);
    }

    pub fn fail(self) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", "✗".red(), self.title.red());
    }
}

/// Run `work` under a spinner titled `title`, marking the outcome.
pub async fn step<T, E, F>(title: &str, work: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let step = Step::start(title);
    let result = work.await;
    match &result {
        Ok(_) => step.finish(),
        Err(_) => step.fail(),
    }
    result
}
