use async_trait::async_trait;
use colored::Colorize;
use std::future;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Modal interaction with the user. The session waits on these, so no other
/// event is handled until they return.
#[async_trait]
pub trait Prompter: Send {
    /// Ask for a value pre-filled with `default_value`. `None` means cancelled.
    async fn prompt(&mut self, message: &str, default_value: &str) -> Option<String>;

    /// Show a notification and wait until the user dismisses it.
    async fn alert(&mut self, message: &str);
}

/// Line-oriented terminal input shared by commands and modal prompts.
pub struct Terminal {
    lines: mpsc::UnboundedReceiver<String>,
    interactive: bool,
    closed: bool,
}

impl Terminal {
    pub fn new(lines: mpsc::UnboundedReceiver<String>, interactive: bool) -> Self {
        Self {
            lines,
            interactive,
            closed: false,
        }
    }

    /// Read stdin lines on a background task.
    pub fn stdin(interactive: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self::new(rx, interactive)
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    async fn read_line(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        let line = self.lines.recv().await;
        if line.is_none() {
            self.closed = true;
        }
        line
    }

    /// Next command line. Never completes once input is closed.
    pub async fn next_command(&mut self) -> String {
        match self.read_line().await {
            Some(line) => line,
            None => future::pending().await,
        }
    }
}

#[async_trait]
impl Prompter for Terminal {
    async fn prompt(&mut self, message: &str, default_value: &str) -> Option<String> {
        if !self.interactive {
            return Some(default_value.to_string());
        }
        print!(
            "{} {} [{}]: ",
            "?".yellow().bold(),
            message.bold(),
            default_value.dimmed()
        );
        let _ = std::io::stdout().flush();

        let line = self.read_line().await?;
        let answer = line.trim();
        if answer.is_empty() {
            Some(default_value.to_string())
        } else {
            Some(answer.to_string())
        }
    }

    async fn alert(&mut self, message: &str) {
        if !self.interactive {
            return;
        }
        print!(
            "{} {} {}",
            "⚠".red().bold(),
            message.bold(),
            "(press Enter)".dimmed()
        );
        let _ = std::io::stdout().flush();
        let _ = self.read_line().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_interactive_answers_default() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut terminal = Terminal::new(rx, false);
        assert_eq!(
            terminal.prompt("Environment?", "qa").await,
            Some("qa".to_string())
        );
        terminal.alert("heads up").await;
    }

    #[tokio::test]
    async fn test_interactive_reads_answer_or_default() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut terminal = Terminal::new(rx, true);
        tx.send("  prod ".to_string()).unwrap();
        tx.send(String::new()).unwrap();

        assert_eq!(terminal.prompt("Env?", "qa").await, Some("prod".to_string()));
        assert_eq!(terminal.prompt("Env?", "qa").await, Some("qa".to_string()));

        drop(tx);
        assert_eq!(terminal.prompt("Env?", "qa").await, None);
    }

    #[tokio::test]
    async fn test_commands_stop_after_input_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut terminal = Terminal::new(rx, true);
        tx.send("log 7".to_string()).unwrap();
        drop(tx);

        assert_eq!(terminal.next_command().await, "log 7");
        let next = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            terminal.next_command(),
        )
        .await;
        assert!(next.is_err());
    }
}
