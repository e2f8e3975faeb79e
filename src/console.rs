//! Operator console: one-letter commands read from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `q`: shut everything down
    Quit,
    /// `r`: restart the web server
    Restart,
    /// Any other input: report that the service is running
    Status,
}

pub fn parse_console_command(line: &str) -> ConsoleCommand {
    match line.trim().to_lowercase().as_str() {
        "q" => ConsoleCommand::Quit,
        "r" => ConsoleCommand::Restart,
        _ => ConsoleCommand::Status,
    }
}

/// Forward console commands until stdin closes or `q` is entered
pub async fn run_console(commands: mpsc::Sender<ConsoleCommand>) {
    info!("Console ready: q - quit, r - restart web server");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Console input unavailable");
                break;
            }
        };

        let command = parse_console_command(&line);
        if commands.send(command).await.is_err() || command == ConsoleCommand::Quit {
            break;
        }
    }
    debug!("Console stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_console_command("q"), ConsoleCommand::Quit);
        assert_eq!(parse_console_command(" Q \n"), ConsoleCommand::Quit);
        assert_eq!(parse_console_command("r"), ConsoleCommand::Restart);
        assert_eq!(parse_console_command("status"), ConsoleCommand::Status);
        assert_eq!(parse_console_command(""), ConsoleCommand::Status);
    }
}
