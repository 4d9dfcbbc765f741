use colored::Colorize;

use crate::session::EvalSession;

mod document;
mod settings;
mod system;

/// A parsed terminal command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Exit,
    Settings,
    Set { key: String, value: String },
    Upload(String),
    Ask(String),
    Eval(Option<String>),
    Runs,
}

impl Command {
    /// Anything that is not a known command is a question.
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        let command = match (head.to_lowercase().as_str(), rest) {
            ("help", "") => Command::Help,
            ("exit" | "quit", "") => Command::Exit,
            ("settings", "") => Command::Settings,
            ("runs" | "history", "") => Command::Runs,
            ("set", rest) => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Command::Set {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                }
            }
            ("upload", rest) => Command::Upload(rest.to_string()),
            ("ask", rest) => Command::Ask(rest.to_string()),
            ("eval", "") => Command::Eval(None),
            ("eval", rest) => Command::Eval(Some(rest.to_string())),
            _ => Command::Ask(input.to_string()),
        };
        Some(command)
    }
}

/// What the input loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlow {
    Continue,
    Exit,
}

pub struct CommandHandler {
    session: EvalSession,
}

impl CommandHandler {
    pub fn new(session: EvalSession) -> Self {
        Self { session }
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<CommandFlow, String> {
        let command = match Command::parse(input) {
            Some(command) => command,
            None => return Ok(CommandFlow::Continue),
        };

        let result = match command {
            Command::Help | Command::Exit => return system::handle_command(&command),
            Command::Settings => {
                settings::show(self.session.settings());
                Ok(())
            }
            Command::Set { key, value } => settings::set(&mut self.session, &key, &value),
            Command::Upload(path) => document::upload(&mut self.session, &path).await,
            Command::Ask(question) => document::ask(&mut self.session, &question).await,
            Command::Eval(csv_path) => document::evaluate(&mut self.session, csv_path.as_deref()).await,
            Command::Runs => document::runs(&self.session).await,
        };
        result
            .map(|_| CommandFlow::Continue)
            .map_err(|e| format!("{} {}", "❌".red(), e))
    }
}
