use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use console::style;
use locintel::models::geo::GeocodeResponse;
use serde_json::Value;

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    spinner: cliclack::ProgressBar,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: spinner(),
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn print_tool_request(content: &str, theme: &str, tool_name: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name(format!("Tool Request: {}", tool_name)))
        .theme(theme)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(err) = printed {
        tracing::warn!(error = %err, "could not render tool request");
    }
}

fn print_tool_response(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name("Tool Response:"))
        .theme(theme)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(err) = printed {
        tracing::warn!(error = %err, "could not render tool response");
    }
}

fn print(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(err) = printed {
        tracing::warn!(error = %err, "could not render text");
    }
}

fn flush() {
    if let Err(err) = io::stdout().flush() {
        tracing::warn!(error = %err, "could not flush stdout");
    }
}

/// One line summary of a geocode search result
fn search_summary(output: &Value) -> Option<String> {
    match serde_json::from_value::<GeocodeResponse>(output.clone()).ok()? {
        GeocodeResponse::Success { query, features } => Some(match features.len() {
            0 => format!("No places found for \"{}\"", query),
            1 => format!("Found 1 place for \"{}\"", query),
            n => format!("Found {} places for \"{}\"", n, query),
        }),
        GeocodeResponse::Failure { reason } => Some(reason),
    }
}

/// Map a trimmed line of user input to what it asks for
fn parse_input(text: &str) -> Command {
    match text.to_ascii_lowercase().as_str() {
        "" => Command::Nothing,
        "/exit" | "/quit" => Command::Exit,
        "/clear" => Command::Clear,
        "/m" => Command::Multiline,
        "/s" => Command::Singleline,
        "/t" => Command::ToggleTheme,
        "/?" => Command::Help,
        _ => Command::Message,
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Nothing,
    Exit,
    Clear,
    Multiline,
    Singleline,
    ToggleTheme,
    Help,
    Message,
}

impl Prompt for CliclackPrompt {
    fn render_text(&mut self, text: &str) {
        print(text, self.theme_name());
        println!();
        flush();
    }

    fn render_tool_request(&mut self, tool_name: &str, input: &Value) {
        let content = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
        print_tool_request(&content, self.theme_name(), tool_name);
        flush();
    }

    fn render_tool_result(&mut self, tool_name: &str, result: &Result<Value, String>) {
        match result {
            Ok(output) => match search_summary(output) {
                Some(summary) => println!("{} {}", style("✔").green(), summary),
                None => {
                    let content = serde_json::to_string_pretty(output)
                        .unwrap_or_else(|_| output.to_string());
                    print_tool_response(&content, self.theme_name());
                }
            },
            Err(reason) => println!(
                "{} {}: {}",
                style("✖").red(),
                style(tool_name).bold(),
                reason
            ),
        }
        flush();
    }

    fn render_notice(&mut self, notice: &str) {
        println!("{}", style(notice).dim());
        flush();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("awaiting reply");
    }

    fn hide_busy(&mut self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("Ask locintel:         [Help: /?]").placeholder("");
        if let InputMode::Multiline = self.input_mode {
            input = input.multiline();
        }
        let message_text: String = input.interact()?;
        let message_text = message_text.trim();

        let input_type = match parse_input(message_text) {
            Command::Exit => InputType::Exit,
            Command::Clear => InputType::Clear,
            Command::Message => {
                return Ok(Input {
                    input_type: InputType::Message,
                    content: Some(message_text.to_string()),
                })
            }
            Command::Nothing => InputType::AskAgain,
            Command::Multiline => {
                self.input_mode = InputMode::Multiline;
                InputType::AskAgain
            }
            Command::Singleline => {
                self.input_mode = InputMode::Singleline;
                InputType::AskAgain
            }
            Command::ToggleTheme => {
                self.theme = match self.theme {
                    Theme::Light => {
                        println!("Switching to Dark theme");
                        Theme::Dark
                    }
                    Theme::Dark => {
                        println!("Switching to Light theme");
                        Theme::Light
                    }
                };
                InputType::AskAgain
            }
            Command::Help => {
                println!("Commands:");
                println!("/clear - Remove the current results from the map");
                println!("/exit - Exit the session");
                println!("/m - Switch to multiline input mode");
                println!("/s - Switch to singleline input mode");
                println!("/t - Toggle Light/Dark theme");
                println!("/? - Display this help message");
                println!("Ctrl+C - Stop the reply in progress");
                InputType::AskAgain
            }
        };

        Ok(Input {
            input_type,
            content: None,
        })
    }

    fn close(&self) {
        // No cleanup required
    }
}
