use anyhow::Result;
use serde_json::Value;

pub mod cliclack;

pub trait Prompt {
    /// A finished block of assistant text
    fn render_text(&mut self, text: &str);
    fn render_tool_request(&mut self, tool_name: &str, input: &Value);
    fn render_tool_result(&mut self, tool_name: &str, result: &Result<Value, String>);
    fn render_notice(&mut self, notice: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn ready(&self) {
        println!("\n");
        println!("locintel is running! Ask about places, for example \"parks in south Delhi\".");
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Clear,    // User wants the map cleared
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
