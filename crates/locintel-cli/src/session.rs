use anyhow::Result;
use futures::StreamExt;
use tokio::signal;

use crate::prompt::{InputType, Prompt};

use locintel::agent::Agent;
use locintel::models::event::StreamEvent;
use locintel::session::Session;

/// The interactive loop: read a message, stream the reply, render it
pub struct ChatSession<'a> {
    agent: Agent,
    session: Session,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> ChatSession<'a> {
    pub fn new(agent: Agent, session: Session, prompt: Box<dyn Prompt + 'a>) -> Self {
        ChatSession {
            agent,
            session,
            prompt,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Clear => {
                    self.session.clear_results();
                    self.prompt.render_notice("Cleared the map");
                }
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.process(content).await;
                    }
                }
            }
        }

        self.prompt.close();
        Ok(())
    }

    /// Submit one message and render its reply as it streams in.
    /// Ctrl+C stops the reply; whatever arrived so far is kept.
    async fn process(&mut self, content: String) {
        let epoch = self.session.submit(content);
        self.prompt.show_busy();

        let mut reply = Reply::new(epoch);
        let mut stream = self.agent.reply(self.session.conversation().turns());
        let interrupted = loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(event) => reply.handle(&mut self.session, self.prompt.as_mut(), event),
                    None => break false,
                },
                _ = signal::ctrl_c() => break true,
            }
        };
        drop(stream);

        reply.flush(self.prompt.as_mut());
        if !reply.busy_hidden {
            self.prompt.hide_busy();
        }
        self.session.finish();

        if interrupted {
            tracing::info!("reply interrupted");
            self.prompt.render_notice("Interrupted");
        }
    }
}

/// Rendering state of the reply being streamed
struct Reply {
    epoch: u64,
    text: String,
    busy_hidden: bool,
}

impl Reply {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            text: String::new(),
            busy_hidden: false,
        }
    }

    fn handle(&mut self, session: &mut Session, prompt: &mut dyn Prompt, event: StreamEvent) {
        if !self.busy_hidden {
            prompt.hide_busy();
            self.busy_hidden = true;
        }

        match &event {
            StreamEvent::TextDelta { text, .. } => self.text.push_str(text),
            StreamEvent::ToolCallStart {
                tool_name, input, ..
            } => {
                self.flush(prompt);
                prompt.render_tool_request(tool_name, input);
            }
            StreamEvent::ToolCallEnd { call_id, result } => {
                self.flush(prompt);
                let tool_name = tool_name(session, call_id).unwrap_or_else(|| call_id.clone());
                prompt.render_tool_result(&tool_name, result);
            }
        }

        if let Some(change) = session.apply(self.epoch, event) {
            tracing::debug!(features = change.feature_count, "map updated");
        }
    }

    fn flush(&mut self, prompt: &mut dyn Prompt) {
        if !self.text.trim().is_empty() {
            prompt.render_text(&self.text);
        }
        self.text.clear();
    }
}

fn tool_name(session: &Session, call_id: &str) -> Option<String> {
    session
        .conversation()
        .turns()
        .iter()
        .rev()
        .find_map(|turn| turn.tool_call(call_id))
        .map(|call| call.tool_name.clone())
}
