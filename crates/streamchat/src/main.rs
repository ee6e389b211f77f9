//! An interactive terminal client for a streamchat backend.

#[macro_use]
extern crate tracing;

use std::env;
use std::fmt::Display;
use std::io::{BufRead as _, Write as _};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use streamchat::command::{Command, HELP};
use streamchat::core::model::{ConversationId, Role};
use streamchat::core::{
    ERROR_NOTICE, SendOutcome, TurnEvent, TurnEventKind, TurnState, Workspace,
};
use streamchat::view::{self, BAR_CHAR};
use streamchat_http_backend::{HttpBackend, HttpBackendConfigBuilder};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const API_URL_ENV: &str = "STREAMCHAT_API_URL";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = HttpBackendConfigBuilder::new();
    if let Ok(base_url) = env::var(API_URL_ENV) {
        config = config.with_base_url(base_url);
    }
    let config = config.build();
    info!("using backend at {}", config.base_url());

    let (workspace, mut turn_events) =
        Workspace::new(HttpBackend::new(config));
    let mut app = App::new(workspace);
    let mut lines = spawn_line_reader();

    if let Err(err) = app.workspace.refresh().await {
        print_error("Failed to load conversations", err);
    }
    print!("{}", view::render_sidebar(&app.workspace));
    println!("{}", "Type /help for a list of commands.".dimmed());
    app.prompt();

    loop {
        let tick = sleep(Duration::from_millis(100));
        select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                if !app.handle_line(&line).await {
                    break;
                }
            }
            event = turn_events.recv() => {
                let Some(event) = event else {
                    break;
                };
                app.handle_turn_event(event);
            }
            _ = tick, if app.spinner.is_some() => {
                app.tick();
            }
        }
    }

    app.stop_spinner();
}

struct App {
    workspace: Workspace,
    progress_style: ProgressStyle,
    spinner: Option<ProgressBar>,
    /// The conversation whose reply is being printed as it arrives.
    printing: Option<ConversationId>,
}

impl App {
    fn new(workspace: Workspace) -> Self {
        let progress_style =
            ProgressStyle::with_template("{spinner} {wide_msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self {
            workspace,
            progress_style,
            spinner: None,
            printing: None,
        }
    }

    /// Handles a line of input, returning `false` to quit.
    async fn handle_line(&mut self, line: &str) -> bool {
        self.interrupt_reply();

        if self.workspace.pending_delete().is_some() {
            self.answer_delete(line);
            self.prompt();
            return true;
        }

        match Command::parse(line) {
            Command::New => match self.workspace.create_conversation().await {
                Ok(_) => self.show(),
                Err(err) => {
                    print_error("Failed to create a conversation", err)
                }
            },
            Command::List => {
                print!("{}", view::render_sidebar(&self.workspace))
            }
            Command::Open(position) => {
                match self.conversation_at(position) {
                    Some(id) => {
                        self.workspace.select(&id);
                        self.show();
                    }
                    None => print_hint(format!("No conversation {position}.")),
                }
            }
            Command::Delete(position) => {
                match self.conversation_at(position) {
                    Some(id) => {
                        self.workspace.request_delete(&id);
                        if let Some(conversation) =
                            self.workspace.pending_delete()
                        {
                            let prompt =
                                view::render_delete_prompt(conversation);
                            print!("{prompt}");
                            flush();
                            return true;
                        }
                    }
                    None => print_hint(format!("No conversation {position}.")),
                }
            }
            Command::Show => self.show(),
            Command::Refresh => match self.workspace.refresh().await {
                Ok(()) => print!("{}", view::render_sidebar(&self.workspace)),
                Err(err) => print_error("Failed to load conversations", err),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Send(text) => match self.workspace.send_message(&text) {
                SendOutcome::Sent => {
                    self.start_spinner();
                    return true;
                }
                SendOutcome::Busy => {
                    print_hint("Still waiting for the previous reply.")
                }
                SendOutcome::Empty => {}
                SendOutcome::NoActiveConversation => print_hint(format!(
                    "{}, with /new or /open N.",
                    view::NO_ACTIVE_CONVERSATION
                )),
            },
            Command::Invalid(hint) => print_hint(hint),
        }

        self.prompt();
        true
    }

    fn handle_turn_event(&mut self, event: TurnEvent) {
        if !self.workspace.apply(&event) {
            return;
        }
        let id = &event.conversation_id;

        if self.workspace.active_id() != Some(id) {
            let Some(position) = self.position_of(id) else {
                return;
            };
            match event.kind {
                TurnEventKind::Fragment(_) => {}
                TurnEventKind::Finished => print_hint(format!(
                    "Conversation {position} got a reply, /open {position} \
                     to read it."
                )),
                TurnEventKind::Failed(kind) => print_hint(format!(
                    "Conversation {position} failed to get a reply ({kind})."
                )),
            }
            return;
        }

        match event.kind {
            TurnEventKind::Fragment(fragment) => {
                if self.printing.as_ref() == Some(id) {
                    print_inline(&fragment);
                } else {
                    // Start over with everything received so far.
                    self.stop_spinner();
                    println!("\n{}", view::label(Role::Assistant));
                    print!("{}", BAR_CHAR.bright_cyan());
                    if let Some(content) = self.streamed_content(id) {
                        print_inline(&content);
                    }
                    self.printing = Some(id.clone());
                }
                flush();
            }
            TurnEventKind::Finished => {
                self.stop_spinner();
                if self.printing.take().is_some() {
                    println!();
                } else if let Some(content) = self.streamed_content(id) {
                    println!("\n{}", view::label(Role::Assistant));
                    print!("{}", BAR_CHAR.bright_cyan());
                    print_inline(&content);
                    println!();
                }
                self.prompt();
            }
            TurnEventKind::Failed(kind) => {
                self.stop_spinner();
                if self.printing.take().is_some() {
                    println!();
                }
                debug!("reply failed with {kind}");
                println!("\n{}", view::label(Role::Assistant));
                println!(
                    "{}{}",
                    BAR_CHAR.bright_cyan(),
                    ERROR_NOTICE.bright_red()
                );
                self.prompt();
            }
        }
    }

    fn answer_delete(&mut self, line: &str) {
        let answer = line.trim();
        if !(answer.eq_ignore_ascii_case("y")
            || answer.eq_ignore_ascii_case("yes"))
        {
            self.workspace.cancel_delete();
            println!("{}", "Kept the conversation.".dimmed());
            return;
        }
        if self.workspace.confirm_delete().is_some() {
            println!("{}", "Deleted the conversation.".dimmed());
        }
    }

    /// Prints the active conversation.
    ///
    /// A reply that is still streaming is left out, it's printed in full
    /// when its next event arrives.
    fn show(&mut self) {
        let Some(conversation) = self.workspace.active_conversation() else {
            print_hint(view::NO_ACTIVE_CONVERSATION);
            return;
        };
        let streaming = self
            .workspace
            .turn_state(&conversation.id)
            .is_some_and(TurnState::is_streaming);

        let mut shown = conversation.clone();
        if streaming
            && shown.messages.last().is_some_and(|m| m.role == Role::Assistant)
        {
            shown.messages.pop();
        }
        println!("{}", view::preview(&shown).bold());
        print!("{}", view::render_transcript(&shown));
        if streaming {
            self.start_spinner();
        }
    }

    /// Returns the content of the last message if the assistant wrote it.
    fn streamed_content(&self, id: &ConversationId) -> Option<String> {
        let message = self.workspace.conversation(id)?.messages.last()?;
        (message.role == Role::Assistant).then(|| message.content.clone())
    }

    fn conversation_at(&self, position: usize) -> Option<ConversationId> {
        let idx = position.checked_sub(1)?;
        let conversation = self.workspace.conversations().nth(idx)?;
        Some(conversation.id.clone())
    }

    fn position_of(&self, id: &ConversationId) -> Option<usize> {
        let idx = self.workspace.conversations().position(|c| &c.id == id)?;
        Some(idx + 1)
    }

    /// Stops printing the reply inline, before printing anything else.
    fn interrupt_reply(&mut self) {
        self.stop_spinner();
        if self.printing.take().is_some() {
            println!();
        }
    }

    fn start_spinner(&mut self) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(self.progress_style.clone());
        spinner.set_message("Waiting for the assistant...");
        self.spinner = Some(spinner);
    }

    fn tick(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.inc(1);
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn prompt(&self) {
        print!("{} ", ">".bright_cyan().bold());
        flush();
    }
}

/// Reads stdin on a dedicated thread, so a pending read never holds the
/// runtime back from shutting down.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!("error reading input: {}", err);
                    break;
                }
            }
        }
    });
    line_rx
}

fn print_inline(text: &str) {
    let bar = format!("\n{}", BAR_CHAR.bright_cyan());
    print!("{}", text.replace('\n', &bar));
}

fn print_hint<S: Display>(hint: S) {
    println!("{}", hint.dimmed());
}

fn print_error<E: Display>(context: &str, err: E) {
    eprintln!("{}", format!("{context}: {err}").bright_red());
}

#[inline]
fn flush() {
    std::io::stdout().flush().ok();
}
