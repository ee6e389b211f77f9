//! Text rendering of the conversation list and the chat pane.
//!
//! Every function returns a ready-to-print string, with colors applied.

use std::fmt::Write as _;

use owo_colors::OwoColorize;
use streamchat_core::Workspace;
use streamchat_core::model::{Conversation, Message, Role};

/// Prefix of every line of a message.
pub const BAR_CHAR: &str = "▎";

/// Maximum characters of a conversation preview.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Shown instead of a preview for a conversation without messages.
pub const NEW_CONVERSATION: &str = "New conversation";

/// Shown in the chat pane when no conversation is active.
pub const NO_ACTIVE_CONVERSATION: &str =
    "Select a conversation or create a new one";

/// Returns the short title of a conversation: the first line of its first
/// message, cut at [`PREVIEW_MAX_CHARS`].
pub fn preview(conversation: &Conversation) -> String {
    let Some(first) = conversation.messages.first() else {
        return NEW_CONVERSATION.to_owned();
    };
    let line = first.content.trim().lines().next().unwrap_or_default();
    if line.is_empty() {
        return NEW_CONVERSATION.to_owned();
    }

    let mut chars = line.chars();
    let mut preview: String = chars.by_ref().take(PREVIEW_MAX_CHARS).collect();
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}

/// Returns the role label of a message, as printed above its content.
pub fn label(role: Role) -> String {
    let bar = BAR_CHAR.bright_cyan();
    match role {
        Role::User => format!("{bar}{}", "You".bright_green().bold()),
        Role::Assistant => format!("{bar}{}", "Assistant".bright_cyan().bold()),
    }
}

/// Renders the numbered conversation list.
///
/// Positions start at 1 and match the list order of the workspace. The
/// active conversation is marked, and so are conversations whose reply is
/// still streaming.
pub fn render_sidebar(workspace: &Workspace) -> String {
    let mut out = format!("{}\n", "Conversations".bold());
    if workspace.conversations().len() == 0 {
        writeln!(out, "  {}", "(none yet, type /new to start one)".dimmed())
            .ok();
        return out;
    }

    let active = workspace.active_id();
    for (idx, conversation) in workspace.conversations().enumerate() {
        let is_active = active == Some(&conversation.id);
        let marker = if is_active { "●" } else { " " };
        let title = preview(conversation);
        let streaming = workspace
            .turn_state(&conversation.id)
            .is_some_and(|s| s.is_streaming());

        write!(out, "{} {:>2}. ", marker.bright_cyan(), idx + 1).ok();
        if is_active {
            write!(out, "{}", title.bright_white().bold()).ok();
        } else {
            write!(out, "{title}").ok();
        }
        if streaming {
            write!(out, " {}", "(replying…)".dimmed()).ok();
        }
        out.push('\n');
    }
    out
}

/// Renders a single message with its label.
pub fn render_message(message: &Message) -> String {
    let mut out = label(message.role);
    out.push('\n');
    let bar = BAR_CHAR.bright_cyan();
    for line in message.content.lines() {
        writeln!(out, "{bar}{line}").ok();
    }
    out
}

/// Renders the whole transcript of a conversation.
pub fn render_transcript(conversation: &Conversation) -> String {
    if conversation.messages.is_empty() {
        return format!("{}\n", "Say something to start chatting.".dimmed());
    }

    let mut out = String::new();
    for (idx, message) in conversation.messages.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(&render_message(message));
    }
    out
}

/// Renders the question asked before deleting a conversation.
pub fn render_delete_prompt(conversation: &Conversation) -> String {
    let bar = BAR_CHAR.bright_yellow();
    format!(
        "{bar}Are you sure you want to delete this conversation?\n\
         {bar}\"{}\"\n\
         {bar}This action cannot be undone.\n\
         Delete? [y/N]: ",
        preview(conversation).bright_white().bold(),
    )
}
