//! Parsing of the lines typed into the terminal client.

/// A parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Creates a conversation and switches to it.
    New,
    /// Prints the conversation list.
    List,
    /// Switches to the conversation at a position of the list (1-based).
    Open(usize),
    /// Asks to delete the conversation at a position of the list
    /// (1-based).
    Delete(usize),
    /// Prints the transcript of the active conversation.
    Show,
    /// Reloads the conversation list from the backend.
    Refresh,
    /// Prints the available commands.
    Help,
    /// Leaves the client.
    Quit,
    /// Sends the line as a message to the active conversation.
    Send(String),
    /// A command that can't be understood, with a hint for the user.
    Invalid(String),
}

/// The help text printed by [`Command::Help`].
pub const HELP: &str = "\
/new        start a new conversation
/list       list conversations
/open N     switch to conversation N
/delete N   delete conversation N
/show       print the active conversation
/refresh    reload conversations from the backend
/help       print this help
/quit       leave
Anything else is sent to the active conversation.";

impl Command {
    /// Parses a line of input.
    ///
    /// Lines that don't start with `/` are messages. They are kept as typed,
    /// except for the trailing line break.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(command) = line.trim_start().strip_prefix('/') else {
            return Self::Send(line.to_owned());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        if parts.next().is_some() {
            return Self::Invalid(format!("too many arguments for /{name}"));
        }

        match (name, arg) {
            ("new", None) => Self::New,
            ("list", None) => Self::List,
            ("show", None) => Self::Show,
            ("refresh", None) => Self::Refresh,
            ("help", None) => Self::Help,
            ("quit" | "exit", None) => Self::Quit,
            ("open", arg) => parse_position(arg)
                .map(Self::Open)
                .unwrap_or_else(|| Self::Invalid("usage: /open N".to_owned())),
            ("delete", arg) => parse_position(arg)
                .map(Self::Delete)
                .unwrap_or_else(|| {
                    Self::Invalid("usage: /delete N".to_owned())
                }),
            (
                "new" | "list" | "show" | "refresh" | "help" | "quit" | "exit",
                Some(_),
            ) => Self::Invalid(format!("/{name} takes no argument")),
            _ => Self::Invalid(format!(
                "unknown command /{name}, type /help for a list"
            )),
        }
    }
}

fn parse_position(arg: Option<&str>) -> Option<usize> {
    arg?.parse().ok().filter(|n| *n > 0)
}
