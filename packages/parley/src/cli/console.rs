//! Console line parsing for `parley connect`.

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login(String),
    Call(String),
    HangUp,
    Quit,
    Help,
    Status,
    /// Chat text for the current peer.
    Say(String),
    Unknown(String),
    Empty,
}

pub const HELP: &str = "\
commands:
  /login <name>   sign in to the relay
  /call <name>    call a signed-in peer
  /hangup         end the current call
  /status         show who you are and who you are talking to
  /quit           hang up and exit
anything else is sent to your peer as chat";

/// Parse a console line. A missing argument becomes an empty string and is
/// left for the client to reject.
pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ConsoleCommand::Say(line.to_string());
    };

    let (verb, arg) = match command.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (command, ""),
    };
    match verb {
        "login" => ConsoleCommand::Login(arg.to_string()),
        "call" => ConsoleCommand::Call(arg.to_string()),
        "hangup" | "leave" => ConsoleCommand::HangUp,
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" => ConsoleCommand::Help,
        "status" => ConsoleCommand::Status,
        other => ConsoleCommand::Unknown(other.to_string()),
    }
}
