use std::fmt;

/// Requests delivered to the session driver while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    ToggleMirror,
    ToggleRotate,
    /// Finish and export the session
    Finish,
    /// Finish and export, then stop reading input
    Quit,
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionCommand::ToggleMirror => "toggle mirror",
            SessionCommand::ToggleRotate => "toggle rotation",
            SessionCommand::Finish => "finish",
            SessionCommand::Quit => "quit",
        };
        f.write_str(name)
    }
}
