//! Memory scope of a variable: how its value persists across parses.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Fixed definition value; never stored in memory.
    Constant,
    /// Learned once, then must match on every later parse sharing the memory.
    Session,
    /// Learned on every parse; the latest value overwrites the stored one.
    #[default]
    Message,
    /// Never memorized; only checked against the type.
    None,
}

impl Scope {
    /// Whether a learned value of this scope goes to memory.
    pub fn memorizes(&self) -> bool {
        matches!(self, Scope::Session | Scope::Message)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scope::Constant => "constant",
            Scope::Session => "session",
            Scope::Message => "message",
            Scope::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "constant" => Scope::Constant,
            "session" => Scope::Session,
            "message" => Scope::Message,
            "none" | "volatile" => Scope::None,
            _ => return None,
        })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
