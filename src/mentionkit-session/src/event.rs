//! Input events routed to a session.

use serde::{Deserialize, Serialize};

/// A key press while the popup is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MentionKey {
    /// A printable character.
    Char(char),
    Enter,
    Escape,
    Backspace,
    ArrowUp,
    ArrowDown,
    /// Anything else (Tab, modifiers, function keys); ignored.
    Other,
}

impl MentionKey {
    /// Maps a DOM `KeyboardEvent.key` value.
    ///
    /// ```
    /// use mentionkit_session::MentionKey;
    ///
    /// assert_eq!(MentionKey::from_key_name("ArrowDown"), MentionKey::ArrowDown);
    /// assert_eq!(MentionKey::from_key_name("g"), MentionKey::Char('g'));
    /// assert_eq!(MentionKey::from_key_name("Shift"), MentionKey::Other);
    /// ```
    pub fn from_key_name(name: &str) -> Self {
        match name {
            "Enter" => Self::Enter,
            "Escape" | "Esc" => Self::Escape,
            "Backspace" => Self::Backspace,
            "ArrowUp" | "Up" => Self::ArrowUp,
            "ArrowDown" | "Down" => Self::ArrowDown,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_control() => Self::Char(c),
                    _ => Self::Other,
                }
            }
        }
    }
}

/// An event delivered to an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MentionEvent {
    Key(MentionKey),
    /// Click on a popup row; selects it as if focused and confirmed.
    Click { row: usize },
    /// Pointer entered a popup row; moves focus without re-querying.
    Hover { row: usize },
}

impl From<MentionKey> for MentionEvent {
    fn from(key: MentionKey) -> Self {
        Self::Key(key)
    }
}

impl MentionEvent {
    pub fn char(c: char) -> Self {
        Self::Key(MentionKey::Char(c))
    }
}
