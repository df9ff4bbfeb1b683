//! TUI screens.

mod chat;

pub(crate) use chat::{Action, ChatScreen};
