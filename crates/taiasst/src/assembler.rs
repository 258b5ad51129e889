//! Turns a conversation into the record list a vendor is sent.

use crate::llm::{CapabilityFlags, Message, Role};

/// Produce the ordered `{role, content}` records for a completion request.
///
/// Turn order is preserved. Models on the manual decode path reject a
/// transcript whose first non-system record is not from the user, so for them
/// assistant turns ahead of the first user turn are dropped. Nothing else is
/// validated or repaired.
pub fn assemble(turns: &[Message], flags: CapabilityFlags) -> Vec<Message> {
    if !flags.manual_decode_path {
        return turns.to_vec();
    }

    let mut seen_user = false;
    turns
        .iter()
        .filter(|turn| {
            seen_user |= turn.role == Role::User;
            seen_user || turn.role != Role::Assistant
        })
        .cloned()
        .collect()
}
