//! Transcript to command matching

use super::{CommandDescriptor, CommandTable};

/// Find the first command whose name or alias occurs in `transcript`
///
/// Commands are tried in configured order and the first hit wins; there is no
/// preference for longer or more specific phrases.
#[must_use]
pub fn find_matching_command<'a>(
    transcript: &str,
    table: &'a CommandTable,
) -> Option<&'a CommandDescriptor> {
    let transcript = transcript.to_lowercase();

    let found = table
        .iter()
        .find(|command| command.phrases().any(|phrase| transcript.contains(phrase)));

    match found {
        Some(command) => tracing::debug!(command = %command.name, "command matched"),
        None => tracing::debug!(transcript = %transcript, "no command matched"),
    }

    found
}
