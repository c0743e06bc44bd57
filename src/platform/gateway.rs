// VoteTally - platform/gateway.rs
//
// Chat platform abstraction trait.
// The engine never talks to a chat service directly; a gateway process
// supplies an implementation of `ChatPlatform` and feeds inbound events in.
// Enables testing the engine without a live connection (see `memory`).
//
// All methods are blocking calls from the engine's point of view and are
// never invoked while the engine's state lock is held.

use crate::core::model::{ChannelId, Emoji, MessageSnapshot, SubmissionId, UserId};
use crate::util::error::PlatformError;

/// Outbound calls the engine makes to the chat platform.
pub trait ChatPlatform: Send + Sync {
    /// The engine's own user ID (author of seed reactions).
    fn self_id(&self) -> UserId;

    /// Fetch the current state of a message, including reaction counts.
    fn fetch_message(
        &self,
        channel: ChannelId,
        message: SubmissionId,
    ) -> Result<MessageSnapshot, PlatformError>;

    /// Add a reaction to a message as the engine user.
    fn add_reaction(
        &self,
        channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
    ) -> Result<(), PlatformError>;

    /// Remove `user`'s reaction `emoji` from a message.
    fn remove_reaction(
        &self,
        channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
        user: UserId,
    ) -> Result<(), PlatformError>;

    /// Users currently holding reaction `emoji` on a message.
    fn reactors(
        &self,
        channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
    ) -> Result<Vec<UserId>, PlatformError>;

    /// Every message in a channel, newest first.
    fn channel_history(&self, channel: ChannelId) -> Result<Vec<MessageSnapshot>, PlatformError>;
}

/// Remove a reaction, treating "already gone" as success.
///
/// Returns `true` if the reaction is no longer present. Other failures are
/// logged and reported as `false`; a retraction is never an error to callers.
pub fn retract(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    message: SubmissionId,
    emoji: &Emoji,
    user: UserId,
) -> bool {
    match platform.remove_reaction(channel, message, emoji, user) {
        Ok(()) => true,
        Err(e) if e.is_benign_for_retraction() => {
            tracing::debug!(
                submission = %message,
                emoji = %emoji,
                user = %user,
                "Reaction already removed"
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                submission = %message,
                emoji = %emoji,
                user = %user,
                error = %e,
                "Failed to remove reaction"
            );
            false
        }
    }
}
