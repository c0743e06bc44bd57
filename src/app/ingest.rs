// VoteTally - app/ingest.rs
//
// Event ingestor: turns raw platform events into the two internal events the
// engine understands. Everything that is not a qualifying submission or a
// reaction by someone other than the engine is dropped here.

use crate::core::model::{
    ChannelId, Emoji, InboundEvent, MessageSnapshot, ReactionObserved, SubmissionId,
    SubmissionOpened, UserId,
};
use crate::core::settings::ScopeSettings;

/// Events as delivered by a chat gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A new message was posted.
    MessagePosted(MessageSnapshot),

    /// A user added a reaction to a message.
    ReactionAdded {
        message: SubmissionId,
        channel: ChannelId,
        user: UserId,
        emoji: Emoji,
    },
}

/// Adapt a posted message. Qualifies when it is posted in its scope's bound
/// channel by a human and carries at least one attachment.
pub fn adapt_message(
    message: &MessageSnapshot,
    settings: &ScopeSettings,
) -> Option<SubmissionOpened> {
    if settings.channel(message.scope) != Some(message.channel) {
        return None;
    }
    if !message.is_submission() {
        tracing::trace!(message = %message.id, "Message in bound channel is not a submission");
        return None;
    }
    Some(SubmissionOpened {
        id: message.id,
        channel_id: message.channel,
        author_id: message.author,
        scope_id: message.scope,
        timestamp: message.posted_at,
    })
}

/// Adapt a reaction. The engine's own reactions are never judged.
pub fn adapt_reaction(
    message: SubmissionId,
    user: UserId,
    emoji: &Emoji,
    self_id: UserId,
) -> Option<ReactionObserved> {
    (user != self_id).then(|| ReactionObserved {
        message_id: message,
        reactor_id: user,
        emoji: emoji.clone(),
    })
}

/// Adapt any platform event.
pub fn adapt(
    event: &PlatformEvent,
    settings: &ScopeSettings,
    self_id: UserId,
) -> Option<InboundEvent> {
    match event {
        PlatformEvent::MessagePosted(message) => {
            adapt_message(message, settings).map(InboundEvent::SubmissionOpened)
        }
        PlatformEvent::ReactionAdded {
            message,
            user,
            emoji,
            ..
        } => adapt_reaction(*message, *user, emoji, self_id).map(InboundEvent::ReactionObserved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ScopeId;
    use chrono::Utc;

    const BOT: UserId = UserId(999);

    fn settings() -> ScopeSettings {
        let mut s = ScopeSettings::new();
        s.bind_channel(ScopeId(1), ChannelId(10));
        s
    }

    fn message(channel: u64, attachments: usize) -> MessageSnapshot {
        MessageSnapshot {
            id: SubmissionId(77),
            channel: ChannelId(channel),
            scope: ScopeId(1),
            author: UserId(5),
            author_is_bot: false,
            reactions: Vec::new(),
            attachments: (0..attachments).map(|i| format!("{i}.png")).collect(),
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn test_attachment_in_bound_channel_opens_submission() {
        let opened = adapt_message(&message(10, 1), &settings()).unwrap();
        assert_eq!(opened.id, SubmissionId(77));
        assert_eq!(opened.scope_id, ScopeId(1));
        assert_eq!(opened.author_id, UserId(5));
    }

    #[test]
    fn test_other_channels_and_text_posts_are_ignored() {
        assert!(adapt_message(&message(11, 1), &settings()).is_none());
        assert!(adapt_message(&message(10, 0), &settings()).is_none());
        assert!(adapt_message(&message(10, 1), &ScopeSettings::new()).is_none());
    }

    #[test]
    fn test_engine_reactions_are_dropped() {
        let event = PlatformEvent::ReactionAdded {
            message: SubmissionId(77),
            channel: ChannelId(10),
            user: BOT,
            emoji: Emoji::from("😍"),
        };
        assert!(adapt(&event, &settings(), BOT).is_none());

        let human = PlatformEvent::ReactionAdded {
            message: SubmissionId(77),
            channel: ChannelId(10),
            user: UserId(6),
            emoji: Emoji::from("😍"),
        };
        assert!(matches!(
            adapt(&human, &settings(), BOT),
            Some(InboundEvent::ReactionObserved(_))
        ));
    }
}
