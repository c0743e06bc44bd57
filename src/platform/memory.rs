// VoteTally - platform/memory.rs
//
// In-memory `ChatPlatform` for embedding tests and dry runs.
//
// Messages live in a map keyed by ID; each reaction type keeps the ordered
// list of users holding it, so counts, reactor lists, and retractions behave
// like a real platform. The platform can be switched offline to exercise
// transport failures.

use crate::core::model::{
    ChannelId, Emoji, MessageSnapshot, ReactionObserved, ReactionTally, SubmissionId, UserId,
};
use crate::platform::gateway::ChatPlatform;
use crate::util::error::PlatformError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredMessage {
    snapshot: MessageSnapshot,
    reactions: Vec<(Emoji, Vec<UserId>)>,
}

impl StoredMessage {
    fn tallies(&self) -> Vec<ReactionTally> {
        self.reactions
            .iter()
            .map(|(emoji, users)| ReactionTally {
                emoji: emoji.clone(),
                count: users.len() as u32,
            })
            .collect()
    }

    fn snapshot(&self) -> MessageSnapshot {
        MessageSnapshot {
            reactions: self.tallies(),
            ..self.snapshot.clone()
        }
    }

    fn add(&mut self, emoji: &Emoji, user: UserId) {
        match self.reactions.iter_mut().find(|(e, _)| e == emoji) {
            Some((_, users)) => {
                if !users.contains(&user) {
                    users.push(user);
                }
            }
            None => self.reactions.push((emoji.clone(), vec![user])),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    messages: BTreeMap<SubmissionId, StoredMessage>,
    offline: bool,
}

/// A chat platform held entirely in memory.
#[derive(Debug)]
pub struct InMemoryPlatform {
    self_id: UserId,
    inner: Mutex<Inner>,
}

impl InMemoryPlatform {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn online(&self) -> Result<MutexGuard<'_, Inner>, PlatformError> {
        let inner = self.lock();
        if inner.offline {
            return Err(PlatformError::Unavailable {
                reason: "platform offline".to_string(),
            });
        }
        Ok(inner)
    }

    /// Post a message. Any reactions on `message` are ignored; use `react`.
    pub fn post(&self, message: MessageSnapshot) {
        let mut snapshot = message;
        snapshot.reactions.clear();
        self.lock().messages.insert(
            snapshot.id,
            StoredMessage {
                snapshot,
                reactions: Vec::new(),
            },
        );
    }

    /// A user adds a reaction. Returns the event the gateway would deliver.
    pub fn react(&self, message: SubmissionId, user: UserId, emoji: &str) -> ReactionObserved {
        let emoji = Emoji::new(emoji);
        if let Some(stored) = self.lock().messages.get_mut(&message) {
            stored.add(&emoji, user);
        }
        ReactionObserved {
            message_id: message,
            reactor_id: user,
            emoji,
        }
    }

    /// Delete a message, as a moderator might before voting closes.
    pub fn delete(&self, message: SubmissionId) {
        self.lock().messages.remove(&message);
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Users currently holding `emoji` on `message`.
    pub fn holders(&self, message: SubmissionId, emoji: &str) -> Vec<UserId> {
        self.lock()
            .messages
            .get(&message)
            .and_then(|m| m.reactions.iter().find(|(e, _)| e.as_str() == emoji))
            .map(|(_, users)| users.clone())
            .unwrap_or_default()
    }

    /// Every reaction `user` currently holds on `message`.
    pub fn votes_of(&self, message: SubmissionId, user: UserId) -> Vec<Emoji> {
        self.lock()
            .messages
            .get(&message)
            .map(|m| {
                m.reactions
                    .iter()
                    .filter(|(_, users)| users.contains(&user))
                    .map(|(e, _)| e.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn not_found(message: SubmissionId) -> PlatformError {
    PlatformError::NotFound {
        what: "message",
        id: message.0,
    }
}

impl ChatPlatform for InMemoryPlatform {
    fn self_id(&self) -> UserId {
        self.self_id
    }

    fn fetch_message(
        &self,
        channel: ChannelId,
        message: SubmissionId,
    ) -> Result<MessageSnapshot, PlatformError> {
        let inner = self.online()?;
        inner
            .messages
            .get(&message)
            .filter(|m| m.snapshot.channel == channel)
            .map(StoredMessage::snapshot)
            .ok_or_else(|| not_found(message))
    }

    fn add_reaction(
        &self,
        _channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
    ) -> Result<(), PlatformError> {
        let mut inner = self.online()?;
        let stored = inner
            .messages
            .get_mut(&message)
            .ok_or_else(|| not_found(message))?;
        stored.add(emoji, self.self_id);
        Ok(())
    }

    fn remove_reaction(
        &self,
        _channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
        user: UserId,
    ) -> Result<(), PlatformError> {
        let mut inner = self.online()?;
        let stored = inner
            .messages
            .get_mut(&message)
            .ok_or_else(|| not_found(message))?;
        let (_, users) = stored
            .reactions
            .iter_mut()
            .find(|(e, _)| e == emoji)
            .ok_or(PlatformError::ReactionAbsent)?;
        let pos = users
            .iter()
            .position(|u| *u == user)
            .ok_or(PlatformError::ReactionAbsent)?;
        users.remove(pos);
        stored.reactions.retain(|(_, users)| !users.is_empty());
        Ok(())
    }

    fn reactors(
        &self,
        _channel: ChannelId,
        message: SubmissionId,
        emoji: &Emoji,
    ) -> Result<Vec<UserId>, PlatformError> {
        let inner = self.online()?;
        let stored = inner
            .messages
            .get(&message)
            .ok_or_else(|| not_found(message))?;
        Ok(stored
            .reactions
            .iter()
            .find(|(e, _)| e == emoji)
            .map(|(_, users)| users.clone())
            .unwrap_or_default())
    }

    fn channel_history(&self, channel: ChannelId) -> Result<Vec<MessageSnapshot>, PlatformError> {
        let inner = self.online()?;
        let mut history: Vec<MessageSnapshot> = inner
            .messages
            .values()
            .filter(|m| m.snapshot.channel == channel)
            .map(StoredMessage::snapshot)
            .collect();
        history.sort_by(|a, b| {
            b.posted_at
                .cmp(&a.posted_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(history)
    }
}
