// VoteTally - core/vote_guard.rs
//
// One active vote per voter, and no voting on your own submission.
//
// No ledger of who voted what is kept: every decision is re-derived from the
// live reaction lists fetched from the platform at the time of the event.

use crate::core::model::{Emoji, UserId};

/// What to do with a freshly added reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The reaction stands as the voter's vote.
    Accept,
    /// The author reacted to their own submission; remove it.
    RetractSelfVote,
    /// The voter already holds `kept`; remove the new reaction.
    RetractDuplicate { kept: Emoji },
}

impl Verdict {
    pub fn retracts(&self) -> bool {
        !matches!(self, Verdict::Accept)
    }
}

/// Judge `reactor` adding `added` to a submission by `author`.
///
/// `live` lists every reaction type currently on the message with the users
/// holding it. The entry for `added` itself is ignored.
pub fn judge(
    reactor: UserId,
    added: &Emoji,
    author: UserId,
    live: &[(Emoji, Vec<UserId>)],
) -> Verdict {
    if reactor == author {
        return Verdict::RetractSelfVote;
    }

    live.iter()
        .find(|(emoji, users)| emoji != added && users.contains(&reactor))
        .map_or(Verdict::Accept, |(emoji, _)| Verdict::RetractDuplicate {
            kept: emoji.clone(),
        })
}
