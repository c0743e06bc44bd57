// VoteTally - core/scoring.rs
//
// Weighted score of a submission from its live reaction tallies.
//
//   score = Σ weight(r) × (count(r) − 1)
//
// The −1 removes the engine's own seed reaction so only human votes count.
// Symbols outside the scope's key weigh 0, so stray reactions never error
// and never count.

use crate::core::model::{ReactionTally, VoteWeightKey};

/// Compute the score for one set of reaction tallies under `key`.
pub fn score(reactions: &[ReactionTally], key: &VoteWeightKey) -> i64 {
    reactions
        .iter()
        .map(|r| key.weight(&r.emoji) * i64::from(r.count.saturating_sub(1)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Emoji;

    #[test]
    fn test_score_excludes_seed_reactions() {
        let reactions = vec![
            ReactionTally::new("😍", 3),
            ReactionTally::new("👍", 2),
            ReactionTally::new("🕒", 1),
        ];
        assert_eq!(score(&reactions, &VoteWeightKey::default()), 5);
    }

    #[test]
    fn test_only_seed_reactions_scores_zero() {
        let key = VoteWeightKey::default();
        let reactions: Vec<ReactionTally> = key
            .options()
            .iter()
            .map(|(e, _)| ReactionTally::new(e.as_str(), 1))
            .collect();
        assert_eq!(score(&reactions, &key), 0);
    }

    #[test]
    fn test_negative_votes_and_stray_reactions() {
        let reactions = vec![
            ReactionTally::new("🤮", 4),
            ReactionTally::new("👎", 2),
            ReactionTally::new("🎉", 9),
        ];
        assert_eq!(score(&reactions, &VoteWeightKey::default()), -7);
    }

    #[test]
    fn test_custom_key_and_zero_count() {
        let key = VoteWeightKey::new([(Emoji::from("<:pog:123>"), 5)]);
        let reactions = vec![
            ReactionTally::new("<:pog:123>", 3),
            ReactionTally::new("😍", 10),
        ];
        assert_eq!(score(&reactions, &key), 10);

        let empty = vec![ReactionTally::new("<:pog:123>", 0)];
        assert_eq!(score(&empty, &key), 0);
    }
}
