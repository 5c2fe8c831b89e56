//! Scoring of predicted issues against gold annotations.
//!
//! Issues are expanded into line-level location tokens, paired one-to-one by
//! a greedy matcher, and summed into a [`StatsAccumulator`].

pub mod issue;
pub mod matcher;
pub mod stats;

pub use issue::{parse_issues, tokenize, unify_path, Issue, Location, LocationToken, TokenSet};
pub use matcher::{
    evaluate, greedy_match, overlap, tokenize_all, CaseEvaluation, IssueMatch, MatchResult,
    Overlap, TokenizedIssue,
};
pub use stats::{Averages, StatsAccumulator, Totals};
