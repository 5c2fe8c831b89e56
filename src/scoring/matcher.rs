//! Span overlap and one-to-one issue matching.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::Serialize;

use super::issue::{tokenize, Issue, TokenSet};

/// An issue reduced to what matching needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedIssue {
    pub category: String,
    pub tokens: TokenSet,
}

impl From<&Issue> for TokenizedIssue {
    fn from(issue: &Issue) -> Self {
        Self {
            category: issue.category.clone(),
            tokens: tokenize(issue),
        }
    }
}

pub fn tokenize_all(issues: &[Issue]) -> Vec<TokenizedIssue> {
    issues.iter().map(TokenizedIssue::from).collect()
}

/// Token-set F1 and IoU between two issues.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Overlap {
    pub f1: f64,
    pub iou: f64,
}

/// Computes span F1 and IoU. Both are 0 when either set is empty or the sets
/// are disjoint.
pub fn overlap(pred: &TokenSet, gold: &TokenSet) -> Overlap {
    if pred.is_empty() || gold.is_empty() {
        return Overlap::default();
    }
    let intersection = pred.intersection(gold).count();
    if intersection == 0 {
        return Overlap::default();
    }
    let inter = intersection as f64;
    let precision = inter / pred.len() as f64;
    let recall = inter / gold.len() as f64;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let union = pred.len() + gold.len() - intersection;
    let iou = if union > 0 { inter / union as f64 } else { 0.0 };
    Overlap { f1, iou }
}

/// A matched predicted/gold pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IssueMatch {
    pub pred_index: usize,
    pub gold_index: usize,
    pub f1: f64,
    pub iou: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub matches: Vec<IssueMatch>,
    pub matched_pred: BTreeSet<usize>,
    pub matched_gold: BTreeSet<usize>,
}

/// Pairs predicted issues with gold issues of the same category.
///
/// Candidates with positive F1 are ranked by F1, then IoU; equal candidates
/// keep generation order (pred index, then gold index). The ranked list is
/// walked once and a candidate is taken only if both sides are still free.
///
/// This is a greedy approximation of maximum-weight bipartite matching and
/// can miss the optimal assignment. Scores across published runs depend on
/// this exact behaviour, so it is kept as is.
pub fn greedy_match(pred: &[TokenizedIssue], gold: &[TokenizedIssue]) -> MatchResult {
    let mut candidates = Vec::new();
    for (i, p) in pred.iter().enumerate() {
        for (j, g) in gold.iter().enumerate() {
            if p.category != g.category {
                continue;
            }
            let Overlap { f1, iou } = overlap(&p.tokens, &g.tokens);
            if f1 > 0.0 {
                candidates.push(IssueMatch {
                    pred_index: i,
                    gold_index: j,
                    f1,
                    iou,
                });
            }
        }
    }
    // sort_by_key is stable
    candidates.sort_by_key(|c| Reverse((OrderedFloat(c.f1), OrderedFloat(c.iou))));

    let mut result = MatchResult::default();
    for candidate in candidates {
        if result.matched_pred.contains(&candidate.pred_index)
            || result.matched_gold.contains(&candidate.gold_index)
        {
            continue;
        }
        result.matched_pred.insert(candidate.pred_index);
        result.matched_gold.insert(candidate.gold_index);
        result.matches.push(candidate);
    }
    result
}

/// Match-based counts for one case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CaseEvaluation {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub span_f1_sum: f64,
    pub iou_sum: f64,
    pub match_count: u64,
}

/// Scores predicted issues against gold issues.
pub fn evaluate(gold: &[TokenizedIssue], pred: &[TokenizedIssue]) -> CaseEvaluation {
    let result = greedy_match(pred, gold);
    let matched = result.matches.len() as u64;
    CaseEvaluation {
        true_positives: matched,
        false_positives: (pred.len() - result.matched_pred.len()) as u64,
        false_negatives: (gold.len() - result.matched_gold.len()) as u64,
        span_f1_sum: result.matches.iter().map(|m| m.f1).sum(),
        iou_sum: result.matches.iter().map(|m| m.iou).sum(),
        match_count: matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::issue::{Location, LocationToken};

    fn issue(category: &str, file: &str, start: i64, end: i64) -> TokenizedIssue {
        TokenizedIssue::from(&Issue::new(category, vec![Location::new("X", file, start, end)]))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_overlap_partial_span() {
        let gold = issue("A", "f.py", 1, 2);
        let pred = issue("A", "f.py", 1, 3);
        let o = overlap(&pred.tokens, &gold.tokens);
        assert!(approx(o.f1, 0.8));
        assert!(approx(o.iou, 2.0 / 3.0));

        let eval = evaluate(&[gold], &[pred]);
        assert_eq!(eval.true_positives, 1);
        assert_eq!(eval.false_positives, 0);
        assert_eq!(eval.false_negatives, 0);
        assert_eq!(eval.match_count, 1);
        assert!(approx(eval.span_f1_sum, 0.8));
    }

    #[test]
    fn test_overlap_symmetric_and_empty() {
        let a = issue("A", "f.py", 1, 4).tokens;
        let b = issue("A", "f.py", 3, 9).tokens;
        assert_eq!(overlap(&a, &b), overlap(&b, &a));
        assert_eq!(overlap(&a, &TokenSet::new()), Overlap::default());
        let disjoint = issue("A", "g.py", 1, 4).tokens;
        assert_eq!(overlap(&a, &disjoint), Overlap::default());
    }

    #[test]
    fn test_category_mismatch_never_matches() {
        let gold = vec![issue("A", "f.py", 1, 2)];
        let pred = vec![issue("B", "f.py", 1, 2), issue("C", "f.py", 1, 2)];
        let eval = evaluate(&gold, &pred);
        assert_eq!(eval.true_positives, 0);
        assert_eq!(eval.false_positives, 2);
        assert_eq!(eval.false_negatives, 1);
        assert_eq!(eval.match_count, 0);
    }

    #[test]
    fn test_greedy_prefers_f1_then_iou() {
        // pred 0 overlaps gold 0 perfectly and gold 1 partially
        let gold = vec![issue("A", "f.py", 1, 2), issue("A", "f.py", 1, 4)];
        let pred = vec![issue("A", "f.py", 1, 2), issue("A", "f.py", 1, 3)];
        let result = greedy_match(&pred, &gold);
        assert_eq!(result.matches.len(), 2);
        assert_eq!((result.matches[0].pred_index, result.matches[0].gold_index), (0, 0));
        assert_eq!((result.matches[1].pred_index, result.matches[1].gold_index), (1, 1));
    }

    #[test]
    fn test_ties_keep_generation_order() {
        let gold = vec![issue("A", "f.py", 1, 1), issue("A", "f.py", 1, 1)];
        let pred = vec![issue("A", "f.py", 1, 1)];
        let result = greedy_match(&pred, &gold);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].gold_index, 0);
    }

    #[test]
    fn test_greedy_is_not_optimal() {
        // Greedy takes pred0-gold0 (f1 0.8) and leaves pred1 and gold1
        // unmatched, although pred0-gold1 plus pred1-gold0 would match both.
        let gold = vec![issue("A", "f.py", 1, 2), issue("A", "f.py", 3, 3)];
        let pred = vec![issue("A", "f.py", 1, 3), issue("A", "f.py", 2, 2)];
        let result = greedy_match(&pred, &gold);
        assert_eq!(result.matches.len(), 1);
        assert_eq!((result.matches[0].pred_index, result.matches[0].gold_index), (0, 0));

        let eval = evaluate(&gold, &pred);
        assert_eq!(eval.false_positives, 1);
        assert_eq!(eval.false_negatives, 1);
    }

    #[test]
    fn test_no_index_consumed_twice() {
        let gold: Vec<TokenizedIssue> = (0..4).map(|i| issue("A", "f.py", i, i + 2)).collect();
        let pred: Vec<TokenizedIssue> = (0..5).map(|i| issue("A", "f.py", i, i + 1)).collect();
        let result = greedy_match(&pred, &gold);
        let preds: BTreeSet<usize> = result.matches.iter().map(|m| m.pred_index).collect();
        let golds: BTreeSet<usize> = result.matches.iter().map(|m| m.gold_index).collect();
        assert_eq!(preds.len(), result.matches.len());
        assert_eq!(golds.len(), result.matches.len());
    }

    #[test]
    fn test_locationless_issues_match_on_sentinel() {
        let gold = vec![TokenizedIssue::from(&Issue::new("A", vec![]))];
        let pred = vec![TokenizedIssue::from(&Issue::new("A", vec![]))];
        assert!(gold[0].tokens.contains(&LocationToken::sentinel()));
        let eval = evaluate(&gold, &pred);
        assert_eq!(eval.true_positives, 1);
        assert!(approx(eval.iou_sum, 1.0));
    }
}
