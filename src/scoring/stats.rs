//! Running sums over scored cases.
//!
//! Timing and cost keep their own counters, so a case without cost data does
//! not pull the cost average down.

use serde::{Deserialize, Serialize};

use super::matcher::CaseEvaluation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsAccumulator {
    pub cases: u64,
    pub evaluated_cases: u64,
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub span_sum: f64,
    pub iou_sum: f64,
    pub matches: u64,
    pub time_sum: f64,
    pub time_count: u64,
    pub cost_sum: f64,
    pub cost_count: u64,
}

/// Counts and precision / recall / F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub cases: u64,
    pub evaluated_cases: u64,
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub matches: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-match and per-case means; `None` when nothing was measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub span_f1: Option<f64>,
    pub iou: Option<f64>,
    pub time_s: Option<f64>,
    pub cost_usd: Option<f64>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one case. Without an evaluation the case only counts towards
    /// the case total and timing / cost.
    pub fn add_case(
        &mut self,
        evaluation: Option<&CaseEvaluation>,
        duration_s: Option<f64>,
        cost_usd: Option<f64>,
    ) {
        self.cases += 1;
        if let Some(duration) = duration_s {
            self.time_sum += duration;
            self.time_count += 1;
        }
        if let Some(cost) = cost_usd {
            self.cost_sum += cost;
            self.cost_count += 1;
        }
        if let Some(eval) = evaluation {
            self.evaluated_cases += 1;
            self.tp += eval.true_positives;
            self.fp += eval.false_positives;
            self.fn_ += eval.false_negatives;
            self.span_sum += eval.span_f1_sum;
            self.iou_sum += eval.iou_sum;
            self.matches += eval.match_count;
        }
    }

    /// Adds another accumulator's sums into this one.
    pub fn merge(&mut self, other: &StatsAccumulator) {
        self.cases += other.cases;
        self.evaluated_cases += other.evaluated_cases;
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.span_sum += other.span_sum;
        self.iou_sum += other.iou_sum;
        self.matches += other.matches;
        self.time_sum += other.time_sum;
        self.time_count += other.time_count;
        self.cost_sum += other.cost_sum;
        self.cost_count += other.cost_count;
    }

    pub fn totals(&self) -> Totals {
        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(self.tp, self.tp + self.fp);
        let recall = ratio(self.tp, self.tp + self.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Totals {
            cases: self.cases,
            evaluated_cases: self.evaluated_cases,
            tp: self.tp,
            fp: self.fp,
            fn_: self.fn_,
            matches: self.matches,
            precision,
            recall,
            f1,
        }
    }

    pub fn averages(&self) -> Averages {
        let mean = |sum: f64, count: u64| (count > 0).then(|| sum / count as f64);
        Averages {
            span_f1: mean(self.span_sum, self.matches),
            iou: mean(self.iou_sum, self.matches),
            time_s: mean(self.time_sum, self.time_count),
            cost_usd: mean(self.cost_sum, self.cost_count),
        }
    }
}
