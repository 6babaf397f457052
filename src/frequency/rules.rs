//! Ordered adjustment policy.
//!
//! Each rule is `(predicate, target, reason, confidence)`. Rules are
//! evaluated top to bottom and the first match wins; the last rule always
//! matches. Targets are raw (unclamped) minutes; the controller clamps.

use crate::model::{Confidence, ReasonCode};

/// Cross-source averages the policy looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyInput {
    /// Fraction in `[0, 1]`.
    pub avg_turnover: f64,
    /// `None` when no source produced a lifetime sample.
    pub avg_lifetime_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub reason: ReasonCode,
    pub confidence: Confidence,
    pub when: fn(&PolicyInput) -> bool,
    pub target: fn(i64) -> i64,
}

fn lifetime_above(p: &PolicyInput, min: f64) -> bool {
    p.avg_lifetime_minutes.is_some_and(|l| l > min)
}

fn lifetime_below(p: &PolicyInput, max: f64) -> bool {
    p.avg_lifetime_minutes.is_some_and(|l| l < max)
}

fn very_high_turnover(p: &PolicyInput) -> bool {
    p.avg_turnover > 0.50
}
fn high_turnover(p: &PolicyInput) -> bool {
    p.avg_turnover > 0.30
}
fn very_low_turnover_long_lifetime(p: &PolicyInput) -> bool {
    p.avg_turnover < 0.05 && lifetime_above(p, 180.0)
}
fn low_turnover(p: &PolicyInput) -> bool {
    p.avg_turnover < 0.10
}
fn very_short_lifetime(p: &PolicyInput) -> bool {
    lifetime_below(p, 30.0)
}
fn always(_: &PolicyInput) -> bool {
    true
}

fn cut_to_15(cur: i64) -> i64 {
    (cur - 15).min(15)
}
fn cut_to_30(cur: i64) -> i64 {
    (cur - 10).min(30)
}
fn raise_to_120(cur: i64) -> i64 {
    (cur + 20).max(120)
}
fn plus_10(cur: i64) -> i64 {
    cur + 10
}
fn minus_10(cur: i64) -> i64 {
    cur - 10
}
fn keep(cur: i64) -> i64 {
    cur
}

pub static RULES: [Rule; 6] = [
    Rule {
        reason: ReasonCode::VeryHighTurnover,
        confidence: Confidence::High,
        when: very_high_turnover,
        target: cut_to_15,
    },
    Rule {
        reason: ReasonCode::HighTurnover,
        confidence: Confidence::High,
        when: high_turnover,
        target: cut_to_30,
    },
    Rule {
        reason: ReasonCode::VeryLowTurnoverLongLifetime,
        confidence: Confidence::High,
        when: very_low_turnover_long_lifetime,
        target: raise_to_120,
    },
    Rule {
        reason: ReasonCode::LowTurnover,
        confidence: Confidence::Medium,
        when: low_turnover,
        target: plus_10,
    },
    Rule {
        reason: ReasonCode::VeryShortLifetime,
        confidence: Confidence::High,
        when: very_short_lifetime,
        target: minus_10,
    },
    Rule {
        reason: ReasonCode::WithinNormalRange,
        confidence: Confidence::Low,
        when: always,
        target: keep,
    },
];

/// First matching rule of `table`. Falls back to the catch-all of [`RULES`]
/// if a custom table has no match.
pub fn evaluate<'a>(table: &'a [Rule], input: &PolicyInput) -> &'a Rule {
    table
        .iter()
        .find(|r| (r.when)(input))
        .unwrap_or(&RULES[RULES.len() - 1])
}
