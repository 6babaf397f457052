//! Advisory cadence derived from lifetimes alone (turnover is ignored).
//! The fastest-moving source dictates the overall recommendation.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Confidence, Source, SourceStats};

/// Per-source cadence bucket keyed on average lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    VeryFrequent,
    Frequent,
    Moderate,
    Infrequent,
    Rare,
    NoData,
}

impl Cadence {
    pub fn for_lifetime(avg_lifetime_minutes: Option<f64>) -> Self {
        match avg_lifetime_minutes {
            None => Cadence::NoData,
            Some(l) if l < 30.0 => Cadence::VeryFrequent,
            Some(l) if l < 60.0 => Cadence::Frequent,
            Some(l) if l < 120.0 => Cadence::Moderate,
            Some(l) if l < 240.0 => Cadence::Infrequent,
            Some(_) => Cadence::Rare,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Cadence::VeryFrequent => "every 10-15 minutes",
            Cadence::Frequent => "every 20-30 minutes",
            Cadence::Moderate => "every 30-60 minutes",
            Cadence::Infrequent => "every 1-2 hours",
            Cadence::Rare => "every 2-4 hours",
            Cadence::NoData => "no data available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Suggested interval; `None` is the no-op signal.
    pub interval_minutes: Option<u32>,
    pub confidence: Confidence,
    pub min_lifetime_minutes: Option<f64>,
    pub per_source: BTreeMap<Source, Cadence>,
}

impl Recommendation {
    pub fn is_noop(&self) -> bool {
        self.interval_minutes.is_none()
    }
}

fn bucket(min_lifetime: f64) -> u32 {
    if min_lifetime <= 60.0 {
        30
    } else if min_lifetime <= 120.0 {
        60
    } else {
        120
    }
}

pub fn recommend(stats: &SourceStats) -> Recommendation {
    let mut per_source = BTreeMap::new();
    let mut min_lifetime: Option<f64> = None;

    for (src, s) in stats {
        let lifetime = s.has_lifetime().then_some(s.avg_lifetime_minutes);
        per_source.insert(*src, Cadence::for_lifetime(lifetime));
        if let Some(l) = lifetime.filter(|l| l.is_finite()) {
            min_lifetime = Some(min_lifetime.map_or(l, |m| m.min(l)));
        }
    }

    match min_lifetime {
        Some(m) => Recommendation {
            interval_minutes: Some(bucket(m)),
            confidence: Confidence::High,
            min_lifetime_minutes: Some(m),
            per_source,
        },
        None => Recommendation {
            interval_minutes: None,
            confidence: Confidence::Low,
            min_lifetime_minutes: None,
            per_source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TurnoverStats;

    fn with_lifetime(l: f64) -> TurnoverStats {
        TurnoverStats {
            total_items_seen: 4,
            disappeared_count: 1,
            turnover_rate: 0.25,
            avg_lifetime_minutes: l,
            lifetime_samples: 3,
        }
    }

    #[test]
    fn cadence_buckets() {
        assert_eq!(Cadence::for_lifetime(Some(29.9)), Cadence::VeryFrequent);
        assert_eq!(Cadence::for_lifetime(Some(30.0)), Cadence::Frequent);
        assert_eq!(Cadence::for_lifetime(Some(119.0)), Cadence::Moderate);
        assert_eq!(Cadence::for_lifetime(Some(200.0)), Cadence::Infrequent);
        assert_eq!(Cadence::for_lifetime(Some(240.0)), Cadence::Rare);
        assert_eq!(Cadence::for_lifetime(None), Cadence::NoData);
    }

    #[test]
    fn fastest_source_dictates_interval() {
        let mut stats = SourceStats::new();
        stats.insert(Source::Gcx, with_lifetime(300.0));
        stats.insert(Source::CardCash, with_lifetime(90.0));
        let r = recommend(&stats);
        assert_eq!(r.interval_minutes, Some(60));
        assert_eq!(r.confidence, Confidence::High);
        assert_eq!(r.min_lifetime_minutes, Some(90.0));
        assert_eq!(r.per_source[&Source::Gcx], Cadence::Rare);
    }

    #[test]
    fn inclusive_bucket_edges() {
        let mut stats = SourceStats::new();
        stats.insert(Source::Gcx, with_lifetime(60.0));
        assert_eq!(recommend(&stats).interval_minutes, Some(30));
        stats.insert(Source::Gcx, with_lifetime(120.0));
        assert_eq!(recommend(&stats).interval_minutes, Some(60));
        stats.insert(Source::Gcx, with_lifetime(121.0));
        assert_eq!(recommend(&stats).interval_minutes, Some(120));
    }

    #[test]
    fn no_lifetime_is_low_confidence_noop() {
        let mut stats = SourceStats::new();
        stats.insert(Source::Gcx, TurnoverStats::default());
        let r = recommend(&stats);
        assert!(r.is_noop());
        assert_eq!(r.confidence, Confidence::Low);
        assert_eq!(r.per_source[&Source::Gcx], Cadence::NoData);
    }
}
