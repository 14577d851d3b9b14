use crate::error::EngineError;
use serde::Serialize;

pub const MIN_SELECTION: usize = 2;
pub const MAX_SELECTION: usize = 3;

/// Objective value for selections below [`MIN_SELECTION`].
pub const INFEASIBLE: f64 = -99_999.0;
pub const OVER_SELECTION_PENALTY: f64 = 5_000.0;
pub const REPEAT_PENALTY: f64 = 10.0;
/// Extra penalty for removed activities. Removed activities never reach the
/// candidate pool, so this only matters if that filter is ever relaxed.
pub const REMOVED_PENALTY: f64 = 5.0;

const PENALTY_CEILING: f64 = 10.0;
const NEUTRAL_AVERAGE: f64 = 5.0;

/// Black-box search over the unit box `[0, 1]^dims`.
pub trait Optimizer: Send + Sync {
    /// Returns a point that scores high under `objective`.
    fn maximize(&self, dims: usize, objective: &dyn Fn(&[f64]) -> f64) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub activity: String,
    pub score: f64,
    pub penalty: f64,
    pub recently_recommended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Queue order for feedback collection.
    pub activities: Vec<String>,
    pub used_fallback: bool,
}

/// `max(0, 10 - average)` with 5 for activities without feedback, plus
/// [`REMOVED_PENALTY`] for removed ones.
pub fn penalty(average_feedback: Option<f64>, removed: bool) -> f64 {
    let average = average_feedback.unwrap_or(NEUTRAL_AVERAGE);
    let mut penalty = (PENALTY_CEILING - average).max(0.0);
    if removed {
        penalty += REMOVED_PENALTY;
    }
    penalty
}

/// Rounds half to even, so an undecided 0.5 stays unselected.
fn is_selected(x: f64) -> bool {
    x.clamp(0.0, 1.0).round_ties_even() >= 1.0
}

/// Desirability of a relaxed selection `x`, one coordinate per candidate.
/// Count and repeat constraints are folded in as penalties; [`select`]
/// enforces the hard bounds afterwards.
pub fn objective(candidates: &[Candidate], x: &[f64]) -> f64 {
    let mut total = 0.0;
    let mut selected = 0;
    for (candidate, &xi) in candidates.iter().zip(x) {
        let xi = xi.clamp(0.0, 1.0);
        // score minus penalty, so better-rated activities raise the objective
        total += xi * (candidate.score - candidate.penalty);
        if is_selected(xi) {
            selected += 1;
            if candidate.recently_recommended {
                total -= REPEAT_PENALTY;
            }
        }
    }

    if selected < MIN_SELECTION {
        return INFEASIBLE;
    }
    if selected > MAX_SELECTION {
        total -= OVER_SELECTION_PENALTY;
    }
    total
}

/// Candidate indices ordered by score, highest first; ties keep pool order.
fn ranked(candidates: &[Candidate], indices: &[usize]) -> Vec<usize> {
    let mut ranked = indices.to_vec();
    ranked.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));
    ranked
}

/// Picks 2-3 activities: runs `optimizer` over the unit box, rounds each
/// coordinate, then falls back to the top two scores or caps at three.
pub fn select(candidates: &[Candidate], optimizer: &dyn Optimizer) -> Result<Selection, EngineError> {
    if candidates.len() < MIN_SELECTION {
        return Err(EngineError::InsufficientCandidates {
            available: candidates.len(),
        });
    }

    let solution = optimizer.maximize(candidates.len(), &|x: &[f64]| objective(candidates, x));
    tracing::debug!("Optimizer returned {:?}", solution);

    let picked: Vec<usize> = (0..candidates.len())
        .filter(|&i| solution.get(i).copied().map(is_selected).unwrap_or(false))
        .collect();

    if picked.len() < MIN_SELECTION {
        let all: Vec<usize> = (0..candidates.len()).collect();
        let fallback = ranked(candidates, &all)
            .into_iter()
            .take(MIN_SELECTION)
            .map(|i| candidates[i].activity.clone())
            .collect::<Vec<_>>();
        tracing::warn!(
            "Optimizer selected {} activities, falling back to top scores: {:?}",
            picked.len(),
            fallback
        );
        return Ok(Selection {
            activities: fallback,
            used_fallback: true,
        });
    }

    let mut kept = picked;
    if kept.len() > MAX_SELECTION {
        kept = ranked(candidates, &kept);
        kept.truncate(MAX_SELECTION);
        kept.sort_unstable();
    }

    Ok(Selection {
        activities: kept.into_iter().map(|i| candidates[i].activity.clone()).collect(),
        used_fallback: false,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Returns the same point regardless of the objective.
    pub(crate) struct FixedPoint(pub Vec<f64>);

    impl Optimizer for FixedPoint {
        fn maximize(&self, _dims: usize, _objective: &dyn Fn(&[f64]) -> f64) -> Vec<f64> {
            self.0.clone()
        }
    }

    /// Exhaustively tries every vertex of the unit box.
    pub(crate) struct Exhaustive;

    impl Optimizer for Exhaustive {
        fn maximize(&self, dims: usize, objective: &dyn Fn(&[f64]) -> f64) -> Vec<f64> {
            let mut best = vec![0.0; dims];
            let mut best_value = f64::NEG_INFINITY;
            for mask in 0u32..(1 << dims) {
                let point: Vec<f64> = (0..dims).map(|i| ((mask >> i) & 1) as f64).collect();
                let value = objective(&point);
                if value > best_value {
                    best_value = value;
                    best = point;
                }
            }
            best
        }
    }

    fn candidate(name: &str, score: f64) -> Candidate {
        Candidate {
            activity: name.to_string(),
            score,
            penalty: penalty(None, false),
            recently_recommended: false,
        }
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection.activities.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_penalty_formula() {
        assert_eq!(penalty(None, false), 5.0);
        assert_eq!(penalty(Some(9.0), false), 1.0);
        assert_eq!(penalty(Some(10.0), true), 5.0);
        assert_eq!(penalty(Some(2.0), true), 13.0);
    }

    #[test]
    fn test_objective_shapes_counts() {
        let pool: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|n| candidate(n, 7.0)).collect();
        assert_eq!(objective(&pool, &[1.0, 0.0, 0.0, 0.0, 0.0]), INFEASIBLE);
        assert_eq!(objective(&pool, &[1.0, 1.0, 0.0, 0.0, 0.0]), 4.0);
        assert_eq!(objective(&pool, &[1.0, 1.0, 1.0, 1.0, 0.0]), 8.0 - OVER_SELECTION_PENALTY);
        // 0.4 rounds to "not selected" but still contributes its weight.
        assert!((objective(&pool, &[1.0, 1.0, 0.4, 0.0, 0.0]) - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_objective_penalizes_repeats() {
        let mut pool = vec![candidate("A", 7.0), candidate("B", 7.0), candidate("C", 7.0)];
        pool[0].recently_recommended = true;
        assert_eq!(objective(&pool, &[1.0, 1.0, 0.0]), 4.0 - REPEAT_PENALTY);
        assert_eq!(objective(&pool, &[0.0, 1.0, 1.0]), 4.0);
    }

    #[test]
    fn test_select_rejects_small_pools() {
        let err = select(&[candidate("X", 5.0)], &Exhaustive).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCandidates { available: 1 }));
        let err = select(&[], &Exhaustive).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCandidates { available: 0 }));
    }

    #[test]
    fn test_select_rounds_optimizer_output() {
        let pool: Vec<_> = ["A", "B", "C", "D"].iter().map(|n| candidate(n, 5.0)).collect();
        let selection = select(&pool, &FixedPoint(vec![0.2, 0.7, 0.5, 0.9])).unwrap();
        assert_eq!(names(&selection), vec!["B", "D"]);
        assert!(!selection.used_fallback);

        let selection = select(&pool, &FixedPoint(vec![0.51, 0.5, 1.7, -0.3])).unwrap();
        assert_eq!(names(&selection), vec!["A", "C"]);
    }

    #[test]
    fn test_fallback_takes_top_two_with_stable_ties() {
        let pool = vec![
            candidate("A", 5.0),
            candidate("B", 10.0),
            candidate("C", 5.0),
            candidate("D", 5.0),
        ];
        let selection = select(&pool, &FixedPoint(vec![0.0; 4])).unwrap();
        assert_eq!(names(&selection), vec!["B", "A"]);
        assert!(selection.used_fallback);

        // Short or empty optimizer output counts as nothing selected.
        let selection = select(&pool, &FixedPoint(vec![1.0])).unwrap();
        assert_eq!(names(&selection), vec!["B", "A"]);
    }

    #[test]
    fn test_over_selection_is_capped_by_score() {
        let pool = vec![
            candidate("A", 4.0),
            candidate("B", 10.0),
            candidate("C", 6.0),
            candidate("D", 4.0),
            candidate("E", 6.0),
        ];
        let selection = select(&pool, &FixedPoint(vec![1.0; 5])).unwrap();
        assert_eq!(names(&selection), vec!["B", "C", "E"]);

        let flat: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|n| candidate(n, 5.0)).collect();
        let selection = select(&flat, &FixedPoint(vec![1.0; 5])).unwrap();
        assert_eq!(names(&selection), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_exhaustive_search_prefers_high_scores() {
        let pool = vec![
            candidate("A", 5.0),
            candidate("B", 10.0),
            candidate("C", 5.0),
            candidate("D", 9.0),
            candidate("E", -10.0),
        ];
        let selection = select(&pool, &Exhaustive).unwrap();
        assert_eq!(names(&selection), vec!["B", "D"]);
    }

    #[test]
    fn test_selection_size_is_always_two_or_three() {
        let pool: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|n| candidate(n, 5.0)).collect();
        for mask in 0u32..32 {
            let point: Vec<f64> = (0..5).map(|i| ((mask >> i) & 1) as f64).collect();
            let selection = select(&pool, &FixedPoint(point)).unwrap();
            let len = selection.activities.len();
            assert!((MIN_SELECTION..=MAX_SELECTION).contains(&len), "mask {mask:b} gave {len}");
        }
    }
}
