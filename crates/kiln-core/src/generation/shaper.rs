//! Distribution shaping: raw scores to a sampling-ready distribution
//!
//! The pipeline runs in a fixed order and each stage narrows or rescales the
//! candidate set the next stage sees:
//!
//! ```text
//! scores ──► / temperature ──► repetition penalty ──► top-k ──► top-p ──► softmax
//! ```
//!
//! Masked candidates carry `-inf` between stages and probability exactly 0 in
//! the final [`Distribution`].

use crate::{generation::SamplingParams, validation::Validator, CoreError, Result};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Dense probability vector indexed by token id
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    probs: Vec<f32>,
}

impl Distribution {
    /// Wrap raw probabilities. No normalization is performed; the sampler
    /// re-checks the mass before drawing.
    pub fn from_probs(probs: Vec<f32>) -> Self {
        Self { probs }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.probs
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Number of candidates with non-zero probability
    pub fn support_size(&self) -> usize {
        self.probs.iter().filter(|&&p| p > 0.0).count()
    }

    /// Token id with the highest probability, lowest id on ties
    pub fn argmax(&self) -> Option<u32> {
        self.probs
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, &p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((idx, p)),
            })
            .map(|(idx, _)| idx as u32)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.probs
    }
}

/// Shape one row of scores into a distribution.
///
/// `history` is the full token sequence so far (prompt included); each id in
/// it is penalized once no matter how often it occurs.
pub fn shape(scores: &[f32], params: &SamplingParams, history: &[u32]) -> Result<Distribution> {
    Validator::validate_generation_params(
        None,
        Some(params.temperature),
        Some(params.top_p),
        Some(params.repetition_penalty),
    )?;

    if scores.is_empty() {
        return Err(CoreError::degenerate(
            "DEGENERATE_EMPTY_SCORES",
            "Cannot shape an empty score vector",
            "Distribution shaping",
        ));
    }

    let mut logits: Vec<f32> = scores.iter().map(|&s| s / params.temperature).collect();
    if let Some(idx) = logits.iter().position(|x| x.is_nan() || *x == f32::INFINITY) {
        return Err(CoreError::degenerate(
            "DEGENERATE_NON_FINITE_SCORES",
            format!(
                "Score for token {} is {} after temperature scaling",
                idx, logits[idx]
            ),
            "Distribution shaping",
        ));
    }

    apply_repetition_penalty(&mut logits, history, params.repetition_penalty);
    apply_top_k_filtering(&mut logits, params.top_k);
    if params.top_p < 1.0 {
        apply_top_p_filtering(&mut logits, params.top_p)?;
    }

    softmax(&logits).map(Distribution::from_probs)
}

/// Penalize every distinct id in `history`.
///
/// Positive scores are divided and negative scores multiplied, so a penalty
/// above 1 always moves a repeated token's score down and one below 1 always
/// moves it up. A score of exactly zero gets no penalty, and `-inf` stays
/// masked. Finite scores saturate at `f32::MAX` / `f32::MIN` so a tiny
/// penalty turns the token into the point mass instead of overflowing.
pub fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }

    let seen: HashSet<u32> = history.iter().copied().collect();
    for token in seen {
        let Some(logit) = logits.get_mut(token as usize) else {
            continue;
        };
        if !logit.is_finite() || *logit == 0.0 {
            continue;
        }
        *logit = if *logit > 0.0 {
            (*logit / penalty).min(f32::MAX)
        } else {
            (*logit * penalty).max(f32::MIN)
        };
    }
}

/// Keep exactly `top_k` candidates (score descending, token id ascending on
/// ties); everything else becomes `-inf`. `0` disables the filter.
pub fn apply_top_k_filtering(logits: &mut [f32], top_k: usize) {
    if top_k == 0 || top_k >= logits.len() {
        return;
    }

    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.select_nth_unstable_by(top_k, |&a, &b| rank(logits, a, b));
    for &idx in &order[top_k..] {
        logits[idx] = f32::NEG_INFINITY;
    }
}

/// Nucleus filtering.
///
/// Surviving candidates are ranked like top-k and accumulated by softmax
/// mass. The kept set runs up to and including the first candidate whose
/// cumulative mass reaches `top_p`, so it is the smallest prefix with mass
/// `>= top_p` and always holds the best candidate.
pub fn apply_top_p_filtering(logits: &mut [f32], top_p: f32) -> Result<()> {
    let mut order: Vec<usize> = (0..logits.len())
        .filter(|&i| logits[i] > f32::NEG_INFINITY)
        .collect();
    if order.is_empty() {
        return Err(all_masked("Nucleus filtering"));
    }
    order.sort_unstable_by(|&a, &b| rank(logits, a, b));

    let max_logit = logits[order[0]];
    let weights: Vec<f64> = order
        .iter()
        .map(|&i| f64::from(logits[i] - max_logit).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let threshold = f64::from(top_p);
    let mut cumulative = 0.0;
    let mut cutoff = order.len();
    for (pos, w) in weights.iter().enumerate() {
        cumulative += w / total;
        if cumulative >= threshold {
            cutoff = pos + 1;
            break;
        }
    }

    for &idx in &order[cutoff..] {
        logits[idx] = f32::NEG_INFINITY;
    }
    Ok(())
}

/// Softmax over the entries that are not `-inf`; masked entries map to 0.
pub fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    if max_logit == f32::NEG_INFINITY {
        return Err(all_masked("Normalization"));
    }

    let exps: Vec<f64> = logits
        .iter()
        .map(|&x| {
            if x == f32::NEG_INFINITY {
                0.0
            } else {
                f64::from(x - max_logit).exp()
            }
        })
        .collect();
    // The max entry contributes exp(0) = 1, so the sum is at least 1
    let sum: f64 = exps.iter().sum();

    Ok(exps.into_iter().map(|e| (e / sum) as f32).collect())
}

/// Score descending, then token id ascending
fn rank(logits: &[f32], a: usize, b: usize) -> Ordering {
    logits[b].total_cmp(&logits[a]).then(a.cmp(&b))
}

fn all_masked(stage: &str) -> CoreError {
    CoreError::degenerate(
        "DEGENERATE_ALL_MASKED",
        "Every candidate was masked; no probability mass remains",
        stage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use proptest::prelude::*;

    fn params(temperature: f32, top_p: f32, top_k: usize, penalty: f32) -> SamplingParams {
        SamplingParams {
            max_tokens: 1,
            temperature,
            top_p,
            top_k,
            repetition_penalty: penalty,
            stop: Vec::new(),
            seed: None,
        }
    }

    fn assert_normalized(dist: &Distribution) {
        let sum: f32 = dist.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum was {sum}");
        assert!(dist.as_slice().iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_softmax() {
        let probs = softmax(&[1.0, 2.0, 3.0]).unwrap();
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_masked_entries_are_zero() {
        let probs = softmax(&[f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY, 0.0]).unwrap();
        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[2], 0.0);
        assert!((probs[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_filtering() {
        let mut logits = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        apply_top_k_filtering(&mut logits, 3);

        assert_eq!(logits[4], 5.0);
        assert_eq!(logits[3], 4.0);
        assert_eq!(logits[2], 3.0);
        assert_eq!(logits[1], f32::NEG_INFINITY);
        assert_eq!(logits[0], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_k_ties_prefer_lower_ids() {
        let mut logits = vec![1.0, 2.0, 2.0, 2.0, 0.5];
        apply_top_k_filtering(&mut logits, 2);
        assert_eq!(logits, vec![f32::NEG_INFINITY, 2.0, 2.0, f32::NEG_INFINITY, f32::NEG_INFINITY]);
    }

    #[test]
    fn test_top_k_zero_is_noop() {
        let mut logits = vec![0.3, -1.0, 2.0];
        apply_top_k_filtering(&mut logits, 0);
        assert_eq!(logits, vec![0.3, -1.0, 2.0]);
    }

    #[test]
    fn test_top_p_keeps_crossing_candidate() {
        // probs ~ [0.6652, 0.2447, 0.0900]: 0.6652 < 0.7 so the second
        // candidate is needed to reach the threshold and is kept.
        let mut logits = vec![2.0, 1.0, 0.0];
        apply_top_p_filtering(&mut logits, 0.7).unwrap();
        assert_eq!(logits[0], 2.0);
        assert_eq!(logits[1], 1.0);
        assert_eq!(logits[2], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_p_exact_boundary_stops_at_reaching_candidate() {
        let mut logits = vec![0.0, 0.0, 0.0, 0.0];
        apply_top_p_filtering(&mut logits, 0.5).unwrap();
        assert_eq!(logits.iter().filter(|x| x.is_finite()).count(), 2);
        assert!(logits[0].is_finite() && logits[1].is_finite());
    }

    #[test]
    fn test_top_p_near_zero_keeps_only_best() {
        let dist = shape(&[0.5, 3.0, 2.9, -1.0], &params(1.0, 1e-6, 0, 1.0), &[]).unwrap();
        assert_eq!(dist.support_size(), 1);
        assert_eq!(dist.as_slice()[1], 1.0);
    }

    #[test]
    fn test_top_p_one_is_noop() {
        let scores = [0.1, 0.2, 0.3, 0.4];
        let shaped = shape(&scores, &params(1.0, 1.0, 0, 1.0), &[]).unwrap();
        let plain = softmax(&scores).unwrap();
        assert_eq!(shaped.as_slice(), plain.as_slice());
    }

    #[test]
    fn test_temperature_sharpens() {
        let scores = [1.0, 2.0];
        let hot = shape(&scores, &params(2.0, 1.0, 0, 1.0), &[]).unwrap();
        let cold = shape(&scores, &params(0.5, 1.0, 0, 1.0), &[]).unwrap();
        assert!(cold.as_slice()[1] > hot.as_slice()[1]);
    }

    #[test]
    fn test_non_positive_temperature_rejected() {
        for t in [0.0, -1.0] {
            let err = shape(&[1.0, 2.0], &params(t, 1.0, 0, 1.0), &[]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn test_repetition_penalty_applied_once_per_id() {
        let mut once = vec![2.0, -2.0, 1.0];
        let mut many = once.clone();
        apply_repetition_penalty(&mut once, &[0, 1], 2.0);
        apply_repetition_penalty(&mut many, &[0, 0, 0, 1, 1], 2.0);
        assert_eq!(once, many);
        assert_eq!(once, vec![1.0, -4.0, 1.0]);
    }

    #[test]
    fn test_repetition_penalty_below_one_encourages() {
        let mut logits = vec![2.0, -2.0, 1.0];
        apply_repetition_penalty(&mut logits, &[0, 1], 0.5);
        assert_eq!(logits, vec![4.0, -1.0, 1.0]);
    }

    #[test]
    fn test_repetition_penalty_zero_score_unchanged() {
        let mut logits = vec![0.0, f32::NEG_INFINITY, 1.0];
        apply_repetition_penalty(&mut logits, &[0, 1], 3.0);
        assert_eq!(logits, vec![0.0, f32::NEG_INFINITY, 1.0]);
    }

    #[test]
    fn test_tiny_penalty_saturates_instead_of_overflowing() {
        let mut logits = vec![10.0, 1.0, 0.5];
        apply_repetition_penalty(&mut logits, &[0], 1e-38);
        assert_eq!(logits[0], f32::MAX);

        let dist = shape(&[10.0, 1.0, 0.5], &params(1.0, 1.0, 0, 1e-38), &[0]).unwrap();
        assert_normalized(&dist);
        assert_eq!(dist.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tiny_penalty_on_several_tokens_splits_mass() {
        let dist = shape(&[10.0, 5.0, 0.5], &params(1.0, 1.0, 0, 1e-38), &[0, 1]).unwrap();
        assert_normalized(&dist);
        assert_eq!(dist.as_slice(), &[0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_huge_penalty_keeps_negative_scores_finite() {
        let mut logits = vec![-10.0, 1.0];
        apply_repetition_penalty(&mut logits, &[0], 1e38);
        assert_eq!(logits[0], f32::MIN);

        let dist = shape(&[-10.0, 1.0], &params(1.0, 1.0, 0, 1e38), &[0]).unwrap();
        assert_normalized(&dist);
        assert_eq!(dist.argmax(), Some(1));
    }

    #[test]
    fn test_repetition_penalty_ignores_out_of_range_ids() {
        let mut logits = vec![1.0, 1.0];
        apply_repetition_penalty(&mut logits, &[7], 2.0);
        assert_eq!(logits, vec![1.0, 1.0]);
    }

    #[test]
    fn test_all_masked_is_degenerate() {
        let scores = [f32::NEG_INFINITY; 4];
        let err = shape(&scores, &params(1.0, 0.5, 2, 1.0), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateDistribution);
        assert_eq!(err.code(), "DEGENERATE_ALL_MASKED");
    }

    #[test]
    fn test_nan_scores_are_degenerate() {
        let err = shape(&[0.0, f32::NAN], &params(1.0, 1.0, 0, 1.0), &[]).unwrap_err();
        assert_eq!(err.code(), "DEGENERATE_NON_FINITE_SCORES");
    }

    #[test]
    fn test_overflowing_temperature_is_degenerate() {
        let err = shape(&[1.0, 2.0], &params(1e-40, 1.0, 0, 1.0), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateDistribution);
    }

    #[test]
    fn test_empty_scores_are_degenerate() {
        let err = shape(&[], &params(1.0, 1.0, 0, 1.0), &[]).unwrap_err();
        assert_eq!(err.code(), "DEGENERATE_EMPTY_SCORES");
    }

    #[test]
    fn test_argmax_prefers_lower_id() {
        let dist = Distribution::from_probs(vec![0.25, 0.375, 0.375]);
        assert_eq!(dist.argmax(), Some(1));
    }

    proptest! {
        #[test]
        fn prop_shaped_distribution_is_normalized(
            scores in prop::collection::vec(-20.0f32..20.0, 1..64),
            temperature in 0.05f32..4.0,
            top_p in 0.01f32..=1.0,
            top_k in 0usize..80,
            penalty in prop_oneof![1e-38f32..1e-30, 0.2f32..3.0, 1e30f32..1e38],
            history in prop::collection::vec(0u32..64, 0..16),
        ) {
            let dist = shape(&scores, &params(temperature, top_p, top_k, penalty), &history).unwrap();
            prop_assert_eq!(dist.len(), scores.len());
            let sum: f32 = dist.as_slice().iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-4);
            prop_assert!(dist.as_slice().iter().all(|&p| p >= 0.0));
            if top_k > 0 {
                prop_assert!(dist.support_size() <= top_k);
            }
        }

        #[test]
        fn prop_penalty_moves_repeated_scores(
            scores in prop::collection::vec(-10.0f32..10.0, 2..32),
            temperature in 0.1f32..3.0,
            penalty in 1.01f32..4.0,
        ) {
            let scaled: Vec<f32> = scores.iter().map(|s| s / temperature).collect();
            let history = [0u32];

            let mut punished = scaled.clone();
            apply_repetition_penalty(&mut punished, &history, penalty);
            let mut encouraged = scaled.clone();
            apply_repetition_penalty(&mut encouraged, &history, 1.0 / penalty);

            // Tiny magnitudes can round back onto themselves
            if scaled[0].abs() > 1e-6 {
                prop_assert!(punished[0] < scaled[0]);
                prop_assert!(encouraged[0] > scaled[0]);
            }
            prop_assert_eq!(&punished[1..], &scaled[1..]);
        }
    }

    #[test]
    fn test_distribution_normalized_with_every_stage_enabled() {
        let scores: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin() * 4.0).collect();
        let dist = shape(&scores, &params(0.8, 0.9, 10, 1.3), &[1, 2, 3, 3]).unwrap();
        assert_normalized(&dist);
        assert!(dist.support_size() <= 10);
    }
}
