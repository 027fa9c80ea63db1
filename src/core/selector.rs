use std::collections::HashSet;

use crate::core::scoring::compatibility_score;
use crate::models::{Profile, ScoredCandidate};

/// Check whether a profile may be offered as a candidate at all
///
/// Only active, verified profiles outside the exclusion set qualify.
/// The viewer is always excluded, whether or not the set names them.
#[inline]
pub fn is_eligible(viewer_id: &str, profile: &Profile, excluded: &HashSet<String>) -> bool {
    if !profile.is_active || !profile.is_verified {
        return false;
    }

    if profile.user_id == viewer_id {
        return false;
    }

    !excluded.contains(&profile.user_id)
}

/// Ranks a candidate pool for one viewer
///
/// # Pipeline Stages
/// 1. Eligibility (active, verified, not excluded)
/// 2. Compatibility scoring
/// 3. Stable ranking by score, ties broken by user id
/// 4. Truncation to `limit`
#[derive(Debug, Clone, Default)]
pub struct CandidateSelector;

impl CandidateSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn rank(
        &self,
        viewer: &Profile,
        pool: Vec<Profile>,
        excluded: &HashSet<String>,
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        if limit == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<ScoredCandidate> = pool
            .into_iter()
            .filter(|profile| is_eligible(&viewer.user_id, profile, excluded))
            .map(|profile| {
                let score = compatibility_score(viewer, &profile);
                ScoredCandidate { profile, score }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.profile.user_id.cmp(&b.profile.user_id))
        });

        ranked.truncate(limit);
        ranked
    }
}
