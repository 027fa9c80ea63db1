use std::collections::HashSet;

use crate::models::Profile;

pub const MAJOR_WEIGHT: u8 = 30;
pub const MAX_INTEREST_SCORE: u8 = 30;
pub const POINTS_PER_SHARED_INTEREST: usize = 10;

/// Calculate a compatibility score (0-100) between two profiles
///
/// Scoring formula:
/// score = (
///     major_score +        # 30 if same major
///     year_score +         # 20 / 15 / 10 for year distance 0 / 1 / 2
///     interest_score +     # 10 per shared interest, capped at 30
///     age_score            # 20 / 15 / 10 for age gap <=1 / <=3 / <=5
/// )
///
/// Every component depends only on symmetric differences or intersections,
/// so `compatibility_score(a, b) == compatibility_score(b, a)`.
pub fn compatibility_score(profile: &Profile, candidate: &Profile) -> u8 {
    let major = major_score(&profile.major, &candidate.major);
    let year = year_score(profile.year.ordinal(), candidate.year.ordinal());
    let interests = interest_score(shared_interest_count(&profile.interests, &candidate.interests));
    let age = age_score(profile.age, candidate.age);

    major + year + interests + age
}

#[inline]
fn major_score(a: &str, b: &str) -> u8 {
    if a == b { MAJOR_WEIGHT } else { 0 }
}

#[inline]
fn year_score(a: u8, b: u8) -> u8 {
    match a.abs_diff(b) {
        0 => 20,
        1 => 15,
        2 => 10,
        _ => 0,
    }
}

#[inline]
fn interest_score(shared: usize) -> u8 {
    // Capped before narrowing so large overlaps never wrap
    (shared.saturating_mul(POINTS_PER_SHARED_INTEREST)).min(MAX_INTEREST_SCORE as usize) as u8
}

#[inline]
fn age_score(a: u8, b: u8) -> u8 {
    match a.abs_diff(b) {
        0..=1 => 20,
        2..=3 => 15,
        4..=5 => 10,
        _ => 0,
    }
}

/// Size of the set intersection of two interest lists; duplicates count once
pub fn shared_interest_count(a: &[String], b: &[String]) -> usize {
    let left: HashSet<&str> = a.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.iter().map(String::as_str).collect();
    left.intersection(&right).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Year;

    fn create_test_profile(major: &str, year: Year, age: u8, interests: &[&str]) -> Profile {
        Profile {
            user_id: "test_user".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            major: major.to_string(),
            year,
            age,
            interests: interests.iter().map(|s| s.to_string()).collect(),
            bio: None,
            is_active: true,
            is_verified: true,
        }
    }

    #[test]
    fn test_reference_pair_scores_80() {
        let a = create_test_profile("CS", Year::Graduate, 24, &["coding", "coffee"]);
        let b = create_test_profile("CS", Year::Graduate, 25, &["coffee", "music"]);

        assert_eq!(compatibility_score(&a, &b), 80);
    }

    #[test]
    fn test_perfect_score_is_100() {
        let a = create_test_profile("Physics", Year::PhD, 27, &["a", "b", "c", "d"]);
        let b = create_test_profile("Physics", Year::PhD, 27, &["a", "b", "c", "d"]);

        assert_eq!(compatibility_score(&a, &b), 100);
    }

    #[test]
    fn test_nothing_in_common_is_zero() {
        let a = create_test_profile("Physics", Year::Integrated, 18, &["chess"]);
        let b = create_test_profile("History", Year::PhD, 35, &["surfing"]);

        assert_eq!(compatibility_score(&a, &b), 0);
    }

    #[test]
    fn test_year_score() {
        assert_eq!(year_score(4, 4), 20);
        assert_eq!(year_score(4, 5), 15);
        assert_eq!(year_score(1, 3), 10);
        assert_eq!(year_score(1, 4), 0);
        assert_eq!(year_score(5, 1), 0);
    }

    #[test]
    fn test_age_score_boundaries() {
        assert_eq!(age_score(24, 25), 20);
        assert_eq!(age_score(24, 27), 15);
        assert_eq!(age_score(30, 25), 10);
        assert_eq!(age_score(18, 24), 0);
    }

    #[test]
    fn test_interest_score_is_capped() {
        assert_eq!(interest_score(0), 0);
        assert_eq!(interest_score(2), 20);
        assert_eq!(interest_score(3), 30);
        assert_eq!(interest_score(12), 30);
    }

    #[test]
    fn test_duplicate_interests_count_once() {
        let a = vec!["coffee".to_string(), "coffee".to_string()];
        let b = vec!["coffee".to_string()];

        assert_eq!(shared_interest_count(&a, &b), 1);
        assert_eq!(shared_interest_count(&b, &a), 1);
    }
}
