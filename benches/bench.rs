// Criterion benchmarks for Campus Match

use campus_match::core::{compatibility_score, CandidateSelector};
use campus_match::models::{Profile, Year};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashSet;

const MAJORS: [&str; 4] = ["Computer Science", "Physics", "Economics", "History"];
const INTERESTS: [&str; 8] = ["music", "hiking", "chess", "reading", "gaming", "cooking", "football", "art"];
const YEARS: [Year; 5] = [Year::Integrated, Year::Pg1st, Year::Pg2nd, Year::Graduate, Year::PhD];

fn create_candidate(id: usize) -> Profile {
    Profile {
        user_id: format!("user-{}", id),
        first_name: format!("User {}", id),
        last_name: String::new(),
        major: MAJORS[id % MAJORS.len()].to_string(),
        year: YEARS[id % YEARS.len()],
        age: 18 + (id % 12) as u8,
        interests: (0..3).map(|i| INTERESTS[(id + i * 3) % INTERESTS.len()].to_string()).collect(),
        bio: None,
        is_active: true,
        is_verified: id % 7 != 0,
    }
}

fn bench_compatibility_score(c: &mut Criterion) {
    let viewer = create_candidate(1);
    let candidate = create_candidate(2);

    c.bench_function("compatibility_score", |b| {
        b.iter(|| compatibility_score(black_box(&viewer), black_box(&candidate)))
    });
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_candidates");
    let selector = CandidateSelector::new();
    let viewer = create_candidate(0);

    for size in [100, 500, 1000, 5000].iter() {
        let pool: Vec<Profile> = (1..=*size).map(create_candidate).collect();
        let excluded: HashSet<String> = (1..=*size).step_by(10).map(|i| format!("user-{}", i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                selector.rank(
                    black_box(&viewer),
                    black_box(pool.clone()),
                    black_box(&excluded),
                    black_box(20),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compatibility_score, bench_rank);
criterion_main!(benches);
