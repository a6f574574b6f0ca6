//! Parent selection strategies.
//!
//! [`Selection`] is an enum with static dispatch, built from the TOML-level
//! [`SelectionConfig`]. Every strategy works on a fitness slice, returns
//! indices into it, honours the [`Objective`] and draws only from the
//! generator it is handed.
//!
//! Without replacement an index is returned at most once per call, so
//! `count` may not exceed the number of candidates.

use rand::Rng;
use rand::seq::index;

use kinema_core::config::{Objective, SelectionConfig};
use kinema_core::error::EvolutionError;

/// Keeps roulette weights finite for zero distances under minimization.
const WEIGHT_EPSILON: f32 = 1e-6;

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Every candidate equally likely.
    Uniform,
    /// Probability proportional to fitness (inverse fitness when minimizing).
    Roulette,
    /// Roulette over rank weights instead of raw fitness.
    ///
    /// Linear weights `n - rank` by default; `exponential: Some(c)` uses
    /// `c^rank`. Tied candidates share the mean of their ranks.
    Ranking { exponential: Option<f32> },
    /// Best of `size` uniformly drawn contestants.
    Tournament { size: usize },
    /// Split the ranked population into elite, middle and rest bands and
    /// fill the request from each band in proportion to its share. Elite
    /// picks are taken best first; the other bands are sampled uniformly.
    Elitism { elite_share: f32, middle_share: f32 },
}

impl From<SelectionConfig> for Selection {
    fn from(config: SelectionConfig) -> Self {
        match config {
            SelectionConfig::Uniform => Self::Uniform,
            SelectionConfig::Roulette => Self::Roulette,
            SelectionConfig::Ranking { exponential } => Self::Ranking { exponential },
            SelectionConfig::Tournament { size } => Self::Tournament { size },
            SelectionConfig::Elitism {
                elite_share,
                middle_share,
            } => Self::Elitism {
                elite_share,
                middle_share,
            },
        }
    }
}

impl Selection {
    /// Draw `count` indices into `fitness`.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::EmptyPopulation`] for an empty slice,
    /// [`EvolutionError::SampleTooLarge`] when `count` exceeds the slice
    /// without replacement, [`EvolutionError::InvalidTournamentSize`] for a
    /// zero-sized tournament.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        fitness: &[f32],
        count: usize,
        replacement: bool,
        objective: Objective,
        rng: &mut R,
    ) -> Result<Vec<usize>, EvolutionError> {
        if fitness.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        if !replacement && count > fitness.len() {
            return Err(EvolutionError::SampleTooLarge {
                requested: count,
                available: fitness.len(),
            });
        }
        match *self {
            Self::Uniform => Ok(uniform(fitness.len(), count, replacement, rng)),
            Self::Roulette => {
                let weights = fitness
                    .iter()
                    .map(|&f| match objective {
                        Objective::Maximize => f.max(0.0),
                        Objective::Minimize => 1.0 / (f.max(0.0) + WEIGHT_EPSILON),
                    })
                    .collect();
                Ok(roulette(weights, count, replacement, rng))
            }
            Self::Ranking { exponential } => {
                let weights = rank_weights(fitness, objective, exponential);
                Ok(roulette(weights, count, replacement, rng))
            }
            Self::Tournament { size } => {
                if size == 0 {
                    return Err(EvolutionError::InvalidTournamentSize(size));
                }
                Ok(tournament(fitness, size, count, replacement, objective, rng))
            }
            Self::Elitism {
                elite_share,
                middle_share,
            } => Ok(elitism(
                fitness,
                (elite_share, middle_share),
                count,
                replacement,
                objective,
                rng,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn uniform<R: Rng + ?Sized>(len: usize, count: usize, replacement: bool, rng: &mut R) -> Vec<usize> {
    if replacement {
        (0..count).map(|_| rng.gen_range(0..len)).collect()
    } else {
        index::sample(rng, len, count).into_vec()
    }
}

/// Fitness-proportional draws over non-negative weights. Falls back to a
/// uniform draw over the remaining pool when its total weight vanishes.
fn roulette<R: Rng + ?Sized>(
    weights: Vec<f32>,
    count: usize,
    replacement: bool,
    rng: &mut R,
) -> Vec<usize> {
    let mut pool: Vec<(usize, f32)> = weights
        .into_iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .enumerate()
        .collect();
    let mut chosen = Vec::with_capacity(count);
    for _ in 0..count {
        let total: f32 = pool.iter().map(|(_, w)| w).sum();
        let slot = if total > 0.0 {
            let mut ticket = rng.r#gen::<f32>() * total;
            pool.iter()
                .position(|(_, w)| {
                    ticket -= w;
                    ticket < 0.0
                })
                // Rounding can leave the ticket just above the last weight.
                .unwrap_or_else(|| pool.iter().rposition(|(_, w)| *w > 0.0).unwrap_or(0))
        } else {
            rng.gen_range(0..pool.len())
        };
        chosen.push(pool[slot].0);
        if !replacement {
            pool.remove(slot);
        }
    }
    chosen
}

fn tournament<R: Rng + ?Sized>(
    fitness: &[f32],
    size: usize,
    count: usize,
    replacement: bool,
    objective: Objective,
    rng: &mut R,
) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..fitness.len()).collect();
    let mut chosen = Vec::with_capacity(count);
    for _ in 0..count {
        let mut winner = rng.gen_range(0..pool.len());
        for _ in 1..size {
            let contestant = rng.gen_range(0..pool.len());
            if objective.better(fitness[pool[contestant]], fitness[pool[winner]]) {
                winner = contestant;
            }
        }
        chosen.push(pool[winner]);
        if !replacement {
            pool.swap_remove(winner);
        }
    }
    chosen
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn elitism<R: Rng + ?Sized>(
    fitness: &[f32],
    (elite_share, middle_share): (f32, f32),
    count: usize,
    replacement: bool,
    objective: Objective,
    rng: &mut R,
) -> Vec<usize> {
    let order = ranked(fitness, objective);
    let n = order.len();
    let elite_end = ((n as f32 * elite_share).ceil() as usize).clamp(1, n);
    let middle_end = (elite_end + (n as f32 * middle_share).round() as usize).min(n);
    let mut bands = [
        order[..elite_end].to_vec(),
        order[elite_end..middle_end].to_vec(),
        order[middle_end..].to_vec(),
    ];

    let elite_quota = ((count as f32 * elite_share).round() as usize).min(count);
    let middle_quota = ((count as f32 * middle_share).round() as usize).min(count - elite_quota);
    let quotas = [elite_quota, middle_quota, count - elite_quota - middle_quota];

    let mut chosen = Vec::with_capacity(count);
    let mut elite_cursor = 0;
    for (band, quota) in quotas.into_iter().enumerate() {
        for _ in 0..quota {
            // An exhausted band hands its quota to the next non-empty one.
            let Some(source) = (0..3)
                .map(|k| (band + k) % 3)
                .find(|&b| !bands[b].is_empty())
            else {
                return chosen;
            };
            if source == 0 {
                let pick = if replacement {
                    let pick = bands[0][elite_cursor % bands[0].len()];
                    elite_cursor += 1;
                    pick
                } else {
                    bands[0].remove(0)
                };
                chosen.push(pick);
            } else {
                let slot = rng.gen_range(0..bands[source].len());
                if replacement {
                    chosen.push(bands[source][slot]);
                } else {
                    chosen.push(bands[source].swap_remove(slot));
                }
            }
        }
    }
    chosen
}

// ---------------------------------------------------------------------------
// Ranking helpers
// ---------------------------------------------------------------------------

/// Indices sorted best first; ties keep index order.
pub(crate) fn ranked(fitness: &[f32], objective: Objective) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| objective.ordering(fitness[a], fitness[b]));
    order
}

/// Rank of every candidate, 0 for the best, with ties sharing the mean of
/// the ranks they span.
#[allow(clippy::float_cmp)]
fn tie_ranks(fitness: &[f32], objective: Objective) -> Vec<f32> {
    let order = ranked(fitness, objective);
    let mut ranks = vec![0.0; fitness.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && fitness[order[end]] == fitness[order[start]] {
            end += 1;
        }
        let mean = (start + end - 1) as f32 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = mean;
        }
        start = end;
    }
    ranks
}

fn rank_weights(fitness: &[f32], objective: Objective, exponential: Option<f32>) -> Vec<f32> {
    let n = fitness.len() as f32;
    tie_ranks(fitness, objective)
        .into_iter()
        .map(|rank| match exponential {
            Some(c) => c.powf(rank),
            None => n - rank,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::seed::seeded_rng;
    use proptest::prelude::*;

    const STRATEGIES: [Selection; 6] = [
        Selection::Uniform,
        Selection::Roulette,
        Selection::Ranking { exponential: None },
        Selection::Ranking {
            exponential: Some(0.5),
        },
        Selection::Tournament { size: 3 },
        Selection::Elitism {
            elite_share: 0.1,
            middle_share: 0.7,
        },
    ];

    #[test]
    fn from_config() {
        assert_eq!(
            Selection::from(SelectionConfig::default()),
            Selection::Tournament { size: 3 }
        );
        assert_eq!(
            Selection::from(SelectionConfig::Ranking {
                exponential: Some(0.3)
            }),
            Selection::Ranking {
                exponential: Some(0.3)
            }
        );
    }

    #[test]
    fn empty_and_oversized_requests_fail() {
        let mut rng = seeded_rng(0);
        for strategy in STRATEGIES {
            assert_eq!(
                strategy.choose(&[], 1, true, Objective::Minimize, &mut rng),
                Err(EvolutionError::EmptyPopulation)
            );
            assert_eq!(
                strategy.choose(&[1.0, 2.0], 3, false, Objective::Minimize, &mut rng),
                Err(EvolutionError::SampleTooLarge {
                    requested: 3,
                    available: 2
                })
            );
        }
        assert_eq!(
            Selection::Tournament { size: 0 }.choose(&[1.0], 1, true, Objective::Minimize, &mut rng),
            Err(EvolutionError::InvalidTournamentSize(0))
        );
    }

    #[test]
    fn roulette_uniform_fitness_is_uniform() {
        let mut rng = seeded_rng(42);
        let fitness = [1.0, 1.0, 1.0, 1.0];
        let mut counts = [0u32; 4];
        let draws = 10_000;
        for _ in 0..draws {
            let picks = Selection::Roulette
                .choose(&fitness, 2, false, Objective::Maximize, &mut rng)
                .unwrap();
            assert_ne!(picks[0], picks[1]);
            counts[picks[0]] += 1;
        }
        let expected = f64::from(draws) / 4.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| (f64::from(c) - expected).powi(2) / expected)
            .sum();
        // 3 degrees of freedom, p = 0.001.
        assert!(chi_square < 16.27, "chi-square {chi_square}, counts {counts:?}");
    }

    #[test]
    fn roulette_prefers_small_distances_when_minimizing() {
        let mut rng = seeded_rng(3);
        let fitness = [0.01, 10.0, 10.0, 10.0];
        let picks = Selection::Roulette
            .choose(&fitness, 1000, true, Objective::Minimize, &mut rng)
            .unwrap();
        let best = picks.iter().filter(|&&i| i == 0).count();
        assert!(best > 950, "best picked {best} times");
    }

    #[test]
    fn roulette_without_replacement_drains_pool() {
        let mut rng = seeded_rng(5);
        let mut picks = Selection::Roulette
            .choose(&[0.0, 3.0, 1.0], 3, false, Objective::Maximize, &mut rng)
            .unwrap();
        picks.sort_unstable();
        assert_eq!(picks, vec![0, 1, 2]);
    }

    #[test]
    fn tie_ranks_average() {
        let ranks = tie_ranks(&[2.0, 1.0, 2.0, 3.0], Objective::Minimize);
        assert_eq!(ranks, vec![1.5, 0.0, 1.5, 3.0]);
        let weights = rank_weights(&[2.0, 1.0, 2.0, 3.0], Objective::Minimize, None);
        assert_eq!(weights, vec![2.5, 4.0, 2.5, 1.0]);
    }

    #[test]
    fn exponential_ranking_favours_best() {
        let weights = rank_weights(&[5.0, 1.0, 3.0], Objective::Maximize, Some(0.5));
        assert_eq!(weights, vec![1.0, 0.25, 0.5]);
    }

    #[test]
    fn tournament_of_whole_population_picks_best() {
        let mut rng = seeded_rng(9);
        let fitness = [4.0, 0.5, 2.0];
        let picks = Selection::Tournament { size: 64 }
            .choose(&fitness, 5, true, Objective::Minimize, &mut rng)
            .unwrap();
        assert!(picks.iter().all(|&i| i == 1));
    }

    #[test]
    fn elitism_takes_elite_first() {
        let mut rng = seeded_rng(11);
        let fitness: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let strategy = Selection::Elitism {
            elite_share: 0.2,
            middle_share: 0.5,
        };
        let picks = strategy
            .choose(&fitness, 10, false, Objective::Maximize, &mut rng)
            .unwrap();
        assert_eq!(&picks[..2], &[9, 8]);
        assert!(picks[2..7].iter().all(|i| (3..=7).contains(i)));
        assert!(picks[7..].iter().all(|i| (0..=2).contains(i)));
    }

    #[test]
    fn elitism_spills_exhausted_band() {
        let mut rng = seeded_rng(12);
        let strategy = Selection::Elitism {
            elite_share: 0.1,
            middle_share: 0.9,
        };
        // Both picks are owed to the one-member middle band.
        let mut picks = strategy
            .choose(&[1.0, 2.0], 2, false, Objective::Minimize, &mut rng)
            .unwrap();
        picks.sort_unstable();
        assert_eq!(picks, vec![0, 1]);
    }

    #[test]
    fn same_seed_same_picks() {
        let fitness = [0.3, 0.9, 0.1, 0.5, 0.7];
        for strategy in STRATEGIES {
            let a = strategy
                .choose(&fitness, 4, true, Objective::Minimize, &mut seeded_rng(21))
                .unwrap();
            let b = strategy
                .choose(&fitness, 4, true, Objective::Minimize, &mut seeded_rng(21))
                .unwrap();
            assert_eq!(a, b, "{strategy:?}");
        }
    }

    proptest! {
        #[test]
        fn returns_exactly_count(
            fitness in prop::collection::vec(0.0f32..10.0, 1..24),
            fraction in 0.0f64..=1.0,
            replacement in any::<bool>(),
            seed in any::<u64>(),
        ) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = (fitness.len() as f64 * fraction).round() as usize;
            let mut rng = seeded_rng(seed);
            for strategy in STRATEGIES {
                for objective in [Objective::Minimize, Objective::Maximize] {
                    let picks = strategy
                        .choose(&fitness, count, replacement, objective, &mut rng)
                        .unwrap();
                    prop_assert_eq!(picks.len(), count);
                    prop_assert!(picks.iter().all(|&i| i < fitness.len()));
                    if !replacement {
                        let mut unique = picks.clone();
                        unique.sort_unstable();
                        unique.dedup();
                        prop_assert_eq!(unique.len(), count);
                    }
                }
            }
        }
    }
}
