//! A fixed-size set of individuals.

use rand::Rng;

use kinema_core::config::Objective;
use kinema_core::error::{EvolutionError, KinemaError};
use kinema_ik::cache::ChainCache;
use kinema_ik::solver::target::TargetSet;

use crate::individual::Individual;
use crate::operator::Operator;
use crate::selection::ranked;

#[derive(Debug, Clone, Default)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    /// Wrap evaluated individuals.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::EmptyPopulation`] for an empty vector.
    pub fn new(individuals: Vec<Individual>) -> Result<Self, EvolutionError> {
        if individuals.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        Ok(Self { individuals })
    }

    /// `size` individuals around `origin`: an exact copy followed by
    /// `size - 1` copies varied once by `mutation`. All are evaluated.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::EmptyPopulation`] for `size == 0`; operator errors.
    pub fn seed<R: Rng + ?Sized>(
        origin: &ChainCache,
        size: usize,
        mutation: &Operator,
        targets: &TargetSet,
        rng: &mut R,
    ) -> Result<Self, KinemaError> {
        if size == 0 {
            return Err(EvolutionError::EmptyPopulation.into());
        }
        let mut first = Individual::new(origin.clone());
        first.evaluate(targets);
        let mut individuals = Vec::with_capacity(size);
        for _ in 1..size {
            let mut child = mutation.apply(&[&first], rng)?;
            child.evaluate(targets);
            individuals.push(child);
        }
        individuals.insert(0, first);
        Ok(Self { individuals })
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Individual> {
        self.individuals.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter()
    }

    /// Fitness of every individual, in order.
    pub fn fitness(&self) -> Vec<f32> {
        self.individuals.iter().map(Individual::fitness).collect()
    }

    /// The best individual under `objective`.
    pub fn best(&self, objective: Objective) -> Option<&Individual> {
        self.individuals
            .iter()
            .min_by(|a, b| objective.ordering(a.fitness(), b.fitness()))
    }

    pub fn extend(&mut self, children: impl IntoIterator<Item = Individual>) {
        self.individuals.extend(children);
    }

    /// Keep the `size` best individuals, best first.
    pub fn truncate(&mut self, size: usize, objective: Objective) {
        let order = ranked(&self.fitness(), objective);
        let mut slots: Vec<Option<Individual>> =
            self.individuals.drain(..).map(Some).collect();
        self.individuals = order
            .into_iter()
            .take(size)
            .filter_map(|i| slots[i].take())
            .collect();
    }
}
