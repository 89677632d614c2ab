use crate::{
    agent::{Person, PersonState},
    epidemic::AgeRange,
    error::{Error, Result},
    prelude::{Age, Id},
    rng::RandomPool,
};
use rand::seq::SliceRandom;
use rayon::prelude::*;

/// Agent storage plus the age index used for O(1) sampling of a contact in
/// a given age bracket. Per-age aggregate counters are maintained
/// incrementally by the day loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    people: Vec<Person>,
    // person indexes grouped by age; random order within each age group
    sorted_by_age: Vec<Id>,
    // prefix offsets into sorted_by_age, one entry per age plus a sentinel
    age_start: Vec<usize>,

    initial: Vec<u32>,
    pub(crate) infected: Vec<u32>,
    pub(crate) all_infected: Vec<u32>,
    pub(crate) detected: Vec<u32>,
    pub(crate) all_detected: Vec<u32>,
    pub(crate) recovered: Vec<u32>,
    pub(crate) dead: Vec<u32>,
    pub(crate) hospitalized: Vec<u32>,
    pub(crate) in_icu: Vec<u32>,
    pub(crate) vaccinated: Vec<u32>,
}

impl Population {
    /// Build a population from an age histogram. Ages are immutable; the age
    /// index is built once by shuffling and then age-sorting.
    pub fn new(age_counts: &[u32], pool: &mut RandomPool) -> Result<Self> {
        if age_counts.is_empty() || age_counts.len() > Age::MAX as usize + 1 {
            return Err(Error::bad_parameter("age histogram out of range"));
        }
        let total: usize = age_counts.iter().map(|&n| n as usize).sum();
        if total == 0 {
            return Err(Error::bad_parameter("population must not be empty"));
        }

        let mut people = Vec::with_capacity(total);
        for (age, &count) in age_counts.iter().enumerate() {
            for _ in 0..count {
                people.push(Person::new(people.len(), age as Age));
            }
        }

        let mut sorted_by_age: Vec<Id> = (0..total).collect();
        sorted_by_age.shuffle(pool.rng());
        let ages: Vec<Age> = people.iter().map(|p| p.age()).collect();
        sorted_by_age.par_sort_by_key(|&id| ages[id]);

        let nr_ages = age_counts.len();
        let mut age_start = Vec::with_capacity(nr_ages + 1);
        let mut offset = 0;
        for &count in age_counts {
            age_start.push(offset);
            offset += count as usize;
        }
        age_start.push(offset);

        return Ok(Population {
            people,
            sorted_by_age,
            age_start,
            initial: age_counts.to_vec(),
            infected: vec![0; nr_ages],
            all_infected: vec![0; nr_ages],
            detected: vec![0; nr_ages],
            all_detected: vec![0; nr_ages],
            recovered: vec![0; nr_ages],
            dead: vec![0; nr_ages],
            hospitalized: vec![0; nr_ages],
            in_icu: vec![0; nr_ages],
            vaccinated: vec![0; nr_ages],
        });
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn nr_ages(&self) -> usize {
        self.initial.len()
    }

    pub fn person(&self, id: Id) -> &Person {
        &self.people[id]
    }

    pub fn person_mut(&mut self, id: Id) -> &mut Person {
        &mut self.people[id]
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn full_age_range(&self) -> AgeRange {
        AgeRange::new(0, (self.nr_ages() - 1) as Age)
    }

    pub fn initial_count(&self, age: Age) -> u32 {
        self.initial[age as usize]
    }

    pub fn initial_counts(&self) -> &[u32] {
        &self.initial
    }

    /// Current susceptibles per age, derived from conservation.
    pub fn susceptible_by_age(&self) -> Vec<u32> {
        (0..self.nr_ages())
            .map(|a| self.initial[a] - self.infected[a] - self.recovered[a] - self.dead[a])
            .collect()
    }

    pub fn random_id(&self, pool: &mut RandomPool) -> Id {
        pool.below(self.people.len())
    }

    /// Uniform pick among people in the (inclusive) age interval.
    pub fn random_in_age_range(&self, ages: AgeRange, pool: &mut RandomPool) -> Option<Id> {
        let lo = self.age_start[ages.min as usize];
        let hi = self.age_start[(ages.max as usize + 1).min(self.nr_ages())];
        if lo >= hi {
            return None;
        }
        return Some(self.sorted_by_age[lo + pool.below(hi - lo)]);
    }

    /// The age-grouped index slice for an interval, oldest last.
    pub fn age_index(&self, ages: AgeRange) -> &[Id] {
        let lo = self.age_start[ages.min as usize];
        let hi = self.age_start[(ages.max as usize + 1).min(self.nr_ages())];
        &self.sorted_by_age[lo..hi]
    }

    // Counter transitions. Callers keep these in lockstep with the actual
    // person state; `census` recounts from scratch for verification.

    pub(crate) fn count_infection(&mut self, age: Age, included: bool) {
        self.infected[age as usize] += 1;
        if included {
            self.all_infected[age as usize] += 1;
        }
    }

    pub(crate) fn count_detection(&mut self, age: Age, included: bool) {
        self.detected[age as usize] += 1;
        if included {
            self.all_detected[age as usize] += 1;
        }
    }

    pub(crate) fn count_recovery(&mut self, age: Age, was_detected: bool) {
        self.infected[age as usize] -= 1;
        self.recovered[age as usize] += 1;
        if was_detected {
            self.detected[age as usize] -= 1;
        }
    }

    pub(crate) fn count_death(&mut self, age: Age, was_infected: bool, was_detected: bool) {
        if was_infected {
            self.infected[age as usize] -= 1;
        }
        if was_detected {
            self.detected[age as usize] -= 1;
        }
        self.dead[age as usize] += 1;
    }

    pub(crate) fn count_hospital_admission(&mut self, age: Age) {
        self.hospitalized[age as usize] += 1;
    }

    pub(crate) fn count_hospital_discharge(&mut self, age: Age) {
        self.hospitalized[age as usize] -= 1;
    }

    pub(crate) fn count_icu_admission(&mut self, age: Age) {
        self.in_icu[age as usize] += 1;
    }

    pub(crate) fn count_icu_discharge(&mut self, age: Age) {
        self.in_icu[age as usize] -= 1;
    }

    pub(crate) fn count_vaccination(&mut self, age: Age) {
        self.vaccinated[age as usize] += 1;
    }

    /// Recount every aggregate from the person array. Used to verify that
    /// the incremental counters never drift.
    pub fn census(&self) -> Census {
        let nr_ages = self.nr_ages();
        let empty = || Census {
            susceptible: vec![0; nr_ages],
            infected: vec![0; nr_ages],
            recovered: vec![0; nr_ages],
            dead: vec![0; nr_ages],
            hospitalized: vec![0; nr_ages],
            in_icu: vec![0; nr_ages],
            detected: vec![0; nr_ages],
            vaccinated: vec![0; nr_ages],
        };
        self.people
            .par_iter()
            .fold(empty, |mut acc, p| {
                let a = p.age() as usize;
                match p.state() {
                    PersonState::Susceptible => acc.susceptible[a] += 1,
                    PersonState::Incubation | PersonState::Illness => acc.infected[a] += 1,
                    PersonState::Hospitalized => {
                        acc.infected[a] += 1;
                        acc.hospitalized[a] += 1;
                    }
                    PersonState::InIcu => {
                        acc.infected[a] += 1;
                        acc.in_icu[a] += 1;
                    }
                    PersonState::Recovered => acc.recovered[a] += 1,
                    PersonState::Dead => acc.dead[a] += 1,
                }
                if p.was_detected() && p.state().is_active() {
                    acc.detected[a] += 1;
                }
                if p.is_vaccinated() {
                    acc.vaccinated[a] += 1;
                }
                return acc;
            })
            .reduce(empty, |mut a, b| {
                a.merge(&b);
                return a;
            })
    }
}

/// Per-age recount of the population, independent of the incremental
/// counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Census {
    pub susceptible: Vec<u32>,
    pub infected: Vec<u32>,
    pub recovered: Vec<u32>,
    pub dead: Vec<u32>,
    pub hospitalized: Vec<u32>,
    pub in_icu: Vec<u32>,
    pub detected: Vec<u32>,
    pub vaccinated: Vec<u32>,
}

impl Census {
    fn merge(&mut self, other: &Census) {
        let pairs = [
            (&mut self.susceptible, &other.susceptible),
            (&mut self.infected, &other.infected),
            (&mut self.recovered, &other.recovered),
            (&mut self.dead, &other.dead),
            (&mut self.hospitalized, &other.hospitalized),
            (&mut self.in_icu, &other.in_icu),
            (&mut self.detected, &other.detected),
            (&mut self.vaccinated, &other.vaccinated),
        ];
        for (mine, theirs) in pairs {
            for (x, y) in mine.iter_mut().zip(theirs) {
                *x += y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_counts(nr_ages: usize, per_age: u32) -> Vec<u32> {
        vec![per_age; nr_ages]
    }

    #[test]
    fn construction_builds_age_index() {
        let mut pool = RandomPool::new(42);
        let pop = Population::new(&uniform_counts(100, 50), &mut pool).unwrap();
        assert_eq!(pop.len(), 5000);
        assert_eq!(pop.nr_ages(), 100);

        // the index is grouped by age with correct offsets
        for age in 0..100u8 {
            for &id in pop.age_index(AgeRange::new(age, age)) {
                assert_eq!(pop.person(id).age(), age);
            }
            assert_eq!(pop.age_index(AgeRange::new(age, age)).len(), 50);
        }
    }

    #[test]
    fn age_index_is_shuffled_within_groups() {
        let mut pool = RandomPool::new(7);
        let pop = Population::new(&uniform_counts(10, 100), &mut pool).unwrap();
        let group = pop.age_index(AgeRange::new(3, 3));
        let ascending = group.windows(2).all(|w| w[0] < w[1]);
        assert!(!ascending);
    }

    #[test]
    fn random_in_age_range_respects_bounds() {
        let mut pool = RandomPool::new(3);
        let mut counts = vec![0u32; 100];
        counts[20] = 10;
        counts[70] = 5;
        let pop = Population::new(&counts, &mut pool).unwrap();

        for _ in 0..100 {
            let id = pop
                .random_in_age_range(AgeRange::new(60, 99), &mut pool)
                .unwrap();
            assert_eq!(pop.person(id).age(), 70);
        }
        assert!(pop
            .random_in_age_range(AgeRange::new(30, 40), &mut pool)
            .is_none());
    }

    #[test]
    fn census_matches_fresh_population() {
        let mut pool = RandomPool::new(11);
        let counts = uniform_counts(20, 30);
        let pop = Population::new(&counts, &mut pool).unwrap();
        let census = pop.census();
        assert_eq!(census.susceptible, counts);
        assert_eq!(census.infected, vec![0; 20]);
        assert_eq!(census.dead, vec![0; 20]);
        assert_eq!(pop.susceptible_by_age(), counts);
    }

    #[test]
    fn empty_histogram_is_rejected() {
        let mut pool = RandomPool::new(1);
        assert!(Population::new(&[], &mut pool).is_err());
        assert!(Population::new(&[0, 0, 0], &mut pool).is_err());
    }
}
