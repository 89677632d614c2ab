use crate::{
    epidemic::{AgeRange, Place},
    prelude::Real,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate snapshot of one successfully simulated day. Per-age arrays are
/// indexed by age; cumulative series are monotone across days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayState {
    pub day: u32,
    pub date: NaiveDate,

    pub susceptible: Vec<u32>,
    pub infected: Vec<u32>,
    pub all_infected: Vec<u32>,
    pub detected: Vec<u32>,
    pub all_detected: Vec<u32>,
    pub recovered: Vec<u32>,
    pub hospitalized: Vec<u32>,
    pub in_icu: Vec<u32>,
    pub dead: Vec<u32>,
    pub vaccinated: Vec<u32>,

    pub available_hospital_beds: usize,
    pub available_icu_units: usize,
    pub total_hospital_beds: usize,
    pub total_icu_units: usize,

    /// Mean secondary cases among removed infectors; 0 until six removals.
    pub r: Real,
    pub exposed_per_day: u32,
    pub ct_cases_per_day: u32,
    pub mobility_limitation: Real,
    pub daily_contacts: BTreeMap<Place, u32>,
}

fn sum(values: &[u32]) -> u64 {
    values.iter().map(|&v| v as u64).sum()
}

impl DayState {
    pub fn total_susceptible(&self) -> u64 {
        sum(&self.susceptible)
    }

    pub fn total_infected(&self) -> u64 {
        sum(&self.infected)
    }

    pub fn total_all_infected(&self) -> u64 {
        sum(&self.all_infected)
    }

    pub fn total_detected(&self) -> u64 {
        sum(&self.detected)
    }

    pub fn total_all_detected(&self) -> u64 {
        sum(&self.all_detected)
    }

    pub fn total_recovered(&self) -> u64 {
        sum(&self.recovered)
    }

    pub fn total_hospitalized(&self) -> u64 {
        sum(&self.hospitalized)
    }

    pub fn total_in_icu(&self) -> u64 {
        sum(&self.in_icu)
    }

    pub fn total_dead(&self) -> u64 {
        sum(&self.dead)
    }

    pub fn total_vaccinated(&self) -> u64 {
        sum(&self.vaccinated)
    }

    pub fn total_daily_contacts(&self) -> u64 {
        self.daily_contacts.values().map(|&v| v as u64).sum()
    }

    /// Vaccinated people within an inclusive age interval.
    pub fn vaccinated_in(&self, ages: AgeRange) -> u64 {
        let hi = (ages.max as usize + 1).min(self.vaccinated.len());
        let lo = (ages.min as usize).min(hi);
        sum(&self.vaccinated[lo..hi])
    }

    /// Alive people per age: everyone but the dead.
    pub fn population_by_age(&self) -> Vec<u32> {
        (0..self.susceptible.len())
            .map(|a| self.susceptible[a] + self.infected[a] + self.recovered[a])
            .collect()
    }
}
