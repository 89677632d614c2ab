use crate::{
    epidemic::{PlaceOfDeath, SymptomSeverity},
    error::Problem,
    prelude::{Age, Day, Id, Real},
};
use getset::CopyGetters;

/// Hard cap on the per-agent infectee list. Overflow aborts the simulation.
pub const MAX_INFECTEES: usize = 64;

/// Hard cap on daily contacts for a single agent.
pub const MAX_CONTACTS: usize = 128;

/// Days between vaccination and the onset of its protective effect.
pub const VACCINATION_DELAY: Day = 14;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PersonState {
    Susceptible,
    Incubation,
    Illness,
    Hospitalized,
    InIcu,
    Recovered,
    Dead,
}

impl PersonState {
    /// States that imply an active infection.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PersonState::Incubation
                | PersonState::Illness
                | PersonState::Hospitalized
                | PersonState::InIcu
        )
    }

    pub fn is_removed(self) -> bool {
        matches!(self, PersonState::Recovered | PersonState::Dead)
    }

    pub fn in_care(self) -> bool {
        matches!(self, PersonState::Hospitalized | PersonState::InIcu)
    }

    pub fn name(self) -> &'static str {
        match self {
            PersonState::Susceptible => "susceptible",
            PersonState::Incubation => "incubation",
            PersonState::Illness => "illness",
            PersonState::Hospitalized => "hospitalized",
            PersonState::InIcu => "in-icu",
            PersonState::Recovered => "recovered",
            PersonState::Dead => "dead",
        }
    }
}

impl Default for PersonState {
    fn default() -> Self {
        PersonState::Susceptible
    }
}

/// One simulated individual. The day loop drives all transitions; the struct
/// itself only holds state and the small bookkeeping helpers.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Person {
    pub(crate) idx: Id,
    pub(crate) age: Age,
    pub(crate) state: PersonState,
    pub(crate) severity: SymptomSeverity,
    pub(crate) place_of_death: PlaceOfDeath,

    pub(crate) is_infected: bool,
    pub(crate) has_immunity: bool,
    pub(crate) was_detected: bool,
    pub(crate) queued_for_testing: bool,
    pub(crate) included_in_totals: bool,

    pub(crate) variant: usize,
    pub(crate) day_of_infection: Day,
    pub(crate) day_of_illness: Day,
    pub(crate) days_left: Day,
    pub(crate) days_from_onset_to_removed: Real,
    pub(crate) day_of_vaccination: Day,

    pub(crate) other_people_infected: u32,
    pub(crate) other_people_exposed_today: u32,
    pub(crate) max_contacts_per_day: u32,

    pub(crate) infector: Option<Id>,
    /// Materialized only while contact tracing is active; at most
    /// [`MAX_INFECTEES`] entries.
    #[getset(skip)]
    pub(crate) infectees: Option<Vec<Id>>,
}

impl Person {
    pub fn new(idx: Id, age: Age) -> Self {
        Person {
            idx,
            age,
            state: PersonState::Susceptible,
            severity: SymptomSeverity::Asymptomatic,
            place_of_death: PlaceOfDeath::default(),
            is_infected: false,
            has_immunity: false,
            was_detected: false,
            queued_for_testing: false,
            included_in_totals: true,
            variant: 0,
            day_of_infection: -1,
            day_of_illness: 0,
            days_left: 0,
            days_from_onset_to_removed: 0.0,
            day_of_vaccination: -1,
            other_people_infected: 0,
            other_people_exposed_today: 0,
            max_contacts_per_day: 0,
            infector: None,
            infectees: None,
        }
    }

    pub fn is_susceptible(&self) -> bool {
        self.state == PersonState::Susceptible && !self.has_immunity
    }

    /// Indexes of people this person infected, when tracked.
    pub fn infectees(&self) -> Option<&[Id]> {
        self.infectees.as_deref()
    }

    /// Day offset into the infectiousness profile: negative during
    /// incubation, the illness day afterwards. `None` when not shedding.
    pub fn infection_day_offset(&self) -> Option<Day> {
        match self.state {
            PersonState::Incubation => Some(-self.days_left),
            PersonState::Illness => Some(self.day_of_illness),
            _ => None,
        }
    }

    pub fn is_vaccinated(&self) -> bool {
        self.day_of_vaccination >= 0
    }

    pub fn vaccinate(&mut self, day: Day) {
        self.day_of_vaccination = day;
    }

    /// Multiplier applied to the severe/critical/fatal severity thresholds.
    /// Protection starts [`VACCINATION_DELAY`] days after the dose.
    pub fn vaccination_modifier(&self, today: Day, efficacy: Real) -> Real {
        if self.day_of_vaccination >= 0 && today - self.day_of_vaccination >= VACCINATION_DELAY {
            return 1.0 - efficacy;
        }
        return 1.0;
    }

    /// Append to the infectee list when it is materialized.
    pub(crate) fn record_infectee(&mut self, id: Id) -> Result<(), Problem> {
        if let Some(list) = self.infectees.as_mut() {
            if list.len() >= MAX_INFECTEES {
                return Err(Problem::TooManyInfectees);
            }
            list.push(id);
        }
        return Ok(());
    }

    pub(crate) fn reset_daily(&mut self) {
        self.other_people_exposed_today = 0;
    }

    pub(crate) fn note_contacts(&mut self, n: u32) {
        self.max_contacts_per_day = self.max_contacts_per_day.max(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_person_is_susceptible() {
        let p = Person::new(3, 42);
        assert_eq!(p.state(), PersonState::Susceptible);
        assert!(p.is_susceptible());
        assert!(!p.is_infected());
        assert!(!p.is_vaccinated());
        assert_eq!(p.infection_day_offset(), None);
    }

    #[test]
    fn vaccination_kicks_in_after_delay() {
        let mut p = Person::new(0, 70);
        p.vaccinate(10);
        assert_eq!(p.vaccination_modifier(10, 0.9), 1.0);
        assert_eq!(p.vaccination_modifier(23, 0.9), 1.0);
        assert!((p.vaccination_modifier(24, 0.9) - 0.1).abs() < 1e-12);
        assert!((p.vaccination_modifier(80, 0.9) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn infection_day_offset_by_state() {
        let mut p = Person::new(0, 30);
        p.state = PersonState::Incubation;
        p.days_left = 3;
        assert_eq!(p.infection_day_offset(), Some(-3));
        p.state = PersonState::Illness;
        p.day_of_illness = 2;
        assert_eq!(p.infection_day_offset(), Some(2));
        p.state = PersonState::Hospitalized;
        assert_eq!(p.infection_day_offset(), None);
    }

    #[test]
    fn infectee_list_is_bounded() {
        let mut p = Person::new(0, 30);
        // not materialized: recording is a no-op
        assert!(p.record_infectee(1).is_ok());
        assert!(p.infectees().is_none());

        p.infectees = Some(vec![]);
        for i in 0..MAX_INFECTEES {
            assert!(p.record_infectee(i).is_ok());
        }
        assert_eq!(p.record_infectee(99), Err(Problem::TooManyInfectees));
        assert_eq!(p.infectees().unwrap().len(), MAX_INFECTEES);
    }
}
