use crate::{
    agent::{PersonState, MAX_CONTACTS},
    epidemic::{
        AgeRange, ContactMatrix, ContactRow, DatedIntervention, Disease, Intervention, Place,
        PlaceOfDeath, SymptomSeverity, INTERVENTION_KINDS,
    },
    error::{Error, Problem, Result},
    healthcare::{HealthcareSystem, TestingMode},
    pop::Population,
    prelude::{Day, Id, Real},
    rng::RandomPool,
    sim::DayState,
};
use chrono::{Duration, NaiveDate};
use getset::{CopyGetters, Getters};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Contact sampling per infectious agent: symptomatic illness keeps people
// home; incubation and asymptomatic illness do not.
pub(crate) const ILLNESS_CONTACT_FACTOR: Real = 0.5;
pub(crate) const ILLNESS_CONTACT_LIMIT: i64 = 5;
pub(crate) const FREE_CONTACT_FACTOR: Real = 1.0;
pub(crate) const FREE_CONTACT_LIMIT: i64 = 100;
pub(crate) const CONTACT_SIGMA: Real = 0.5;

// Contact tracing reaches the infector and infectees, then one more level.
const TRACING_DEPTH: usize = 2;

const MIN_REMOVED_FOR_R: u64 = 6;
const PLACEMENT_ATTEMPTS: usize = 1000;

/// Day-0 population condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialCondition {
    pub incubating: usize,
    pub ill: usize,
    pub dead: usize,
    pub in_ward: usize,
    pub in_icu: usize,
    pub confirmed_cases: usize,
}

/// Everything needed to construct and run a simulation. Deserializable from
/// a TOML scenario file; every field has a runnable default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub seed: u64,
    pub start_date: NaiveDate,
    pub num_days: usize,
    pub hospital_beds: usize,
    pub icu_units: usize,
    /// Histogram: people per age, ages 0..len-1.
    pub age_counts: Vec<u32>,
    pub initial: InitialCondition,
    pub disease: Disease,
    /// Contacts-per-day table; empty means the built-in default table.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<ContactRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interventions: Vec<DatedIntervention>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            num_days: 90,
            hospital_beds: 100,
            icu_units: 20,
            age_counts: vec![100; 100],
            initial: InitialCondition::default(),
            disease: Disease::default(),
            contacts: vec![],
            interventions: vec![],
        }
    }
}

impl Scenario {
    /// Decode a scenario from TOML, rejecting unknown intervention types
    /// before the full decode so the error names the offending tag.
    pub fn from_toml(data: &str) -> Result<Scenario> {
        let value: toml::Value = toml::from_str(data)?;
        if let Some(items) = value.get("interventions").and_then(|v| v.as_array()) {
            for item in items {
                if let Some(kind) = item.get("type").and_then(|v| v.as_str()) {
                    if !INTERVENTION_KINDS.contains(&kind) {
                        return Err(Error::UnknownIntervention(kind.to_string()));
                    }
                }
            }
        }
        return Ok(value.try_into::<Scenario>()?);
    }

    pub fn build(self) -> Result<Context> {
        Context::new(self)
    }
}

// Weekly imports are prorated per day with a fractional carry.
#[derive(Debug, Clone, PartialEq)]
struct WeeklyImport {
    daily: Real,
    carry: Real,
    variant: usize,
}

/// The simulation itself: owns the population, disease, contact matrix,
/// healthcare system and PRNG, and advances one day per [`Context::iterate`]
/// call. After an invariant violation the context reports the stored failure
/// on every further call.
#[derive(Getters, CopyGetters)]
pub struct Context {
    #[getset(get = "pub")]
    pop: Population,
    #[getset(get = "pub")]
    disease: Disease,
    #[getset(get = "pub")]
    contacts: ContactMatrix,
    #[getset(get = "pub")]
    healthcare: HealthcareSystem,
    pool: RandomPool,

    #[getset(get_copy = "pub")]
    start_date: NaiveDate,
    #[getset(get_copy = "pub")]
    day: u32,

    pending: Vec<DatedIntervention>,
    weekly_imports: Vec<WeeklyImport>,

    removed_count: u64,
    secondary_total: u64,
    exposed_today: u32,
    ct_today: u32,
    contacts_today: [u32; 6],

    failure: Option<(Problem, Option<Id>)>,
    #[getset(get = "pub")]
    history: Vec<DayState>,
}

impl Context {
    pub fn new(scenario: Scenario) -> Result<Self> {
        let Scenario {
            seed,
            start_date,
            hospital_beds,
            icu_units,
            age_counts,
            initial,
            disease,
            contacts,
            interventions,
            ..
        } = scenario;

        for dated in &interventions {
            dated.intervention.validate()?;
            match &dated.intervention {
                Intervention::ImportInfections { variant, .. }
                | Intervention::ImportInfectionsWeekly { variant, .. } => {
                    disease.index_of(variant.as_deref())?;
                }
                _ => {}
            }
        }

        let mut pool = RandomPool::new(seed);
        let pop = Population::new(&age_counts, &mut pool)?;
        let rows = if contacts.is_empty() {
            ContactMatrix::default_rows(pop.nr_ages())
        } else {
            contacts
        };
        let contacts = ContactMatrix::from_rows(pop.nr_ages(), rows)?;
        let healthcare = HealthcareSystem::new(hospital_beds, icu_units);

        let mut new = Context {
            pop,
            disease,
            contacts,
            healthcare,
            pool,
            start_date,
            day: 0,
            pending: interventions,
            weekly_imports: vec![],
            removed_count: 0,
            secondary_total: 0,
            exposed_today: 0,
            ct_today: 0,
            contacts_today: [0; 6],
            failure: None,
            history: vec![],
        };
        new.seed_initial(&initial)?;
        info!(
            "simulation ready: {} people, {} beds, {} ICU units",
            new.pop.len(),
            hospital_beds,
            icu_units
        );
        return Ok(new);
    }

    pub fn current_date(&self) -> NaiveDate {
        self.start_date + Duration::days(self.day as i64)
    }

    /// Advance one day. On an invariant violation the day counter is not
    /// incremented, the problem is stored and every later call returns it.
    pub fn iterate(&mut self) -> Result<DayState> {
        if let Some((problem, agent)) = self.failure {
            return Err(Error::Simulation { problem, agent });
        }
        self.exposed_today = 0;
        self.ct_today = 0;
        self.contacts_today = [0; 6];

        self.apply_interventions()?;
        self.run_imports();
        if let Err((problem, agent)) = self.run_testing() {
            self.failure = Some((problem, agent));
            return Err(Error::Simulation { problem, agent });
        }
        self.run_vaccinations();
        if let Err((problem, agent)) = self.advance_agents() {
            self.failure = Some((problem, agent));
            return Err(Error::Simulation { problem, agent });
        }

        let state = self.generate_state();
        self.history.push(state.clone());
        self.day += 1;
        debug!(
            "day {}: {} infected, {} dead, {} exposures",
            state.day,
            state.total_infected(),
            state.total_dead(),
            state.exposed_per_day
        );
        return Ok(state);
    }

    /// Run a fixed number of days.
    pub fn run(&mut self, num_days: usize) -> Result<()> {
        for _ in 0..num_days {
            self.iterate()?;
        }
        return Ok(());
    }

    /// Aggregate snapshot of the current population and healthcare state.
    pub fn generate_state(&self) -> DayState {
        let mut daily_contacts = std::collections::BTreeMap::new();
        for place in Place::ALL {
            daily_contacts.insert(place, self.contacts_today[place.index()]);
        }
        DayState {
            day: self.day,
            date: self.current_date(),
            susceptible: self.pop.susceptible_by_age(),
            infected: self.pop.infected.clone(),
            all_infected: self.pop.all_infected.clone(),
            detected: self.pop.detected.clone(),
            all_detected: self.pop.all_detected.clone(),
            recovered: self.pop.recovered.clone(),
            hospitalized: self.pop.hospitalized.clone(),
            in_icu: self.pop.in_icu.clone(),
            dead: self.pop.dead.clone(),
            vaccinated: self.pop.vaccinated.clone(),
            available_hospital_beds: self.healthcare.available_beds(),
            available_icu_units: self.healthcare.available_icu_units(),
            total_hospital_beds: self.healthcare.beds(),
            total_icu_units: self.healthcare.icu_units(),
            r: self.reproduction_number(),
            exposed_per_day: self.exposed_today,
            ct_cases_per_day: self.ct_today,
            mobility_limitation: self.contacts.mobility_limitation(),
            daily_contacts,
        }
    }

    /// Mean secondary cases among removed infectors, 0 below the cutoff.
    pub fn reproduction_number(&self) -> Real {
        if self.removed_count < MIN_REMOVED_FOR_R {
            return 0.0;
        }
        return self.secondary_total as Real / self.removed_count as Real;
    }

    /// Global per-day contact ceiling for mass-gathering limits; `None`
    /// removes the cap.
    pub fn set_mass_gathering_limit(&mut self, limit: Option<usize>) {
        self.contacts.set_mass_gathering_limit(limit);
    }

    pub(crate) fn sampling_parts(&mut self) -> (&Disease, &ContactMatrix, &mut RandomPool) {
        (&self.disease, &self.contacts, &mut self.pool)
    }

    /* Interventions and imports ********************************************/

    fn apply_interventions(&mut self) -> Result<()> {
        let today = self.current_date();
        let due: Vec<DatedIntervention> = {
            let (due, rest) = self.pending.iter().cloned().partition(|iv| iv.date <= today);
            self.pending = rest;
            due
        };
        for dated in due {
            info!("{}: applying {}", today, dated.intervention.kind());
            self.apply(&dated.intervention)?;
        }
        return Ok(());
    }

    fn apply(&mut self, intervention: &Intervention) -> Result<()> {
        let full_range = self.pop.full_age_range();
        match intervention {
            Intervention::TestAllWithSymptoms => {
                self.healthcare.set_testing_mode(TestingMode::AllWithSymptoms);
            }
            Intervention::TestOnlySevereSymptoms {
                mild_detection_rate,
            } => {
                self.healthcare
                    .set_testing_mode(TestingMode::OnlySevereSymptoms);
                self.healthcare.set_p_detected_anyway(mild_detection_rate / 100.0);
            }
            Intervention::TestWithContactTracing { efficiency } => {
                self.healthcare
                    .set_testing_mode(TestingMode::AllWithSymptomsCT);
                self.healthcare.set_p_successful_tracing(efficiency / 100.0);
            }
            Intervention::BuildNewIcuUnits { units } => {
                self.healthcare.add_icu_units(*units);
            }
            Intervention::BuildNewHospitalBeds { beds } => {
                self.healthcare.add_beds(*beds);
            }
            Intervention::ImportInfections { amount, variant } => {
                let variant = self.disease.index_of(variant.as_deref())?;
                self.import_infections(*amount, variant);
            }
            Intervention::ImportInfectionsWeekly {
                weekly_amount,
                variant,
            } => {
                let variant = self.disease.index_of(variant.as_deref())?;
                self.weekly_imports.push(WeeklyImport {
                    daily: *weekly_amount as Real / 7.0,
                    carry: 0.0,
                    variant,
                });
            }
            Intervention::LimitMobility {
                reduction,
                place,
                ages,
            } => {
                let factor = 1.0 - reduction / 100.0;
                self.contacts
                    .set_mobility_factor(factor, *place, ages.unwrap_or(full_range));
            }
            Intervention::WearMasks {
                share_of_contacts,
                place,
                ages,
            } => {
                self.contacts.set_mask_share(
                    share_of_contacts / 100.0,
                    *place,
                    ages.unwrap_or(full_range),
                );
            }
            Intervention::Vaccinate {
                weekly_vaccinations,
                min_age,
                max_age,
            } => {
                let ages = AgeRange::new(*min_age, (*max_age).min(full_range.max));
                self.healthcare
                    .add_vaccination_program(*weekly_vaccinations, ages);
            }
        }
        return Ok(());
    }

    fn run_imports(&mut self) {
        let mut imports = std::mem::take(&mut self.weekly_imports);
        for import in imports.iter_mut() {
            let total = import.daily + import.carry;
            let amount = total.floor() as usize;
            import.carry = total - amount as Real;
            self.import_infections(amount, import.variant);
        }
        self.weekly_imports = imports;
    }

    fn import_infections(&mut self, amount: usize, variant: usize) {
        for _ in 0..amount {
            match self.find_susceptible() {
                Some(id) => self.infect(id, variant, None, true),
                None => {
                    warn!("no susceptible person left for an imported infection");
                    break;
                }
            }
        }
    }

    fn find_susceptible(&mut self) -> Option<Id> {
        for _ in 0..PLACEMENT_ATTEMPTS {
            let id = self.pop.random_id(&mut self.pool);
            if self.pop.person(id).is_susceptible() {
                return Some(id);
            }
        }
        return None;
    }

    /* Testing, tracing and vaccination *************************************/

    fn run_testing(&mut self) -> std::result::Result<(), (Problem, Option<Id>)> {
        let queue = self.healthcare.take_testing_queue();
        for id in queue {
            self.pop.person_mut(id).queued_for_testing = false;
            let (detected, offset, in_care, variant) = {
                let p = self.pop.person(id);
                (
                    p.was_detected(),
                    p.infection_day_offset(),
                    p.state().in_care(),
                    p.variant(),
                )
            };
            if detected {
                continue;
            }
            let shedding = offset
                .map_or(false, |d| self.disease.variant(variant).infectiousness_at(d) > 0.0);
            if shedding || in_care {
                self.detect(id).map_err(|problem| (problem, Some(id)))?;
            }
        }
        return Ok(());
    }

    /// Mark a person detected: quarantined from now on, counted, and the
    /// starting point of contact tracing when that mode is active.
    fn detect(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (already, age, included, active) = {
            let p = self.pop.person(id);
            (
                p.was_detected(),
                p.age(),
                p.included_in_totals(),
                p.state().is_active(),
            )
        };
        if already {
            return Ok(());
        }
        self.pop.person_mut(id).was_detected = true;
        if active {
            self.pop.count_detection(age, included);
        }
        if self.healthcare.testing_mode().traces_contacts() {
            self.trace_contacts(id, 1)?;
        }
        return Ok(());
    }

    fn trace_contacts(&mut self, id: Id, level: usize) -> std::result::Result<(), Problem> {
        if level > TRACING_DEPTH {
            return Ok(());
        }
        let mut contacts: Vec<(Id, bool)> = vec![];
        {
            let p = self.pop.person(id);
            if let Some(infector) = p.infector() {
                contacts.push((infector, false));
            }
            if let Some(infectees) = p.infectees() {
                contacts.extend(infectees.iter().map(|&c| (c, true)));
            }
        }
        let p_trace = self.healthcare.p_successful_tracing();
        for (contact, is_infectee) in contacts {
            {
                let target = self.pop.person(contact);
                if is_infectee && target.infector() != Some(id) {
                    return Err(Problem::InfecteesMismatch);
                }
                if target.state() == PersonState::Dead || target.was_detected() {
                    continue;
                }
            }
            if !self.pool.chance(p_trace) {
                continue;
            }
            let fresh = !self.pop.person(contact).queued_for_testing();
            self.healthcare
                .enqueue_for_testing(self.pop.person_mut(contact));
            if fresh {
                self.ct_today += 1;
            }
            if level < TRACING_DEPTH {
                self.trace_contacts(contact, level + 1)?;
            }
        }
        return Ok(());
    }

    fn run_vaccinations(&mut self) {
        let today = self.day as Day;
        let mut programs = std::mem::take(&mut self.healthcare.programs);
        for program in programs.iter_mut() {
            let mut quota = program.take_quota();
            if quota == 0 {
                continue;
            }
            // walk the age index from the oldest age downwards
            let index = self.pop.age_index(program.ages).to_vec();
            for &id in index.iter().rev() {
                if quota == 0 {
                    break;
                }
                let person = self.pop.person_mut(id);
                if person.state() == PersonState::Dead
                    || person.is_vaccinated()
                    || person.was_detected()
                {
                    continue;
                }
                person.vaccinate(today);
                let age = person.age();
                self.pop.count_vaccination(age);
                quota -= 1;
            }
        }
        self.healthcare.programs = programs;
    }

    /* Agent state machine **************************************************/

    fn advance_agents(&mut self) -> std::result::Result<(), (Problem, Option<Id>)> {
        let n = self.pop.len();
        // randomized cyclic order avoids biasing low indexes
        let start = self.pool.below(n);
        for k in 0..n {
            let id = (start + k) % n;
            self.advance_person(id).map_err(|problem| (problem, Some(id)))?;
        }
        return Ok(());
    }

    fn advance_person(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let today = self.day as Day;
        let (state, day_of_infection, was_detected) = {
            let p = self.pop.person(id);
            (p.state(), p.day_of_infection(), p.was_detected())
        };
        match state {
            PersonState::Susceptible | PersonState::Recovered | PersonState::Dead => Ok(()),
            PersonState::Incubation => {
                // infected earlier today: their clock starts tomorrow
                if day_of_infection == today {
                    return Ok(());
                }
                self.pop.person_mut(id).reset_daily();
                if !was_detected {
                    self.expose_others(id)?;
                }
                let p = self.pop.person_mut(id);
                p.days_left -= 1;
                if p.days_left <= 0 {
                    self.begin_illness(id)?;
                }
                Ok(())
            }
            PersonState::Illness => {
                if day_of_infection == today {
                    return Ok(());
                }
                self.pop.person_mut(id).reset_daily();
                if !was_detected {
                    self.expose_others(id)?;
                }
                let p = self.pop.person_mut(id);
                p.day_of_illness += 1;
                p.days_left -= 1;
                if p.days_left <= 0 {
                    self.end_illness(id)?;
                }
                Ok(())
            }
            PersonState::Hospitalized => {
                let p = self.pop.person_mut(id);
                p.days_left -= 1;
                if p.days_left <= 0 {
                    self.end_ward_stay(id)?;
                }
                Ok(())
            }
            PersonState::InIcu => {
                let p = self.pop.person_mut(id);
                p.days_left -= 1;
                if p.days_left <= 0 {
                    self.end_icu_stay(id)?;
                }
                Ok(())
            }
        }
    }

    /* Contact/exposure engine **********************************************/

    fn expose_others(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (age, offset, severity, variant_idx, visible) = {
            let p = self.pop.person(id);
            let offset = match p.infection_day_offset() {
                Some(offset) => offset,
                None => return Err(Problem::WrongState),
            };
            (
                p.age(),
                offset,
                p.severity(),
                p.variant(),
                p.state() == PersonState::Illness && p.severity().is_symptomatic(),
            )
        };

        let avg = self.contacts.avg_contacts(age);
        let (factor, limit) = if visible {
            (ILLNESS_CONTACT_FACTOR, ILLNESS_CONTACT_LIMIT)
        } else {
            (FREE_CONTACT_FACTOR, FREE_CONTACT_LIMIT)
        };
        let desired = (factor * self.pool.lognormal(0.0, CONTACT_SIGMA) * avg).floor();
        if !desired.is_finite() || desired < 0.0 {
            return Err(Problem::NegativeContacts);
        }
        let mut wanted = (desired as i64).max(1) - 1;
        wanted = wanted.min(limit);
        if let Some(cap) = self.contacts.mass_gathering_limit() {
            wanted = wanted.min(cap as i64);
        }
        if wanted > MAX_CONTACTS as i64 {
            return Err(Problem::TooManyContacts);
        }
        if wanted <= 0 {
            return Ok(());
        }
        let wanted = wanted as usize;

        let (strength, p_wearer, p_others) = {
            let variant = self.disease.variant(variant_idx);
            let mut strength = variant.infectiousness_at(offset);
            if severity == SymptomSeverity::Asymptomatic {
                strength *= variant.p_asymptomatic_infection();
            }
            (
                strength * variant.infectiousness_multiplier(),
                variant.p_mask_protects_wearer(),
                variant.p_mask_protects_others(),
            )
        };

        let mut made = 0u32;
        for _ in 0..wanted {
            let u = self.pool.uniform();
            let slot = *self.contacts.pick_slot(age, u)?;
            let target = match self.pop.random_in_age_range(slot.contact_age, &mut self.pool) {
                Some(target) => target,
                None => continue,
            };
            if target == id {
                continue;
            }
            made += 1;
            self.contacts_today[slot.place.index()] += 1;
            self.exposed_today += 1;
            self.pop.person_mut(id).other_people_exposed_today += 1;
            self.attempt_infection(id, target, variant_idx, strength, slot.mask, p_wearer, p_others)?;
        }
        self.pop.person_mut(id).note_contacts(made);
        return Ok(());
    }

    #[allow(clippy::too_many_arguments)]
    fn attempt_infection(
        &mut self,
        source: Id,
        target: Id,
        variant_idx: usize,
        strength: Real,
        mask: Real,
        p_wearer: Real,
        p_others: Real,
    ) -> std::result::Result<(), Problem> {
        {
            let t = self.pop.person(target);
            if t.is_infected() || t.has_immunity() {
                return Ok(());
            }
        }
        let age = self.pop.person(target).age();
        let p = strength * self.disease.variant(variant_idx).p_susceptibility(age);
        if !self.pool.chance(p) {
            return Ok(());
        }
        // mask worn on this contact with probability `mask`; either side's
        // mask can avert the infection
        let a = mask * p_others;
        let b = mask * p_wearer;
        if self.pool.chance(a + b - a * b) {
            return Ok(());
        }
        self.infect(target, variant_idx, Some(source), true);
        let src = self.pop.person_mut(source);
        src.other_people_infected += 1;
        src.record_infectee(target)?;
        return Ok(());
    }

    fn infect(&mut self, id: Id, variant_idx: usize, infector: Option<Id>, runtime: bool) {
        let today = self.day as Day;
        let age = self.pop.person(id).age();
        let efficacy = self.disease.variant(variant_idx).vaccine_efficacy();
        let vmod = self.pop.person(id).vaccination_modifier(today, efficacy);
        let (severity, place) =
            self.disease
                .variant(variant_idx)
                .sample_severity(age, vmod, &mut self.pool);
        let incubation = self
            .disease
            .variant(variant_idx)
            .sample_incubation_days(&mut self.pool);
        let onset_to_removed = self
            .disease
            .variant(variant_idx)
            .sample_onset_to_removed(severity, &mut self.pool);
        let tracing = self.healthcare.testing_mode().traces_contacts();

        let p = self.pop.person_mut(id);
        p.state = PersonState::Incubation;
        p.severity = severity;
        p.place_of_death = place;
        p.is_infected = true;
        p.variant = variant_idx;
        p.day_of_infection = if runtime { today } else { -1 };
        p.included_in_totals = runtime;
        p.day_of_illness = 0;
        p.days_left = incubation;
        p.days_from_onset_to_removed = onset_to_removed;
        p.infector = infector;
        p.infectees = if tracing { Some(Vec::new()) } else { None };
        self.pop.count_infection(age, runtime);
    }

    /* Transitions **********************************************************/

    fn begin_illness(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (variant_idx, severity, onset_to_removed) = {
            let p = self.pop.person(id);
            if p.state() != PersonState::Incubation {
                return Err(Problem::WrongState);
            }
            (p.variant(), p.severity(), p.days_from_onset_to_removed())
        };
        let days = self
            .disease
            .variant(variant_idx)
            .illness_days(severity, onset_to_removed);
        {
            let p = self.pop.person_mut(id);
            p.state = PersonState::Illness;
            p.day_of_illness = 0;
            p.days_left = days;
        }
        // symptom onset may enqueue a test for tomorrow
        match self.healthcare.testing_mode() {
            TestingMode::NoTesting => {}
            TestingMode::AllWithSymptoms | TestingMode::AllWithSymptomsCT => {
                if severity.is_symptomatic() {
                    self.healthcare
                        .enqueue_for_testing(self.pop.person_mut(id));
                }
            }
            TestingMode::OnlySevereSymptoms => {
                if severity.needs_hospital() {
                    self.healthcare
                        .enqueue_for_testing(self.pop.person_mut(id));
                } else if severity.is_symptomatic() {
                    let p_detect = self.healthcare.p_detected_anyway();
                    if self.pool.chance(p_detect) {
                        self.healthcare
                            .enqueue_for_testing(self.pop.person_mut(id));
                    }
                }
            }
        }
        return Ok(());
    }

    fn end_illness(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (severity, place) = {
            let p = self.pop.person(id);
            (p.severity(), p.place_of_death())
        };
        if severity == SymptomSeverity::Fatal && place == PlaceOfDeath::OutsideHospital {
            return self.die(id, false);
        }
        if severity.needs_hospital() {
            return self.hospitalize(id);
        }
        return self.recover(id);
    }

    fn hospitalize(&mut self, id: Id) -> std::result::Result<(), Problem> {
        self.detect(id)?;
        let (variant_idx, severity, onset_to_removed, age) = {
            let p = self.pop.person(id);
            (
                p.variant(),
                p.severity(),
                p.days_from_onset_to_removed(),
                p.age(),
            )
        };
        if self.healthcare.request_bed() {
            let days = self
                .disease
                .variant(variant_idx)
                .ward_days(severity, onset_to_removed);
            let p = self.pop.person_mut(id);
            p.state = PersonState::Hospitalized;
            p.days_left = days;
            self.pop.count_hospital_admission(age);
            return Ok(());
        }
        let p_death = self.disease.variant(variant_idx).p_hospital_death_no_beds();
        if self.pool.chance(p_death) {
            return self.die(id, false);
        }
        return self.recover(id);
    }

    fn end_ward_stay(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (variant_idx, severity, age) = {
            let p = self.pop.person(id);
            if p.state() != PersonState::Hospitalized {
                return Err(Problem::WrongState);
            }
            (p.variant(), p.severity(), p.age())
        };
        if severity.needs_icu() {
            return self.transfer_to_icu(id);
        }
        self.healthcare.release_bed()?;
        self.pop.count_hospital_discharge(age);
        let p_death = self.disease.variant(variant_idx).p_hospital_death();
        if severity == SymptomSeverity::Severe && self.pool.chance(p_death) {
            return self.die(id, true);
        }
        return self.recover(id);
    }

    fn transfer_to_icu(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (variant_idx, severity, onset_to_removed, age) = {
            let p = self.pop.person(id);
            (
                p.variant(),
                p.severity(),
                p.days_from_onset_to_removed(),
                p.age(),
            )
        };
        // the ward bed is given back even when the transfer is denied
        self.healthcare.release_bed()?;
        self.pop.count_hospital_discharge(age);
        if self.healthcare.request_icu_unit() {
            let days = self
                .disease
                .variant(variant_idx)
                .icu_days(severity, onset_to_removed);
            let p = self.pop.person_mut(id);
            p.state = PersonState::InIcu;
            p.days_left = days;
            self.pop.count_icu_admission(age);
            return Ok(());
        }
        if severity == SymptomSeverity::Fatal {
            return self.die(id, true);
        }
        let p_death = self.disease.variant(variant_idx).p_icu_death_no_beds();
        if self.pool.chance(p_death) {
            return self.die(id, true);
        }
        return self.recover(id);
    }

    fn end_icu_stay(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let (severity, age) = {
            let p = self.pop.person(id);
            if p.state() != PersonState::InIcu {
                return Err(Problem::WrongState);
            }
            (p.severity(), p.age())
        };
        self.healthcare.release_icu_unit()?;
        self.pop.count_icu_discharge(age);
        if severity == SymptomSeverity::Fatal {
            return self.die(id, true);
        }
        return self.recover(id);
    }

    fn recover(&mut self, id: Id) -> std::result::Result<(), Problem> {
        let p = self.pop.person_mut(id);
        if !p.state().is_active() {
            return Err(Problem::WrongState);
        }
        p.state = PersonState::Recovered;
        p.is_infected = false;
        p.has_immunity = true;
        p.infectees = None;
        let (age, detected, included, secondary) = (
            p.age(),
            p.was_detected(),
            p.included_in_totals(),
            p.other_people_infected(),
        );
        self.pop.count_recovery(age, detected);
        self.note_removed(included, secondary);
        return Ok(());
    }

    fn die(&mut self, id: Id, in_hospital: bool) -> std::result::Result<(), Problem> {
        let p = self.pop.person_mut(id);
        if p.state() == PersonState::Dead {
            return Err(Problem::WrongState);
        }
        let was_infected = p.is_infected();
        p.state = PersonState::Dead;
        p.is_infected = false;
        p.has_immunity = true;
        p.place_of_death = if in_hospital {
            PlaceOfDeath::InHospital
        } else {
            PlaceOfDeath::OutsideHospital
        };
        p.infectees = None;
        let (age, detected, included, secondary) = (
            p.age(),
            p.was_detected(),
            p.included_in_totals(),
            p.other_people_infected(),
        );
        self.pop
            .count_death(age, was_infected, detected && was_infected);
        if was_infected {
            self.note_removed(included, secondary);
        }
        return Ok(());
    }

    fn note_removed(&mut self, included: bool, secondary: u32) {
        if included {
            self.removed_count += 1;
            self.secondary_total += secondary as u64;
        }
    }

    /* Day-0 seeding ********************************************************/

    fn seed_initial(&mut self, initial: &InitialCondition) -> Result<()> {
        for _ in 0..initial.incubating {
            self.seed_infection(None)?;
        }
        for _ in 0..initial.ill {
            self.seed_infection(Some(PersonState::Illness))?;
        }
        for _ in 0..initial.in_ward {
            self.seed_infection(Some(PersonState::Hospitalized))?;
        }
        for _ in 0..initial.in_icu {
            self.seed_infection(Some(PersonState::InIcu))?;
        }
        for _ in 0..initial.dead {
            if let Some(id) = self.find_susceptible() {
                let p = self.pop.person_mut(id);
                p.state = PersonState::Dead;
                p.severity = SymptomSeverity::Fatal;
                p.has_immunity = true;
                p.included_in_totals = false;
                let age = p.age();
                self.pop.count_death(age, false, false);
            }
        }
        let mut remaining = initial.confirmed_cases;
        for id in 0..self.pop.len() {
            if remaining == 0 {
                break;
            }
            let p = self.pop.person(id);
            if p.state().is_active() && !p.was_detected() {
                self.detect(id).map_err(|problem| Error::from((problem, Some(id))))?;
                remaining -= 1;
            }
        }
        return Ok(());
    }

    /// Seed one infection, optionally forced into a later state.
    fn seed_infection(&mut self, force: Option<PersonState>) -> Result<()> {
        let id = match self.find_susceptible() {
            Some(id) => id,
            None => return Ok(()),
        };
        self.infect(id, 0, None, false);
        let target = match force {
            None => return Ok(()),
            Some(target) => target,
        };

        if target == PersonState::Hospitalized || target == PersonState::InIcu {
            let floor = if target == PersonState::InIcu {
                SymptomSeverity::Critical
            } else {
                SymptomSeverity::Severe
            };
            let p = self.pop.person_mut(id);
            if p.severity < floor {
                p.severity = floor;
            }
        }
        self.begin_illness(id)
            .map_err(|problem| Error::from((problem, Some(id))))?;
        if target == PersonState::Illness {
            return Ok(());
        }

        let (severity, onset_to_removed, age) = {
            let p = self.pop.person(id);
            (p.severity(), p.days_from_onset_to_removed(), p.age())
        };
        if target == PersonState::Hospitalized || target == PersonState::InIcu {
            self.detect(id).map_err(|problem| Error::from((problem, Some(id))))?;
        }
        if target == PersonState::Hospitalized {
            if self.healthcare.request_bed() {
                let days = self.disease.variant(0).ward_days(severity, onset_to_removed);
                let p = self.pop.person_mut(id);
                p.state = PersonState::Hospitalized;
                p.days_left = days;
                self.pop.count_hospital_admission(age);
            }
        } else if target == PersonState::InIcu && self.healthcare.request_icu_unit() {
            let days = self.disease.variant(0).icu_days(severity, onset_to_removed);
            let p = self.pop.person_mut(id);
            p.state = PersonState::InIcu;
            p.days_left = days;
            self.pop.count_icu_admission(age);
        }
        return Ok(());
    }
}
