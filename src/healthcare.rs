use crate::{
    agent::Person,
    epidemic::AgeRange,
    error::Problem,
    prelude::{Id, Real},
};
use getset::CopyGetters;

/// Which symptom presentations trigger a test.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestingMode {
    NoTesting,
    OnlySevereSymptoms,
    AllWithSymptoms,
    AllWithSymptomsCT,
}

impl TestingMode {
    pub fn tests_symptoms(self) -> bool {
        self != TestingMode::NoTesting
    }

    /// Contact tracing (and infectee tracking) is active in this mode.
    pub fn traces_contacts(self) -> bool {
        self == TestingMode::AllWithSymptomsCT
    }
}

impl Default for TestingMode {
    fn default() -> Self {
        TestingMode::NoTesting
    }
}

/// An age-targeted vaccination program with a daily quota. Weekly amounts
/// are prorated per day; the fractional remainder carries over.
#[derive(Debug, Clone, PartialEq)]
pub struct VaccinationProgram {
    pub ages: AgeRange,
    daily_quota: Real,
    carry: Real,
}

impl VaccinationProgram {
    pub fn new(weekly_vaccinations: usize, ages: AgeRange) -> Self {
        VaccinationProgram {
            ages,
            daily_quota: weekly_vaccinations as Real / 7.0,
            carry: 0.0,
        }
    }

    /// Whole doses available today; the fraction is kept for tomorrow.
    pub fn take_quota(&mut self) -> usize {
        let total = self.daily_quota + self.carry;
        let quota = total.floor();
        self.carry = total - quota;
        return quota as usize;
    }
}

/// Finite hospital capacity, the day-delayed testing queue and the active
/// vaccination programs. Beds and ICU units act as counting semaphores:
/// acquired on admission, released on discharge, with denial visible to the
/// agent state machine.
#[derive(Debug, Clone, PartialEq, Default, CopyGetters)]
pub struct HealthcareSystem {
    #[getset(get_copy = "pub")]
    beds: usize,
    #[getset(get_copy = "pub")]
    icu_units: usize,
    #[getset(get_copy = "pub")]
    available_beds: usize,
    #[getset(get_copy = "pub")]
    available_icu_units: usize,

    #[getset(get_copy = "pub")]
    testing_mode: TestingMode,
    /// Chance that a traced contact is actually reached.
    #[getset(get_copy = "pub")]
    p_successful_tracing: Real,
    /// Chance that a mild case is detected under severe-only testing.
    #[getset(get_copy = "pub")]
    p_detected_anyway: Real,

    #[getset(skip)]
    queue: Vec<Id>,
    #[getset(skip)]
    pub(crate) programs: Vec<VaccinationProgram>,
}

impl HealthcareSystem {
    pub fn new(beds: usize, icu_units: usize) -> Self {
        HealthcareSystem {
            beds,
            icu_units,
            available_beds: beds,
            available_icu_units: icu_units,
            ..Default::default()
        }
    }

    pub fn request_bed(&mut self) -> bool {
        if self.available_beds == 0 {
            return false;
        }
        self.available_beds -= 1;
        return true;
    }

    pub fn release_bed(&mut self) -> Result<(), Problem> {
        if self.available_beds >= self.beds {
            return Err(Problem::HospitalAccounting);
        }
        self.available_beds += 1;
        return Ok(());
    }

    pub fn request_icu_unit(&mut self) -> bool {
        if self.available_icu_units == 0 {
            return false;
        }
        self.available_icu_units -= 1;
        return true;
    }

    pub fn release_icu_unit(&mut self) -> Result<(), Problem> {
        if self.available_icu_units >= self.icu_units {
            return Err(Problem::HospitalAccounting);
        }
        self.available_icu_units += 1;
        return Ok(());
    }

    pub fn add_beds(&mut self, beds: usize) {
        self.beds += beds;
        self.available_beds += beds;
    }

    pub fn add_icu_units(&mut self, units: usize) {
        self.icu_units += units;
        self.available_icu_units += units;
    }

    pub fn set_testing_mode(&mut self, mode: TestingMode) {
        self.testing_mode = mode;
    }

    pub fn set_p_successful_tracing(&mut self, p: Real) {
        self.p_successful_tracing = p;
    }

    pub fn set_p_detected_anyway(&mut self, p: Real) {
        self.p_detected_anyway = p;
    }

    /// Queue a person for testing on the next day. Duplicate enqueues are
    /// suppressed by the person's flag.
    pub fn enqueue_for_testing(&mut self, person: &mut Person) {
        if person.queued_for_testing || person.was_detected {
            return;
        }
        person.queued_for_testing = true;
        self.queue.push(person.idx);
    }

    /// Drain the queue accumulated during the previous day.
    pub fn take_testing_queue(&mut self) -> Vec<Id> {
        std::mem::take(&mut self.queue)
    }

    pub fn testing_queue(&self) -> &[Id] {
        &self.queue
    }

    pub fn add_vaccination_program(&mut self, weekly_vaccinations: usize, ages: AgeRange) {
        self.programs
            .push(VaccinationProgram::new(weekly_vaccinations, ages));
    }

    pub fn vaccination_programs(&self) -> &[VaccinationProgram] {
        &self.programs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn beds_act_as_semaphore() {
        let mut hc = HealthcareSystem::new(2, 1);
        assert!(hc.request_bed());
        assert!(hc.request_bed());
        assert!(!hc.request_bed());
        assert_eq!(hc.available_beds(), 0);

        hc.release_bed().unwrap();
        assert_eq!(hc.available_beds(), 1);
        hc.release_bed().unwrap();
        assert_eq!(hc.release_bed(), Err(Problem::HospitalAccounting));
    }

    #[test]
    fn icu_units_act_as_semaphore() {
        let mut hc = HealthcareSystem::new(0, 1);
        assert!(!hc.request_bed());
        assert!(hc.request_icu_unit());
        assert!(!hc.request_icu_unit());
        hc.release_icu_unit().unwrap();
        assert_eq!(hc.release_icu_unit(), Err(Problem::HospitalAccounting));
    }

    #[test]
    fn capacity_can_grow() {
        let mut hc = HealthcareSystem::new(1, 0);
        hc.request_bed();
        hc.add_beds(3);
        assert_eq!(hc.beds(), 4);
        assert_eq!(hc.available_beds(), 3);
        hc.add_icu_units(2);
        assert_eq!(hc.icu_units(), 2);
        assert_eq!(hc.available_icu_units(), 2);
    }

    #[test]
    fn queue_suppresses_duplicates() {
        let mut hc = HealthcareSystem::new(0, 0);
        let mut person = Person::new(7, 30);
        hc.enqueue_for_testing(&mut person);
        hc.enqueue_for_testing(&mut person);
        assert_eq!(hc.testing_queue(), &[7]);

        let drained = hc.take_testing_queue();
        assert_eq!(drained, vec![7]);
        assert!(hc.testing_queue().is_empty());

        // detected people are never queued again
        person.queued_for_testing = false;
        person.was_detected = true;
        hc.enqueue_for_testing(&mut person);
        assert!(hc.testing_queue().is_empty());
    }

    #[test]
    fn weekly_quota_is_prorated_with_carry() {
        let mut program = VaccinationProgram::new(7, AgeRange::new(70, 99));
        for _ in 0..10 {
            assert_eq!(program.take_quota(), 1);
        }
        assert_approx_eq!(program.carry, 0.0, 1e-9);

        // fractional quotas accumulate instead of being dropped
        let mut program = VaccinationProgram::new(10, AgeRange::new(70, 99));
        let total: usize = (0..70).map(|_| program.take_quota()).sum();
        assert!((99..=100).contains(&total), "total = {}", total);
    }
}
