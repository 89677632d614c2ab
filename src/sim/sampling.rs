use super::context::{
    Context, CONTACT_SIGMA, FREE_CONTACT_FACTOR, FREE_CONTACT_LIMIT, ILLNESS_CONTACT_FACTOR,
    ILLNESS_CONTACT_LIMIT,
};
use crate::{
    epidemic::SymptomSeverity,
    error::Result,
    prelude::{Age, Day, Real},
};
use serde::{Deserialize, Serialize};

/// Number of draws produced by the diagnostic sampling interface.
pub const DIAGNOSTIC_SAMPLES: usize = 10_000;

/// What the diagnostic sampling call should draw.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleTarget {
    Infectiousness,
    ContactsPerDay,
    SymptomSeverity,
    IncubationPeriod,
    IllnessPeriod,
    HospitalizationPeriod,
    IcuPeriod,
    OnsetToRemovedPeriod,
}

/// Diagnostic samples: either the literal infectiousness curve or a batch
/// of scalar draws.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Curve(Vec<(Day, Real)>),
    Values(Vec<Real>),
}

impl Context {
    /// Draw [`DIAGNOSTIC_SAMPLES`] values of the requested quantity for one
    /// age, optionally pinned to a severity and a variant. Consumes the
    /// simulation's own random pool; meant for inspection, not mid-run use.
    pub fn sample(
        &mut self,
        target: SampleTarget,
        age: Age,
        severity: Option<SymptomSeverity>,
        variant: Option<&str>,
    ) -> Result<Samples> {
        let variant_idx = self.disease().index_of(variant)?;
        let (disease, contacts, pool) = self.sampling_parts();
        let variant = disease.variant(variant_idx);

        if target == SampleTarget::Infectiousness {
            return Ok(Samples::Curve(variant.infectiousness().cuts().to_vec()));
        }

        let severity_of = |pool: &mut crate::rng::RandomPool| match severity {
            Some(severity) => severity,
            None => variant.sample_severity(age, 1.0, pool).0,
        };

        let mut values = Vec::with_capacity(DIAGNOSTIC_SAMPLES);
        match target {
            SampleTarget::Infectiousness => unreachable!(),
            SampleTarget::ContactsPerDay => {
                let avg = contacts.avg_contacts(age);
                let cap = contacts.mass_gathering_limit();
                let visible = severity.map_or(false, |s| s.is_symptomatic());
                let (factor, limit) = if visible {
                    (ILLNESS_CONTACT_FACTOR, ILLNESS_CONTACT_LIMIT)
                } else {
                    (FREE_CONTACT_FACTOR, FREE_CONTACT_LIMIT)
                };
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    let desired = (factor * pool.lognormal(0.0, CONTACT_SIGMA) * avg).floor();
                    let mut wanted = (desired as i64).max(1) - 1;
                    wanted = wanted.min(limit);
                    if let Some(cap) = cap {
                        wanted = wanted.min(cap as i64);
                    }
                    values.push(wanted.max(0) as Real);
                }
            }
            SampleTarget::SymptomSeverity => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    values.push(severity_of(pool).index() as Real);
                }
            }
            SampleTarget::IncubationPeriod => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    values.push(variant.sample_incubation_days(pool) as Real);
                }
            }
            SampleTarget::OnsetToRemovedPeriod => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    let severity = severity_of(pool);
                    values.push(variant.sample_onset_to_removed(severity, pool));
                }
            }
            SampleTarget::IllnessPeriod => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    let severity = severity_of(pool);
                    let onset_to_removed = variant.sample_onset_to_removed(severity, pool);
                    values.push(variant.illness_days(severity, onset_to_removed) as Real);
                }
            }
            SampleTarget::HospitalizationPeriod => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    let severity = severity_of(pool);
                    let onset_to_removed = variant.sample_onset_to_removed(severity, pool);
                    values.push(variant.ward_days(severity, onset_to_removed) as Real);
                }
            }
            SampleTarget::IcuPeriod => {
                for _ in 0..DIAGNOSTIC_SAMPLES {
                    let severity = severity_of(pool);
                    let onset_to_removed = variant.sample_onset_to_removed(severity, pool);
                    values.push(variant.icu_days(severity, onset_to_removed) as Real);
                }
            }
        }
        return Ok(Samples::Values(values));
    }
}
