use crate::{
    epidemic::{AgeRange, Place},
    error::{Error, Result},
    prelude::{Age, Real},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dated events that mutate simulation parameters. Percentages are given on
/// the 0..=100 scale, as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Intervention {
    TestAllWithSymptoms,
    TestOnlySevereSymptoms {
        #[serde(default)]
        mild_detection_rate: Real,
    },
    TestWithContactTracing {
        efficiency: Real,
    },
    BuildNewIcuUnits {
        units: usize,
    },
    BuildNewHospitalBeds {
        beds: usize,
    },
    ImportInfections {
        amount: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },
    ImportInfectionsWeekly {
        weekly_amount: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },
    LimitMobility {
        reduction: Real,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        place: Option<Place>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ages: Option<AgeRange>,
    },
    WearMasks {
        share_of_contacts: Real,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        place: Option<Place>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ages: Option<AgeRange>,
    },
    Vaccinate {
        weekly_vaccinations: usize,
        min_age: Age,
        max_age: Age,
    },
}

/// The recognized `type` tags, in configuration spelling.
pub const INTERVENTION_KINDS: [&str; 10] = [
    "test-all-with-symptoms",
    "test-only-severe-symptoms",
    "test-with-contact-tracing",
    "build-new-icu-units",
    "build-new-hospital-beds",
    "import-infections",
    "import-infections-weekly",
    "limit-mobility",
    "wear-masks",
    "vaccinate",
];

impl Intervention {
    pub fn kind(&self) -> &'static str {
        match self {
            Intervention::TestAllWithSymptoms => "test-all-with-symptoms",
            Intervention::TestOnlySevereSymptoms { .. } => "test-only-severe-symptoms",
            Intervention::TestWithContactTracing { .. } => "test-with-contact-tracing",
            Intervention::BuildNewIcuUnits { .. } => "build-new-icu-units",
            Intervention::BuildNewHospitalBeds { .. } => "build-new-hospital-beds",
            Intervention::ImportInfections { .. } => "import-infections",
            Intervention::ImportInfectionsWeekly { .. } => "import-infections-weekly",
            Intervention::LimitMobility { .. } => "limit-mobility",
            Intervention::WearMasks { .. } => "wear-masks",
            Intervention::Vaccinate { .. } => "vaccinate",
        }
    }

    /// Range checks over parameters; unknown variants and malformed fields
    /// are already rejected during decoding.
    pub fn validate(&self) -> Result<()> {
        let percent = |what: &str, value: Real| {
            if (0.0..=100.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::bad_parameter(format!(
                    "{}: {} must lie in 0..=100",
                    self.kind(),
                    what
                )))
            }
        };
        match self {
            Intervention::TestOnlySevereSymptoms {
                mild_detection_rate,
            } => percent("mild_detection_rate", *mild_detection_rate),
            Intervention::TestWithContactTracing { efficiency } => {
                percent("efficiency", *efficiency)
            }
            Intervention::LimitMobility { reduction, .. } => percent("reduction", *reduction),
            Intervention::WearMasks {
                share_of_contacts, ..
            } => percent("share_of_contacts", *share_of_contacts),
            Intervention::Vaccinate {
                min_age, max_age, ..
            } => {
                if min_age > max_age {
                    return Err(Error::bad_parameter(
                        "vaccinate: min_age must not exceed max_age",
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// An intervention bound to the calendar date it is applied on. Each one is
/// applied exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedIntervention {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub intervention: Intervention,
}

impl DatedIntervention {
    pub fn new(date: NaiveDate, intervention: Intervention) -> Self {
        DatedIntervention { date, intervention }
    }
}
