use crate::{
    classed::ClassedValues,
    error::{Error, Result},
    prelude::{Age, Day, Real},
    rng::RandomPool,
};
use getset::*;
use paste::paste;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Default wild-type values. Age tables are cut by decade.
const MEAN_INCUBATION: Real = 5.1;
const MEAN_ONSET_TO_DEATH: Real = 18.8;
const MEAN_ONSET_TO_RECOVERY: Real = 21.0;
const RATIO_BEFORE_HOSPITAL: Real = 0.3;
const RATIO_IN_WARD: Real = 0.5;
const INFECTIOUSNESS_MULTIPLIER: Real = 0.5;
const PROB_ASYMPTOMATIC_INFECTION: Real = 0.5;
const PROB_MASK_PROTECTS_WEARER: Real = 0.3;
const PROB_MASK_PROTECTS_OTHERS: Real = 0.5;
const PROB_HOSPITAL_DEATH: Real = 0.05;
const PROB_HOSPITAL_DEATH_NO_BEDS: Real = 0.2;
const PROB_ICU_DEATH_NO_BEDS: Real = 1.0;
const VACCINE_EFFICACY: Real = 0.90;

const INCUBATION_CV: Real = 0.86;
const ONSET_TO_REMOVED_CV: Real = 0.45;

const P_SUSCEPTIBILITY: [(i32, Real); 9] = [
    (0, 0.40),
    (10, 0.40),
    (20, 0.60),
    (30, 0.60),
    (40, 0.60),
    (50, 0.70),
    (60, 0.70),
    (70, 0.80),
    (80, 0.80),
];
const P_SYMPTOMATIC: [(i32, Real); 9] = [
    (0, 0.25),
    (10, 0.30),
    (20, 0.40),
    (30, 0.45),
    (40, 0.50),
    (50, 0.55),
    (60, 0.65),
    (70, 0.70),
    (80, 0.75),
];
const P_SEVERE: [(i32, Real); 9] = [
    (0, 0.001),
    (10, 0.002),
    (20, 0.010),
    (30, 0.030),
    (40, 0.050),
    (50, 0.100),
    (60, 0.150),
    (70, 0.250),
    (80, 0.350),
];
const P_CRITICAL: [(i32, Real); 9] = [
    (0, 0.0003),
    (10, 0.0006),
    (20, 0.0030),
    (30, 0.0100),
    (40, 0.0150),
    (50, 0.0300),
    (60, 0.0500),
    (70, 0.1000),
    (80, 0.1500),
];
const P_FATAL: [(i32, Real); 9] = [
    (0, 0.0001),
    (10, 0.0002),
    (20, 0.0010),
    (30, 0.0040),
    (40, 0.0060),
    (50, 0.0150),
    (60, 0.0300),
    (70, 0.0600),
    (80, 0.1100),
];
const P_DEATH_OUTSIDE_HOSPITAL: [(i32, Real); 4] = [(0, 0.05), (60, 0.10), (70, 0.20), (80, 0.50)];

/// Canonical infectiousness weight by day offset from symptom onset.
pub const INFECTIOUSNESS_PROFILE: [(i32, Real); 21] = [
    (-10, 0.00183),
    (-9, 0.00280),
    (-8, 0.00446),
    (-7, 0.00742),
    (-6, 0.01291),
    (-5, 0.02350),
    (-4, 0.04419),
    (-3, 0.08247),
    (-2, 0.14018),
    (-1, 0.19032),
    (0, 0.18539),
    (1, 0.13091),
    (2, 0.07538),
    (3, 0.04018),
    (4, 0.02144),
    (5, 0.01185),
    (6, 0.00686),
    (7, 0.00415),
    (8, 0.00262),
    (9, 0.00172),
    (10, 0.00117),
];

/// Fixed clinical course assigned at infection time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomSeverity {
    Asymptomatic,
    Mild,
    Severe,
    Critical,
    Fatal,
}

impl SymptomSeverity {
    pub fn is_symptomatic(self) -> bool {
        self != SymptomSeverity::Asymptomatic
    }

    /// Severe and worse cases seek a hospital bed at the end of illness.
    pub fn needs_hospital(self) -> bool {
        self >= SymptomSeverity::Severe
    }

    /// Critical and fatal cases are transferred to ICU after the ward stay.
    pub fn needs_icu(self) -> bool {
        self >= SymptomSeverity::Critical
    }

    pub fn name(self) -> &'static str {
        match self {
            SymptomSeverity::Asymptomatic => "asymptomatic",
            SymptomSeverity::Mild => "mild",
            SymptomSeverity::Severe => "severe",
            SymptomSeverity::Critical => "critical",
            SymptomSeverity::Fatal => "fatal",
        }
    }

    pub fn index(self) -> usize {
        match self {
            SymptomSeverity::Asymptomatic => 0,
            SymptomSeverity::Mild => 1,
            SymptomSeverity::Severe => 2,
            SymptomSeverity::Critical => 3,
            SymptomSeverity::Fatal => 4,
        }
    }
}

impl Default for SymptomSeverity {
    fn default() -> Self {
        SymptomSeverity::Asymptomatic
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceOfDeath {
    InHospital,
    OutsideHospital,
}

impl Default for PlaceOfDeath {
    fn default() -> Self {
        PlaceOfDeath::InHospital
    }
}

/// One named parameter bundle. Variant 0 of a [`Disease`] is the wild type;
/// further variants are built by overriding wild-type values.
// Scalar fields are declared before the classed tables so the TOML
// serializer emits plain values ahead of sub-tables.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters, Setters, Serialize)]
pub struct Variant {
    #[getset(get = "pub", set = "pub")]
    name: String,

    #[getset(get_copy = "pub")]
    mean_incubation: Real,
    #[getset(get_copy = "pub")]
    mean_onset_to_death: Real,
    #[getset(get_copy = "pub")]
    mean_onset_to_recovery: Real,
    #[getset(get_copy = "pub")]
    ratio_before_hospital: Real,
    #[getset(get_copy = "pub")]
    ratio_in_ward: Real,

    #[getset(get_copy = "pub", set = "pub")]
    infectiousness_multiplier: Real,
    #[getset(get_copy = "pub")]
    p_asymptomatic_infection: Real,
    #[getset(get_copy = "pub")]
    p_mask_protects_wearer: Real,
    #[getset(get_copy = "pub")]
    p_mask_protects_others: Real,
    #[getset(get_copy = "pub")]
    p_hospital_death: Real,
    #[getset(get_copy = "pub")]
    p_hospital_death_no_beds: Real,
    #[getset(get_copy = "pub")]
    p_icu_death_no_beds: Real,
    #[getset(get_copy = "pub")]
    vaccine_efficacy: Real,

    // Age-classed probability tables. The severity tables are cumulative
    // thresholds: symptomatic >= severe >= critical >= fatal at every age.
    p_susceptibility: ClassedValues,
    p_symptomatic: ClassedValues,
    p_severe: ClassedValues,
    p_critical: ClassedValues,
    p_fatal: ClassedValues,
    p_death_outside_hospital: ClassedValues,

    /// Infectiousness weight by day offset from symptom onset.
    #[getset(get = "pub")]
    infectiousness: ClassedValues,
}

macro_rules! age_prop {
    ($x:ident) => {
        paste! {
            pub fn $x(&self, age: Age) -> Real {
                self.$x.step(age as i32)
            }
            pub fn [<set_ $x>](&mut self, value: ClassedValues) -> &mut Self {
                self.$x = value;
                return self;
            }
        }
    };
}

impl Variant {
    age_prop!(p_susceptibility);
    age_prop!(p_symptomatic);
    age_prop!(p_severe);
    age_prop!(p_critical);
    age_prop!(p_fatal);
    age_prop!(p_death_outside_hospital);

    /// The default wild-type parameter set.
    pub fn wild_type() -> Self {
        Variant {
            name: "wild-type".into(),
            p_susceptibility: ClassedValues::from_pairs(P_SUSCEPTIBILITY.to_vec()).unwrap(),
            p_symptomatic: ClassedValues::from_pairs(P_SYMPTOMATIC.to_vec()).unwrap(),
            p_severe: ClassedValues::from_pairs(P_SEVERE.to_vec()).unwrap(),
            p_critical: ClassedValues::from_pairs(P_CRITICAL.to_vec()).unwrap(),
            p_fatal: ClassedValues::from_pairs(P_FATAL.to_vec()).unwrap(),
            p_death_outside_hospital: ClassedValues::from_pairs(P_DEATH_OUTSIDE_HOSPITAL.to_vec())
                .unwrap(),
            infectiousness: ClassedValues::from_pairs(INFECTIOUSNESS_PROFILE.to_vec()).unwrap(),
            mean_incubation: MEAN_INCUBATION,
            mean_onset_to_death: MEAN_ONSET_TO_DEATH,
            mean_onset_to_recovery: MEAN_ONSET_TO_RECOVERY,
            ratio_before_hospital: RATIO_BEFORE_HOSPITAL,
            ratio_in_ward: RATIO_IN_WARD,
            infectiousness_multiplier: INFECTIOUSNESS_MULTIPLIER,
            p_asymptomatic_infection: PROB_ASYMPTOMATIC_INFECTION,
            p_mask_protects_wearer: PROB_MASK_PROTECTS_WEARER,
            p_mask_protects_others: PROB_MASK_PROTECTS_OTHERS,
            p_hospital_death: PROB_HOSPITAL_DEATH,
            p_hospital_death_no_beds: PROB_HOSPITAL_DEATH_NO_BEDS,
            p_icu_death_no_beds: PROB_ICU_DEATH_NO_BEDS,
            vaccine_efficacy: VACCINE_EFFICACY,
        }
    }

    /// Infectiousness weight at the given day offset from symptom onset.
    /// Zero outside the profile's support.
    pub fn infectiousness_at(&self, day: Day) -> Real {
        self.infectiousness.exact(day)
    }

    /// Draw severity and, for fatal cases, the place of death. `vmod` scales
    /// the severe/critical/fatal thresholds down for vaccinated agents.
    pub fn sample_severity(
        &self,
        age: Age,
        vmod: Real,
        pool: &mut RandomPool,
    ) -> (SymptomSeverity, PlaceOfDeath) {
        let v = pool.uniform();
        if v >= self.p_symptomatic(age) {
            return (SymptomSeverity::Asymptomatic, PlaceOfDeath::default());
        }
        if v >= self.p_severe(age) * vmod {
            return (SymptomSeverity::Mild, PlaceOfDeath::default());
        }
        if v >= self.p_critical(age) * vmod {
            return (SymptomSeverity::Severe, PlaceOfDeath::default());
        }
        if v >= self.p_fatal(age) * vmod {
            return (SymptomSeverity::Critical, PlaceOfDeath::default());
        }
        let place = if pool.chance(self.p_death_outside_hospital(age)) {
            PlaceOfDeath::OutsideHospital
        } else {
            PlaceOfDeath::InHospital
        };
        return (SymptomSeverity::Fatal, place);
    }

    /// Incubation duration in whole days, at least one.
    pub fn sample_incubation_days(&self, pool: &mut RandomPool) -> Day {
        let days = pool.gamma(self.mean_incubation, INCUBATION_CV).round();
        return (days as Day).max(1);
    }

    /// Total duration from symptom onset to removal (death or recovery).
    pub fn sample_onset_to_removed(&self, severity: SymptomSeverity, pool: &mut RandomPool) -> Real {
        let mean = if severity == SymptomSeverity::Fatal {
            self.mean_onset_to_death
        } else {
            self.mean_onset_to_recovery
        };
        pool.gamma(mean, ONSET_TO_REMOVED_CV)
    }

    /// Days spent in the Illness state before removal or hospitalization.
    pub fn illness_days(&self, severity: SymptomSeverity, onset_to_removed: Real) -> Day {
        let days = if severity.needs_hospital() {
            onset_to_removed * self.ratio_before_hospital
        } else {
            onset_to_removed
        };
        return (days.round() as Day).max(1);
    }

    /// Days spent in a hospital ward.
    pub fn ward_days(&self, severity: SymptomSeverity, onset_to_removed: Real) -> Day {
        let days = match severity {
            SymptomSeverity::Severe => onset_to_removed * (1.0 - self.ratio_before_hospital),
            SymptomSeverity::Critical | SymptomSeverity::Fatal => {
                onset_to_removed * self.ratio_in_ward
            }
            _ => return 0,
        };
        return (days.round() as Day).max(1);
    }

    /// Days spent in ICU after the ward stay.
    pub fn icu_days(&self, severity: SymptomSeverity, onset_to_removed: Real) -> Day {
        if !severity.needs_icu() {
            return 0;
        }
        let ratio = (1.0 - self.ratio_in_ward - self.ratio_before_hospital).max(0.0);
        return ((onset_to_removed * ratio).round() as Day).max(1);
    }

    fn validate(&self) -> Result<()> {
        if self.mean_incubation <= 0.0
            || self.mean_onset_to_death <= 0.0
            || self.mean_onset_to_recovery <= 0.0
        {
            return Err(Error::bad_parameter(format!(
                "variant {}: duration means must be positive",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.ratio_before_hospital)
            || !(0.0..=1.0).contains(&self.ratio_in_ward)
            || self.ratio_before_hospital + self.ratio_in_ward > 1.0
        {
            return Err(Error::bad_parameter(format!(
                "variant {}: duration ratios must lie in [0, 1] and sum to at most 1",
                self.name
            )));
        }
        if self.infectiousness_multiplier < 0.0 {
            return Err(Error::bad_parameter(format!(
                "variant {}: infectiousness multiplier must not be negative",
                self.name
            )));
        }
        let scalars = [
            self.p_asymptomatic_infection,
            self.p_mask_protects_wearer,
            self.p_mask_protects_others,
            self.p_hospital_death,
            self.p_hospital_death_no_beds,
            self.p_icu_death_no_beds,
            self.vaccine_efficacy,
        ];
        if scalars.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(Error::bad_parameter(format!(
                "variant {}: probabilities must lie in [0, 1]",
                self.name
            )));
        }
        let tables = [
            &self.p_susceptibility,
            &self.p_symptomatic,
            &self.p_severe,
            &self.p_critical,
            &self.p_fatal,
            &self.p_death_outside_hospital,
        ];
        if tables.iter().any(|t| !t.is_probability()) {
            return Err(Error::bad_parameter(format!(
                "variant {}: age tables must hold probabilities",
                self.name
            )));
        }
        // Severity thresholds are cumulative; check ordering at every cut.
        let mut classes: Vec<i32> = self
            .p_symptomatic
            .classes()
            .chain(self.p_severe.classes())
            .chain(self.p_critical.classes())
            .chain(self.p_fatal.classes())
            .collect();
        classes.sort_unstable();
        classes.dedup();
        for c in classes {
            let (syc, sc) = (self.p_symptomatic.step(c), self.p_severe.step(c));
            let (cc, fc) = (self.p_critical.step(c), self.p_fatal.step(c));
            if syc < sc || sc < cc || cc < fc {
                return Err(Error::bad_parameter(format!(
                    "variant {}: severity thresholds out of order at age {}",
                    self.name, c
                )));
            }
        }
        return Ok(());
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::wild_type()
    }
}

/// Partial variant description; unset fields fall back to the base variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_incubation: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_onset_to_death: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_onset_to_recovery: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_before_hospital: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_in_ward: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infectiousness_multiplier: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_asymptomatic_infection: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_mask_protects_wearer: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_mask_protects_others: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_hospital_death: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_hospital_death_no_beds: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_icu_death_no_beds: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vaccine_efficacy: Option<Real>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_susceptibility: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_symptomatic: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_severe: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_critical: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_fatal: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_death_outside_hospital: Option<ClassedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infectiousness: Option<ClassedValues>,
}

macro_rules! apply_field {
    ($spec:ident, $out:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $spec.$field.clone() {
                $out.$field = value;
            }
        )+
    };
}

impl VariantSpec {
    /// Build a concrete variant by overriding `base` with the set fields.
    pub fn apply(&self, base: &Variant) -> Variant {
        let spec = self;
        let mut out = base.clone();
        if let Some(name) = spec.name.clone() {
            out.name = name;
        }
        apply_field!(
            spec,
            out,
            p_susceptibility,
            p_symptomatic,
            p_severe,
            p_critical,
            p_fatal,
            p_death_outside_hospital,
            infectiousness,
            mean_incubation,
            mean_onset_to_death,
            mean_onset_to_recovery,
            ratio_before_hospital,
            ratio_in_ward,
            infectiousness_multiplier,
            p_asymptomatic_infection,
            p_mask_protects_wearer,
            p_mask_protects_others,
            p_hospital_death,
            p_hospital_death_no_beds,
            p_icu_death_no_beds,
            vaccine_efficacy,
        );
        return out;
    }
}

/// The pathogen: a wild-type variant plus any number of named overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Disease {
    variants: Vec<Variant>,
}

impl Disease {
    pub fn new(wild_type: Variant, overrides: &[VariantSpec]) -> Result<Self> {
        wild_type.validate()?;
        let mut variants = vec![wild_type];
        for spec in overrides {
            if spec.name.is_none() {
                return Err(Error::bad_parameter("variant overrides must be named"));
            }
            let variant = spec.apply(&variants[0]);
            variant.validate()?;
            variants.push(variant);
        }
        return Ok(Disease { variants });
    }

    /// Number of variants, the wild type included.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn variant(&self, idx: usize) -> &Variant {
        &self.variants[idx]
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Resolve a variant name; `None` means the wild type.
    pub fn index_of(&self, name: Option<&str>) -> Result<usize> {
        let name = match name {
            None => return Ok(0),
            Some(name) => name,
        };
        self.variants
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| Error::UnknownVariant(name.to_string()))
    }
}

impl Default for Disease {
    fn default() -> Self {
        Disease {
            variants: vec![Variant::wild_type()],
        }
    }
}

fn slice_is_empty<T>(slice: &&[T]) -> bool {
    slice.is_empty()
}

#[derive(Serialize)]
struct DiseaseRepr<'a> {
    #[serde(flatten)]
    wild_type: &'a Variant,
    // empty lists are dropped so TOML output never puts a value after a table
    #[serde(skip_serializing_if = "slice_is_empty")]
    variants: &'a [Variant],
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DiseaseSpec {
    #[serde(flatten)]
    wild_type: VariantSpec,
    variants: Vec<VariantSpec>,
}

impl Serialize for Disease {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DiseaseRepr {
            wild_type: &self.variants[0],
            variants: &self.variants[1..],
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Disease {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let spec = DiseaseSpec::deserialize(deserializer)?;
        let wild_type = spec.wild_type.apply(&Variant::wild_type());
        // Serialized variants carry every field, so re-applying them over the
        // wild type reconstructs the original bundle.
        let overrides: Vec<VariantSpec> = spec.variants;
        Disease::new(wild_type, &overrides).map_err(serde::de::Error::custom)
    }
}
