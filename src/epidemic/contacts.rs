use crate::{
    error::{Error, Problem, Result},
    prelude::{Age, Real},
};
use getset::*;
use ndarray::Array2;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Categorical contact context. Each place carries its own mobility factor
/// and mask probability.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    Home,
    Work,
    School,
    Transport,
    Leisure,
    Other,
}

impl Place {
    pub const ALL: [Place; 6] = [
        Place::Home,
        Place::Work,
        Place::School,
        Place::Transport,
        Place::Leisure,
        Place::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Place::Home => "home",
            Place::Work => "work",
            Place::School => "school",
            Place::Transport => "transport",
            Place::Leisure => "leisure",
            Place::Other => "other",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Place::Home => 0,
            Place::Work => 1,
            Place::School => 2,
            Place::Transport => 3,
            Place::Leisure => 4,
            Place::Other => 5,
        }
    }
}

/// Inclusive age interval. Configured either as a single age or as a
/// [min, max] pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AgeRange {
    pub min: Age,
    pub max: Age,
}

impl AgeRange {
    pub fn new(min: Age, max: Age) -> Self {
        AgeRange { min, max }
    }

    pub fn contains(self, age: Age) -> bool {
        self.min <= age && age <= self.max
    }

    pub fn span(self) -> usize {
        self.max as usize - self.min as usize + 1
    }
}

impl From<Age> for AgeRange {
    fn from(age: Age) -> Self {
        AgeRange::new(age, age)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgeRangeRepr {
    One(Age),
    Two([Age; 2]),
}

impl<'de> Deserialize<'de> for AgeRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match AgeRangeRepr::deserialize(deserializer)? {
            AgeRangeRepr::One(age) => Ok(AgeRange::new(age, age)),
            AgeRangeRepr::Two([min, max]) => {
                if min > max {
                    return Err(serde::de::Error::custom("age range must be ordered"));
                }
                Ok(AgeRange::new(min, max))
            }
        }
    }
}

impl Serialize for AgeRange {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.min, self.max].serialize(serializer)
    }
}

/// One row of the source contacts-per-day table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactRow {
    pub participant_age: AgeRange,
    pub contact_age: AgeRange,
    pub place: Place,
    pub contacts: Real,
}

/// Derived sampling entry: one (place, contact-age interval) bucket with its
/// cumulative probability after mobility scaling and its mask probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSlot {
    pub place: Place,
    pub contact_age: AgeRange,
    pub cumulative: Real,
    pub mask: Real,
}

// A (place, age-range) filter carrying a scale factor or a mask share.
// The last matching filter wins, so re-applying a filter overrides it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaleFilter {
    place: Option<Place>,
    ages: AgeRange,
    value: Real,
}

impl ScaleFilter {
    fn matches(&self, place: Place, age: Age) -> bool {
        self.place.map_or(true, |p| p == place) && self.ages.contains(age)
    }
}

/// Venue-partitioned contact probabilities per participant age, with
/// mobility factors and mask shares layered on top. Changing any factor
/// regenerates the cumulative tables.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
pub struct ContactMatrix {
    #[getset(get_copy = "pub")]
    nr_ages: usize,
    rows: Vec<ContactRow>,
    baseline: Vec<Real>,
    averages: Vec<Real>,
    slots: Vec<Vec<ContactSlot>>,
    mobility: Vec<ScaleFilter>,
    masks: Vec<ScaleFilter>,
    /// Global per-day contact ceiling from mass-gathering limits.
    #[getset(get_copy = "pub")]
    mass_gathering_limit: Option<usize>,
}

impl ContactMatrix {
    pub fn from_rows(nr_ages: usize, rows: Vec<ContactRow>) -> Result<Self> {
        if nr_ages == 0 || nr_ages > Age::MAX as usize + 1 {
            return Err(Error::bad_parameter("number of ages out of range"));
        }
        for row in &rows {
            if !row.contacts.is_finite() || row.contacts < 0.0 {
                return Err(Error::bad_parameter("contacts per day must be non-negative"));
            }
            if row.participant_age.max as usize >= nr_ages
                || row.contact_age.max as usize >= nr_ages
            {
                return Err(Error::bad_parameter("contact row references unknown age"));
            }
        }
        let mut new = ContactMatrix {
            nr_ages,
            rows,
            baseline: vec![],
            averages: vec![],
            slots: vec![],
            mobility: vec![],
            masks: vec![],
            mass_gathering_limit: None,
        };
        new.rebuild();
        return Ok(new);
    }

    /// A plausible six-venue default table covering all ages.
    pub fn default_rows(nr_ages: usize) -> Vec<ContactRow> {
        let top = (nr_ages.saturating_sub(1)) as Age;
        let all = AgeRange::new(0, top);
        let row = |participant: AgeRange, contact: AgeRange, place, contacts| ContactRow {
            participant_age: participant,
            contact_age: contact,
            place,
            contacts,
        };
        let mut rows = vec![
            row(all, all, Place::Home, 3.0),
            row(all, all, Place::Transport, 1.0),
            row(all, all, Place::Leisure, 2.5),
            row(all, all, Place::Other, 1.5),
        ];
        if top >= 20 {
            let workers = AgeRange::new(20, top.min(64));
            rows.push(row(workers, workers, Place::Work, 4.0));
        }
        if top >= 3 {
            let pupils = AgeRange::new(3, top.min(19));
            rows.push(row(pupils, pupils, Place::School, 4.0));
        }
        return rows;
    }

    /// Average daily contacts for a participant age, after mobility scaling.
    pub fn avg_contacts(&self, age: Age) -> Real {
        self.averages[age as usize]
    }

    /// Average daily contacts before any mobility limitation.
    pub fn baseline_contacts(&self, age: Age) -> Real {
        self.baseline[age as usize]
    }

    pub fn slots(&self, age: Age) -> &[ContactSlot] {
        &self.slots[age as usize]
    }

    /// Apply a mobility factor (1 = unrestricted) to every venue/age bucket
    /// matched by the filter and regenerate the cumulative tables.
    pub fn set_mobility_factor(&mut self, factor: Real, place: Option<Place>, ages: AgeRange) {
        self.mobility.push(ScaleFilter {
            place,
            ages,
            value: factor,
        });
        self.rebuild();
    }

    /// Set the share of contacts where a mask is worn for matching buckets.
    pub fn set_mask_share(&mut self, share: Real, place: Option<Place>, ages: AgeRange) {
        self.masks.push(ScaleFilter {
            place,
            ages,
            value: share,
        });
        self.rebuild();
    }

    pub fn set_mass_gathering_limit(&mut self, limit: Option<usize>) {
        self.mass_gathering_limit = limit;
    }

    /// Pick the contact bucket for a uniform draw by scanning the cumulative
    /// table. A draw beyond the accumulated mass means the table degenerated.
    pub fn pick_slot(&self, age: Age, u: Real) -> std::result::Result<&ContactSlot, Problem> {
        let slots = &self.slots[age as usize];
        let i = slots.partition_point(|slot| slot.cumulative <= u);
        slots.get(i).ok_or(Problem::ContactProbability)
    }

    /// Fraction of baseline contacts currently suppressed by mobility
    /// limits, averaged over ages. Zero when unrestricted.
    pub fn mobility_limitation(&self) -> Real {
        let baseline: Real = self.baseline.iter().sum();
        if baseline <= 0.0 {
            return 0.0;
        }
        let current: Real = self.averages.iter().sum();
        return 1.0 - current / baseline;
    }

    /// Aggregate age-by-age view of daily contacts, summed over venues, with
    /// each row's mass spread uniformly over its contact-age interval.
    pub fn age_totals(&self) -> Array2<Real> {
        let mut totals = Array2::zeros((self.nr_ages, self.nr_ages));
        for row in &self.rows {
            for a in row.participant_age.min..=row.participant_age.max {
                let weight = row.contacts * self.mobility_factor(row.place, a);
                let share = weight / row.contact_age.span() as Real;
                for b in row.contact_age.min..=row.contact_age.max {
                    totals[(a as usize, b as usize)] += share;
                }
            }
        }
        return totals;
    }

    fn mobility_factor(&self, place: Place, age: Age) -> Real {
        self.mobility
            .iter()
            .rev()
            .find(|f| f.matches(place, age))
            .map_or(1.0, |f| f.value)
    }

    fn mask_share(&self, place: Place, age: Age) -> Real {
        self.masks
            .iter()
            .rev()
            .find(|f| f.matches(place, age))
            .map_or(0.0, |f| f.value)
    }

    fn rebuild(&mut self) {
        self.baseline = vec![0.0; self.nr_ages];
        self.averages = vec![0.0; self.nr_ages];
        self.slots = vec![vec![]; self.nr_ages];

        for a in 0..self.nr_ages {
            let age = a as Age;
            let mut total = 0.0;
            let mut weights = vec![];
            for row in &self.rows {
                if !row.participant_age.contains(age) {
                    continue;
                }
                self.baseline[a] += row.contacts;
                let weight = row.contacts * self.mobility_factor(row.place, age);
                total += weight;
                weights.push((row, weight));
            }
            self.averages[a] = total;
            if total <= 0.0 {
                continue;
            }
            let mut slots = Vec::with_capacity(weights.len());
            let mut acc = 0.0;
            for (row, weight) in weights {
                acc += weight;
                slots.push(ContactSlot {
                    place: row.place,
                    contact_age: row.contact_age,
                    cumulative: acc / total,
                    mask: self.mask_share(row.place, age),
                });
            }
            self.slots[a] = slots;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn matrix() -> ContactMatrix {
        ContactMatrix::from_rows(100, ContactMatrix::default_rows(100)).unwrap()
    }

    #[test]
    fn cumulative_table_reaches_one() {
        let m = matrix();
        for age in [0u8, 10, 30, 64, 65, 99] {
            let slots = m.slots(age);
            assert!(!slots.is_empty());
            assert_approx_eq!(slots.last().unwrap().cumulative, 1.0, 1e-9);
            for win in slots.windows(2) {
                assert!(win[0].cumulative <= win[1].cumulative);
            }
        }
    }

    #[test]
    fn averages_follow_the_table() {
        let m = matrix();
        // home + transport + leisure + other + work for a 30-year-old
        assert_approx_eq!(m.avg_contacts(30), 3.0 + 1.0 + 2.5 + 1.5 + 4.0, 1e-9);
        // no work or school rows for a 70-year-old
        assert_approx_eq!(m.avg_contacts(70), 3.0 + 1.0 + 2.5 + 1.5, 1e-9);
    }

    #[test]
    fn pick_slot_scans_cumulative() {
        let m = matrix();
        let first = m.pick_slot(30, 0.0).unwrap();
        assert_eq!(first.place, Place::Home);
        let last = m.pick_slot(30, 0.999_999).unwrap();
        assert_eq!(last.place, Place::Work);
        assert!(m.pick_slot(30, 1.5).is_err());
    }

    #[test]
    fn mobility_factor_scales_and_rescales() {
        let mut m = matrix();
        let before = m.avg_contacts(30);
        m.set_mobility_factor(0.2, None, AgeRange::new(0, 99));
        assert_approx_eq!(m.avg_contacts(30), before * 0.2, 1e-9);
        assert_approx_eq!(m.mobility_limitation(), 0.8, 1e-9);

        // later filters override earlier ones
        m.set_mobility_factor(1.0, None, AgeRange::new(0, 99));
        assert_approx_eq!(m.avg_contacts(30), before, 1e-9);
        assert_approx_eq!(m.mobility_limitation(), 0.0, 1e-9);
    }

    #[test]
    fn zero_reduction_is_a_noop() {
        let m = matrix();
        let mut m2 = m.clone();
        m2.set_mobility_factor(1.0, None, AgeRange::new(0, 99));
        for age in 0..100u8 {
            assert_eq!(m.slots(age), m2.slots(age));
            assert_approx_eq!(m.avg_contacts(age), m2.avg_contacts(age), 1e-12);
        }
    }

    #[test]
    fn place_filters_only_touch_their_venue() {
        let mut m = matrix();
        m.set_mobility_factor(0.0, Some(Place::Work), AgeRange::new(0, 99));
        assert_approx_eq!(m.avg_contacts(30), 3.0 + 1.0 + 2.5 + 1.5, 1e-9);
        // the work slot now carries zero probability mass
        let slots = m.slots(30);
        let work = slots.iter().position(|s| s.place == Place::Work).unwrap();
        assert!(work > 0);
        assert_approx_eq!(slots[work].cumulative, slots[work - 1].cumulative, 1e-12);
    }

    #[test]
    fn mask_shares_attach_to_slots() {
        let mut m = matrix();
        m.set_mask_share(0.7, Some(Place::Transport), AgeRange::new(0, 99));
        for slot in m.slots(40) {
            if slot.place == Place::Transport {
                assert_approx_eq!(slot.mask, 0.7, 1e-12);
            } else {
                assert_eq!(slot.mask, 0.0);
            }
        }
    }

    #[test]
    fn age_totals_match_averages() {
        let mut m = matrix();
        m.set_mobility_factor(0.5, None, AgeRange::new(0, 99));
        let totals = m.age_totals();
        for age in 0..100u8 {
            let row_sum: Real = totals.row(age as usize).sum();
            assert_approx_eq!(row_sum, m.avg_contacts(age), 1e-9);
        }
    }

    #[test]
    fn invalid_rows_are_rejected() {
        let rows = vec![ContactRow {
            participant_age: AgeRange::new(0, 150),
            contact_age: AgeRange::new(0, 99),
            place: Place::Home,
            contacts: 2.0,
        }];
        assert!(ContactMatrix::from_rows(100, rows).is_err());

        let rows = vec![ContactRow {
            participant_age: AgeRange::new(0, 99),
            contact_age: AgeRange::new(0, 99),
            place: Place::Home,
            contacts: -1.0,
        }];
        assert!(ContactMatrix::from_rows(100, rows).is_err());
    }

    #[test]
    fn age_range_accepts_scalar_form() {
        #[derive(Deserialize)]
        struct Holder {
            ages: AgeRange,
        }
        let one: Holder = toml::from_str("ages = 70\n").unwrap();
        assert_eq!(one.ages, AgeRange::new(70, 70));
        let two: Holder = toml::from_str("ages = [10, 19]\n").unwrap();
        assert_eq!(two.ages, AgeRange::new(10, 19));
        assert!(toml::from_str::<Holder>("ages = [30, 10]\n").is_err());
    }
}
