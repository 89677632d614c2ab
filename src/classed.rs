use crate::error::{Error, Result};
use crate::prelude::Real;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A step function over integer classes. Classes are ages for the
/// age-dependent disease parameters and day offsets for the infectiousness
/// profile. Values are stored as sorted (class, value) cuts.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassedValues {
    cuts: Vec<(i32, Real)>,
}

impl ClassedValues {
    /// A step function that is constant everywhere.
    pub fn scalar(value: Real) -> Self {
        ClassedValues {
            cuts: vec![(0, value)],
        }
    }

    /// Build from (class, value) pairs. Classes must be distinct; pairs are
    /// sorted internally.
    pub fn from_pairs(pairs: impl Into<Vec<(i32, Real)>>) -> Result<Self> {
        let mut cuts = pairs.into();
        if cuts.is_empty() {
            return Err(Error::bad_parameter("classed values need at least one cut"));
        }
        cuts.sort_by_key(|&(class, _)| class);
        for win in cuts.windows(2) {
            if win[0].0 == win[1].0 {
                return Err(Error::bad_parameter(format!(
                    "duplicated class {} in classed values",
                    win[0].0
                )));
            }
        }
        return Ok(ClassedValues { cuts });
    }

    /// Value of the step the class falls in: the entry with the greatest cut
    /// not above `class`. Classes below the first cut get the first value.
    pub fn step(&self, class: i32) -> Real {
        let i = self.cuts.partition_point(|&(c, _)| c <= class);
        if i == 0 {
            return self.cuts[0].1;
        }
        return self.cuts[i - 1].1;
    }

    /// Value at exactly `class`, or 0 when no cut matches. Used for the
    /// day-indexed infectiousness profile, which is zero outside its support.
    pub fn exact(&self, class: i32) -> Real {
        match self.cuts.binary_search_by_key(&class, |&(c, _)| c) {
            Ok(i) => self.cuts[i].1,
            Err(_) => 0.0,
        }
    }

    pub fn cuts(&self) -> &[(i32, Real)] {
        &self.cuts
    }

    pub fn classes(&self) -> impl Iterator<Item = i32> + '_ {
        self.cuts.iter().map(|&(c, _)| c)
    }

    pub fn values(&self) -> impl Iterator<Item = Real> + '_ {
        self.cuts.iter().map(|&(_, v)| v)
    }

    /// True when every value lies in [0, 1]. Probability tables are checked
    /// with this at construction.
    pub fn is_probability(&self) -> bool {
        self.values().all(|v| (0.0..=1.0).contains(&v))
    }
}

impl From<Real> for ClassedValues {
    fn from(value: Real) -> Self {
        ClassedValues::scalar(value)
    }
}

// Serialized either as a bare scalar or as {classes = [...], values = [...]},
// mirroring how scalar-or-distribution parameters are configured.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassedRepr {
    Scalar(Real),
    Table { classes: Vec<i32>, values: Vec<Real> },
}

impl<'de> Deserialize<'de> for ClassedValues {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match ClassedRepr::deserialize(deserializer)? {
            ClassedRepr::Scalar(v) => Ok(ClassedValues::scalar(v)),
            ClassedRepr::Table { classes, values } => {
                if classes.len() != values.len() {
                    return Err(serde::de::Error::custom(
                        "classes and values must have the same length",
                    ));
                }
                let pairs: Vec<_> = classes.into_iter().zip(values).collect();
                ClassedValues::from_pairs(pairs).map_err(serde::de::Error::custom)
            }
        }
    }
}

impl Serialize for ClassedValues {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        if self.cuts.len() == 1 {
            return serializer.serialize_f64(self.cuts[0].1);
        }
        let mut st = serializer.serialize_struct("ClassedValues", 2)?;
        st.serialize_field("classes", &self.classes().collect::<Vec<_>>())?;
        st.serialize_field("values", &self.values().collect::<Vec<_>>())?;
        st.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_lookup() {
        let vals = ClassedValues::from_pairs(vec![(0, 0.1), (10, 0.2), (70, 0.5)]).unwrap();
        assert_eq!(vals.step(-3), 0.1);
        assert_eq!(vals.step(0), 0.1);
        assert_eq!(vals.step(9), 0.1);
        assert_eq!(vals.step(10), 0.2);
        assert_eq!(vals.step(69), 0.2);
        assert_eq!(vals.step(70), 0.5);
        assert_eq!(vals.step(120), 0.5);
    }

    #[test]
    fn exact_lookup_is_zero_off_support() {
        let vals = ClassedValues::from_pairs(vec![(-1, 0.2), (0, 0.3), (1, 0.1)]).unwrap();
        assert_eq!(vals.exact(0), 0.3);
        assert_eq!(vals.exact(-1), 0.2);
        assert_eq!(vals.exact(2), 0.0);
        assert_eq!(vals.exact(-11), 0.0);
    }

    #[test]
    fn duplicated_classes_are_rejected() {
        assert!(ClassedValues::from_pairs(vec![(0, 0.1), (0, 0.2)]).is_err());
        assert!(ClassedValues::from_pairs(Vec::<(i32, Real)>::new()).is_err());
    }

    #[test]
    fn toml_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Holder {
            p: ClassedValues,
        }
        let holder = Holder {
            p: ClassedValues::from_pairs(vec![(0, 0.1), (50, 0.4)]).unwrap(),
        };
        let data = toml::to_string(&holder).unwrap();
        let holder_: Holder = toml::from_str(&data).unwrap();
        assert_eq!(holder, holder_);

        let scalar: Holder = toml::from_str("p = 0.25\n").unwrap();
        assert_eq!(scalar.p, ClassedValues::scalar(0.25));
    }
}
