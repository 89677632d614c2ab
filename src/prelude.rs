pub use crate::agent::{Person, PersonState, MAX_CONTACTS, MAX_INFECTEES};
pub use crate::classed::ClassedValues;
pub use crate::epidemic::*;
pub use crate::error::{Error, Problem, Result};
pub use crate::healthcare::{HealthcareSystem, TestingMode};
pub use crate::pop::Population;
pub use crate::rng::RandomPool;
pub use crate::sim::{Context, DayState, SampleTarget, Samples, Scenario};

pub type Real = f64;
pub type Age = u8;
pub type Day = i32;
pub type Id = usize;
