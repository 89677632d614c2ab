use crate::prelude::Id;
use std::fmt::{self, Display};
use std::io;

/// Invariant violations that abort the current simulation day. These indicate
/// parameter misconfiguration or an internal bug; the simulation is not
/// usable after one is raised.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Problem {
    /// An agent infected more people than its bounded infectee list can hold.
    TooManyInfectees,
    /// A single agent requested more daily contacts than the hard cap.
    TooManyContacts,
    /// Bed/ICU bookkeeping went out of range.
    HospitalAccounting,
    /// The contact count formula produced a negative value.
    NegativeContacts,
    /// A state transition was requested from an incompatible state.
    WrongState,
    /// The cumulative contact probability table does not reach 1.
    ContactProbability,
    /// An infectee record does not point back to its infector.
    InfecteesMismatch,
}

impl Problem {
    /// Stable, human-readable failure code.
    pub fn code(self) -> &'static str {
        match self {
            Problem::TooManyInfectees => "too-many-infectees",
            Problem::TooManyContacts => "too-many-contacts",
            Problem::HospitalAccounting => "hospital-accounting-failure",
            Problem::NegativeContacts => "negative-contacts",
            Problem::WrongState => "wrong-state",
            Problem::ContactProbability => "contact-probability-failure",
            Problem::InfecteesMismatch => "infectees-mismatch",
        }
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Crate-level error type. Validation errors surface immediately at
/// construction or intervention application; `Simulation` wraps an invariant
/// violation raised while advancing a day.
#[derive(Debug)]
pub enum Error {
    UnknownVariant(String),
    UnknownIntervention(String),
    BadParameter(String),
    Simulation { problem: Problem, agent: Option<Id> },
    IoError(io::Error),
    CsvError(csv::Error),
    TomlError(toml::de::Error),
}

impl Error {
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Error::BadParameter(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::IoError(error)
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Error::CsvError(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::TomlError(error)
    }
}

impl From<(Problem, Option<Id>)> for Error {
    fn from((problem, agent): (Problem, Option<Id>)) -> Self {
        Error::Simulation { problem, agent }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownVariant(name) => write!(f, "unknown variant: {}", name),
            Error::UnknownIntervention(name) => write!(f, "unknown intervention: {}", name),
            Error::BadParameter(msg) => write!(f, "bad parameter: {}", msg),
            Error::Simulation { problem, agent } => match agent {
                Some(id) => write!(f, "simulation failed: {} (agent {})", problem, id),
                None => write!(f, "simulation failed: {}", problem),
            },
            Error::IoError(e) => write!(f, "{}", e),
            Error::CsvError(e) => write!(f, "{}", e),
            Error::TomlError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_codes_are_stable() {
        assert_eq!(Problem::TooManyInfectees.code(), "too-many-infectees");
        assert_eq!(Problem::ContactProbability.code(), "contact-probability-failure");
    }

    #[test]
    fn simulation_error_mentions_agent() {
        let err = Error::from((Problem::TooManyContacts, Some(42)));
        let msg = format!("{}", err);
        assert!(msg.contains("too-many-contacts"));
        assert!(msg.contains("42"));
    }
}
