mod contacts;
mod disease;
mod interventions;

pub use contacts::*;
pub use disease::*;
pub use interventions::*;
