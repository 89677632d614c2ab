mod context;
mod sampling;
mod state;

pub use context::*;
pub use sampling::*;
pub use state::*;
