// Blocks and the chain, derived UTXO state, and checks that need history.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
