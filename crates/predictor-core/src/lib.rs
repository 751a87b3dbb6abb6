//! predictor-core: types and input checks for the prediction game
//!
//! Nothing in here touches storage or the network.

pub mod errors;
pub mod types;
pub mod validation;

pub use errors::*;
pub use types::*;
pub use validation::*;
