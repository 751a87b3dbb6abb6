mod health_check;
mod scheduler;

pub use health_check::*;
pub use scheduler::*;
