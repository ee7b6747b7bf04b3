//! Call lifecycle: session state and the state machine that drives it.

mod machine;
mod session;

#[cfg(test)]
mod e2e_tests;

pub use machine::{CallMachine, MachineLinks, SessionSnapshot};
pub use session::CallState;
