//! Check-in state machine.
//!
//! The machine is split into a pure core and an impure shell:
//! - `state`, `event`, `effect`: the vocabulary of the machine
//! - `transition`: the pure `(State, Event) -> (State, Vec<Effect>)` function
//! - `interpreter`: executes effects against real collaborators and feeds
//!   the resulting events back in

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod state;
pub mod transition;
