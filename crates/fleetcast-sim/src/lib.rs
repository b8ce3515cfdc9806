//! Resource simulation for the Fleetcast broadcast service.
//!
//! This crate owns the simulated fleet and the task board that the
//! snapshot generator polls:
//!
//! - [`unit`] -- [`Unit`] state, workload admission, elapsed-time CPU
//!   occupancy, and guaranteed release on completion.
//! - [`fleet`] -- [`Fleet`], the set of units built once at start-up from
//!   placement settings.
//! - [`task_board`] -- [`TaskBoard`], tasks and unit assignments with
//!   non-blocking reads.
//! - [`error`] -- Error types for all of the above.
//!
//! Units mutate only themselves, from their own workload tasks. Nothing
//! in this crate is ever written by the broadcast path.

pub mod error;
pub mod fleet;
pub mod task_board;
pub mod unit;

pub use error::{TaskBoardError, UnitError, WorkloadError};
pub use fleet::{Fleet, UnitSpec};
pub use task_board::{Task, TaskBoard, TaskSpec};
pub use unit::{Unit, UnitHandle, UnitParams, UnitState, WorkloadReport, WorkloadRequest};
