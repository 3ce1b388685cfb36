//! The synchronous scheduler, continuous-time integrator, and façade entry
//! points for the tickflow reactive dataflow runtime.
//!
//! A graph is assembled and compiled with `tickflow_ir` (re-exported as
//! `tickflow_ir` for convenience); the resulting `Ir` is handed to
//! `runtime::Runtime::new`, which builds an execution `schedule` and then
//! drives the graph one tick at a time through `Runtime::run_tick`.
//! `facade` wraps both halves behind the four operations spec.md §6 exposes
//! to out-of-scope collaborators: register node, add edge, compile, run
//! tick.

pub mod context;
pub mod continuous;
pub mod errors;
pub mod facade;
pub mod runtime;
pub mod scheduler;

pub use tickflow_ir;
