//! Background services — cancellable tick loops owned by the supervisor
//!
//! Three independent tasks keep the runtime's adaptive state moving:
//! - `VitalityCycle` ages component health and auto-regenerates
//! - `TCellReaper` retires expired T-cells from the threat detector
//! - `RouteEvolver` runs the periodic route fitness evolution step
//!
//! Each task owns its loop and exits promptly when its
//! `CancellationToken` fires, so shutdown never references freed state.

pub mod evolver;
pub mod reaper;
pub mod vitality_cycle;

pub use evolver::RouteEvolver;
pub use reaper::TCellReaper;
pub use vitality_cycle::VitalityCycle;
