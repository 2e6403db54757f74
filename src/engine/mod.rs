//! Scoreboard engine: aggregation, ranking, display colors and milestone notifications.
//!
//! Everything in here is synchronous and infallible over already-fetched data. The only state is
//! the [`MilestoneTracker`] snapshot, which callers own and pass in explicitly.
//!
//! [`MilestoneTracker`]: crate::engine::milestone::MilestoneTracker

pub mod bonus;
pub mod color;
pub mod milestone;
pub mod pass;
pub mod sound;
pub mod stats;

pub mod prelude {
    pub use crate::engine::milestone::MilestoneTracker;
    pub use crate::engine::pass::{Notification, run_pass};
    pub use crate::engine::stats::Standings;
}
