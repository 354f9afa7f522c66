//! Credit-card billing periods

pub mod assignment;
pub mod boundary;
pub mod calendar;
pub mod cycle;
pub mod plan_z;

pub use boundary::{period_boundary, period_month_for, PeriodBoundary, PeriodWindow};
pub use cycle::*;
pub use plan_z::{split_plan_z, PlanZSplit};
