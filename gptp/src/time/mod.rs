//! Types that describe points in time ([`Time`]), and durations between two
//! instants ([`Duration`], [`Interval`])
//!
//! These are used throughout `gptp` instead of types from `std::time` as they
//! keep sub-nanosecond precision and can be negative where needed.

mod duration;
mod instant;
mod interval;

pub use duration::Duration;
pub use instant::Time;
pub use interval::Interval;
