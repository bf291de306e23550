//! Small async utilities shared by the driver.

pub mod timeout;

pub use timeout::TimeoutExt;
