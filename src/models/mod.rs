pub mod agent;
pub mod booking;
pub mod payment;

pub use agent::*;
pub use booking::*;
pub use payment::*;
