//! Domain layer: settlement records, their state transitions, and the ports
//! the application layer drives them through.

pub mod enrollment;
pub mod money;
pub mod payment;
pub mod ports;
pub mod referral;
