//! Servo positioning: wire protocol, controller, and the pan/tilt
//! specialization (§4.9, §4.10).

pub mod controller;
pub mod pantilt;
pub mod protocol;
