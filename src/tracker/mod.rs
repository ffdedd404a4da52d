//! Appearance-based multi-track correlator (§3, §4.8).

pub mod correlator;
pub mod histogram;
pub mod track;
