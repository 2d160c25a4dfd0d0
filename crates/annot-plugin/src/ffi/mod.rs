//! C ABI definitions for the two supported plugin formats.

pub mod ladspa;
pub mod safety;
pub mod vamp;
