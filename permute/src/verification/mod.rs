//! Downstream verification collaborators.

pub mod lvs;
