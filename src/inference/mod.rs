//! Inference layer primitives.
//!
//! Condition matching and per-pass agenda construction. Neither mutates the
//! fact store; the session drives them and applies rule actions.

mod agenda;
mod matcher;

pub use agenda::{Activation, Agenda, Refraction};
pub(crate) use matcher::cached_regex;
pub use matcher::{is_satisfied, match_condition, match_pattern, still_matches, Binding, Match};
