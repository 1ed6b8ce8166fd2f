//! Two-regime (or k-regime) Markov-switching regression.
//!
//! `y_t = x_t' β_{s_t} + ε_t`, `ε_t ~ N(0, σ²_{s_t})`, where `s_t` follows a
//! first-order Markov chain. Estimation is by EM over the Hamilton filter and
//! Kim smoother, optionally preceded by a seeded random-restart search.

mod classifier;
mod design;
mod em;
mod filter;
mod search;

pub use classifier::{fit, MIN_OBSERVATIONS};
