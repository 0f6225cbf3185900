//! Reverse-mode automatic differentiation.
//!
//! The estimator is differentiated twice per training step: once with respect
//! to its inputs (for the transport residual) and once with respect to its
//! parameters (for the optimizer). Both passes run on the same [`Tape`]; the
//! first pass records its adjoints as ordinary nodes so the second pass can
//! differentiate through them.

mod tape;

pub use tape::{Matrix, Tape, Var};
