//! Lightweight model inference used by the learned learner variants.
//!
//! Models are small MLPs serialised as JSON so they can be produced by any
//! offline training pipeline and loaded without a numerical runtime.

pub mod dense;

pub use dense::{softmax, Activation, DenseLayer, DenseNetwork};
