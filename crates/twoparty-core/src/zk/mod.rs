//! Zero-knowledge building blocks shared by both schemes

pub mod commitment;
pub mod dlog;

pub use commitment::{CommittedProof, DLogCommitment, DLogWitness};
pub use dlog::DLogProof;
