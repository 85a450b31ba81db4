//! Bearcave Nodes
//!
//! Thin node-graph adapters over `bearcave-training`. Each node exposes one
//! `execute`-style operation taking owned inputs and returning an outputs
//! struct of strings/booleans, matching the host's wire contract. Nodes never
//! panic or return errors across the host boundary; failures are folded into
//! their status outputs.

pub mod caption;
pub mod define;
pub mod metadata;
pub mod train;

pub use caption::CaptionNode;
pub use define::{DefineNode, DefineOutputs};
pub use metadata::ProjectMetadata;
pub use train::{TrainInputs, TrainNode, TrainOutputs};
