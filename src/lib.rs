//   Copyright 2024 The PyMC Developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
#![warn(missing_docs)]

//! bart_trees provides the recursive-partition tree engine behind Bayesian
//! Additive Regression Trees (BART). A sampler drives it by proposing
//! birth, death, change and swap moves; the engine executes them on an
//! arena-backed tree whose nodes view slices of one shared buffer of
//! observation indices, keeping every leaf's average and effective
//! observation count consistent with the data.
//!
//! The sampler itself, acceptance ratios and prior families are left to the
//! caller. Default seams for the tree prior and the leaf model live in
//! [`ops`].

pub mod context;
pub mod data;
pub mod errors;
pub mod math;
pub mod node;
pub mod ops;
pub mod partition;
pub mod rule;
pub mod saved_tree;
pub mod serialize;
pub mod tree;

pub use context::TreeContext;
pub use data::{CutPoints, Data, VariableType, XInt};
pub use errors::TreeError;
pub use node::{Node, NodeId, NodeKind, OrphanedChildren};
pub use ops::{CgmPrior, EndNodeModel, MeanNormalModel, TreePrior};
pub use rule::Rule;
pub use saved_tree::{SavedNode, SavedTree};
pub use tree::{Tree, ROOT};
