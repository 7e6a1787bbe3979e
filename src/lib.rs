// Unsupervised domain adaptation by subspace alignment and entropic optimal transport

#![doc = include_str!("../README.md")]

pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod knn;
pub mod linalg_backends;
pub mod pca;
pub mod preprocessing;
pub mod selection;
pub mod sinkhorn;
pub mod stability;
pub mod subspace_alignment;
pub mod transport;


pub use error::{AdaptError, Result};
pub use evaluation::{random_half_split, repeated_split_accuracy, CrossValidationConfig, Split};
pub use experiment::{baseline_accuracy, DomainAdaptationExperiment, ExperimentConfig, ExperimentReport};
pub use knn::{accuracy, OneNearestNeighbor};
pub use pca::{pca_basis, PcaBasis, PcaDecomposition};
pub use preprocessing::standardize_columns;
pub use selection::{
    select_dimension, select_regularization, CandidateScore, DimensionSelection,
    RegularizationScoring, RegularizationSelection, Selection,
};
pub use sinkhorn::{sinkhorn_knopp, sinkhorn_log_domain, SinkhornConfig, SinkhornOutput, Stabilization};
pub use stability::{pooled_max_abs, stability_max_dimension, stability_threshold, StabilityConfig};
pub use subspace_alignment::{subspace_alignment_accuracy, SubspaceAlignment};
pub use transport::{
    normalized_cost, ot_transport_accuracy, pairwise_euclidean, transport_source,
    uniform_marginal, TransportConfig, TransportEvaluation, TransportMapping, TransportPlan,
};
