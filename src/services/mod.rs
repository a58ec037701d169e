//! Pipeline services.
//!
//! Each stage is a small service over the shared models: the analyzer stages
//! (extract, score, cluster) are read-only, the scheduler and aggregator turn
//! clusters into a decision table, and the restructuring executor is the only
//! writer of the inventory.

mod aggregator;
mod analysis;
mod clustering;
mod extractor;
pub mod keywords;
pub mod restructure;
mod scheduler;
mod similarity;

pub use aggregator::{Aggregation, VerdictAggregator};
pub use analysis::{AnalysisReport, AnalysisService, InventoryEntry, VerificationReport};
pub use clustering::ClusterBuilder;
pub use extractor::{DESCRIPTOR_FILE, MetadataExtractor};
pub use restructure::{ExecutionReport, OpReport, RestructuringExecutor};
pub use scheduler::EvaluationScheduler;
pub use similarity::{SimilarityScorer, UnitFeatures, domain_objects};
