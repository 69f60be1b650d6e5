//! Relationship detection and sampling order.
//!
//! [`detect`] builds the [`RelationshipGraph`] from raw domains and their
//! profiles. [`order`] turns its statistical edges into a dependency DAG
//! ([`dag`], with cycles broken by [`cycle`]) and plans the per-subject
//! sampling order.

pub mod cycle;
pub mod dag;
pub mod detect;
pub mod order;
pub mod relationships;
pub mod visualize;

pub use detect::{detect_relationships, linkage_components, DetectionOptions};
pub use order::{plan_sampling_order, SamplingOrder};
pub use relationships::{Relationship, RelationshipDetail, RelationshipGraph, RelationshipType, VariableRef};
