//! Test fixtures and doubles.
//!
//! Builders for the identities, properties and artifacts that almost
//! every test needs, plus connector doubles for exercising the
//! connection retry path without a real store outage.

mod connectors;
mod fixtures;

pub use connectors::FlakyConnector;
pub use fixtures::{new_artifact, properties, run_identity};
