//! Core identifier types shared across the crate.

pub mod ids;

pub use ids::{AppId, DeliveryId, InstallationId, RepoId};
