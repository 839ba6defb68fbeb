//! Client side of the fitting room: photo uploads, AI generation progress,
//! model caching, catalog sync and the garment rotation handoff.

pub mod cache;
pub mod error;
pub mod models;
pub mod services;
pub mod settings;

pub use cache::{CacheKey, ModelAssetCache};
pub use error::{ErrorKind, FittingResult};
