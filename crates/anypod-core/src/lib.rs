//! Core domain types for Anypod

mod error;
mod models;
mod podcast;

pub use error::CoreError;
pub use models::*;
pub use podcast::{PodcastCategories, PodcastExplicit, PodcastType};
