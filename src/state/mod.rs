/// State management module
///
/// This module handles all application state, including:
/// - Shared data structures (data.rs)
/// - Form drafts for the creation panels (edit.rs)
/// - The placement workflow (placement.rs)
/// - The entity store seam and its local/remote implementations
///   (store.rs, library.rs, remote.rs)
/// - The client-side query cache (cache.rs)

pub mod cache;
pub mod data;
pub mod edit;
pub mod library;
pub mod placement;
pub mod remote;
pub mod store;
