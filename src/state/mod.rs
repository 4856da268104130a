/// State management module
///
/// This module handles all application state, including:
/// - The annotation catalog database (library.rs)
/// - Shared data structures and the JSON wire format (data.rs)

pub mod data;
pub mod library;
