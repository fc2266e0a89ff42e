//! Template layouts and their placeholder slots
//!
//! The catalog is the only knowledge the pipeline has of the template in use:
//! plans are checked against it, workers correct slide specs against it and
//! the planning collaborator is handed its layout explanations.

pub mod catalog;

pub use catalog::{
    CatalogError, LayoutCatalog, LayoutExplanation, Placeholder, PlaceholderKind,
    PlaceholderRole, RoleParseError, TemplateLayout,
};
