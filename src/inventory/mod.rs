//! Resource inventory layer
//!
//! Resource categories are defined data-first: each category is an entry in
//! one of the JSON files under `src/categories/`, compiled into the binary.
//! Adding a category needs no code change.
//!
//! # Architecture
//!
//! - [`registry`] - Loads category definitions from embedded JSON
//! - [`adapter`] - The `CategoryAdapter` capability and its REST implementation
//! - [`record`] - Normalized `ResourceRecord` and its attribute map

pub mod adapter;
pub mod record;
pub mod registry;

pub use adapter::{AdapterRegistry, CategoryAdapter, RestCategoryAdapter};
pub use record::{AttrValue, Attributes, ResourceRecord};
pub use registry::{get_all_category_tags, get_category, normalize_tag};
