//! Static reference data: container formats and the scent catalog.

pub mod containers;
pub mod scents;

pub use containers::{all_containers, ContainerKind, ContainerType, CATALOG_VERSION};
pub use scents::{default_catalog, load_catalog, CategoryProfile, ScentCatalog, ScentNote};
