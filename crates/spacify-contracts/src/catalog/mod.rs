mod registry;

pub use registry::{CatalogFilter, CategorySummary, FurnitureCatalog, FurnitureItem};
