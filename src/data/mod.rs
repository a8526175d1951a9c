/// Data layer: file loading, path resolution, and caching.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────────┐
///   │ PathResolver │  relative path → existing file
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ColumnTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ DatasetCache │  keep recently used tables in memory
///   └──────────────┘
/// ```

pub mod cache;
pub mod loader;
pub mod resolver;

pub use cache::DatasetCache;
pub use loader::{load_table, write_parquet, Column, ColumnTable};
pub use resolver::PathResolver;
