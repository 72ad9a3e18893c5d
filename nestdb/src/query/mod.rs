//! Filtering, ordering and pagination over a collection's documents.

pub mod executor;
pub mod field_path;
pub mod filter;
pub mod lookup;
pub mod spec;

pub use executor::apply;
pub use field_path::{FieldPath, DOCUMENT_ID_TOKEN};
pub use filter::{Connector, Operand, F, Q};
pub use lookup::{registry, Lookup, LookupRegistry};
pub use spec::{Cursor, Limit, OrderClause, QuerySpec};
