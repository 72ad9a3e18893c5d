pub mod codec;
pub mod config;
pub mod error;
pub mod path;
pub mod query;
pub mod registry;
pub mod storage;
pub mod store;
pub mod value;

pub use config::{Settings, DEFAULT_STORE_NAME};
pub use error::{NestDbError, Result};
pub use query::{FieldPath, Operand, F, Q};
pub use registry::{Registry, SharedStore};
pub use store::{
    CollectionReference, DocumentReference, DocumentSnapshot, Query, QuerySnapshot, Store,
};
pub use value::{data_from_json, data_to_json, Data, Value};
