//! Data model shared by the tabula store: semantic values with null
//! sentinels, the attribute/collection catalog and element inputs.

pub mod attribute;
pub mod collection;
pub mod error;
pub mod input;
pub mod value;

pub use attribute::*;
pub use collection::*;
pub use error::{TabulaError, TabulaResult};
pub use input::*;
pub use value::*;
