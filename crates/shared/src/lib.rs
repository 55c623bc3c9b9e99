pub mod env;
pub mod error;
pub mod libsql;
pub mod logging;
pub mod primitives;
pub mod test_utils;
// re-export paste for the macros
pub use paste;
