//! Request-facing surface: decoded input and the binder that turns it into a
//! query plan.

pub mod input;
pub mod request;

pub use input::RequestInput;
pub use request::{parse_datetime, QueryRequest};
