//! Wire payloads exchanged with the backend and their conversions into domain types.

mod request;
mod response;

pub use self::{request::*, response::*};
