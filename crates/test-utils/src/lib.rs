//! Test utilities for junction wallet components.
//!
//! This crate provides fixture builders for devices, wallets and PSBTs, both as domain
//! values and as the JSON the backend sends, plus [`StubBackend`], an in-process HTTP
//! server that answers canned responses and records every request it receives.

pub mod fixtures;

mod stub;

pub use self::stub::{RecordedRequest, StubBackend, StubResponse};
