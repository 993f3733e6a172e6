// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Cancellable background fetches against a [`resume_app::CatalogSource`],
//! delivered to a single consumer loop.

pub mod bridge;
pub mod cache;
pub mod error;
pub mod executor;
pub mod registry;

pub use bridge::*;
pub use cache::*;
pub use error::*;
pub use executor::*;
pub use registry::*;
