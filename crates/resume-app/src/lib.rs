// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod cancel;
pub mod content;
pub mod ids;
pub mod model;
pub mod source;
pub mod state;

pub use cancel::*;
pub use content::*;
pub use ids::*;
pub use model::*;
pub use source::*;
pub use state::*;
