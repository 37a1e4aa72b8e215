// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry reconstruction
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Fatal to one entity; caught at the resolution boundary
    #[error("#{id}: {message}")]
    Entity { id: u32, message: String },

    #[error("Kernel operation failed: {0}")]
    Kernel(String),

    #[error("Triangulation failed: {0}")]
    Triangulation(String),

    #[error("Degenerate loop: {0}")]
    DegenerateLoop(String),

    #[error("Core parser error: {0}")]
    Core(#[from] ifc_import_core::Error),
}

impl Error {
    pub fn geometry(message: impl Into<String>) -> Self {
        Error::Geometry(message.into())
    }

    pub fn entity(id: u32, message: impl Into<String>) -> Self {
        Error::Entity {
            id,
            message: message.into(),
        }
    }

    pub fn kernel(message: impl Into<String>) -> Self {
        Error::Kernel(message.into())
    }
}
