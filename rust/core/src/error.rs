// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for parsing and attribute access
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while tokenizing STEP content or reading entity attributes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Entity #{0} not found")]
    EntityNotFound(u32),

    #[error("#{id}={type_name}: missing required attribute {name}")]
    MissingAttribute {
        id: u32,
        type_name: &'static str,
        name: &'static str,
    },

    #[error("#{id}={type_name}: attribute {name} is not {expected}")]
    InvalidAttribute {
        id: u32,
        type_name: &'static str,
        name: &'static str,
        expected: &'static str,
    },
}

impl Error {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}
