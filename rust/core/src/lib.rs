// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Import Core
//!
//! STEP/IFC tokenizer built with [nom](https://docs.rs/nom) and typed
//! attribute access for the geometry importer.
//!
//! - **Tokenization**: zero-copy parsing of `#id=TYPE(...);` records
//! - **Entity index**: [memchr](https://docs.rs/memchr) scan mapping ids to byte ranges
//! - **Lazy decoding**: entities are decoded on first access and cached
//! - **Typed accessors**: `required_*` / `optional_*` getters on [`DecodedEntity`]
//!
//! ```rust,ignore
//! use ifc_import_core::{EntityDecoder, IfcType};
//!
//! let content = "#1=IFCCARTESIANPOINT((0.,0.,1.));";
//! let mut decoder = EntityDecoder::new(content);
//! let point = decoder.decode_by_id(1)?;
//! assert_eq!(point.ifc_type, IfcType::IfcCartesianPoint);
//! let coords = point.required_floats(0, "Coordinates")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: serialization support for [`IfcType`]

pub mod attribute;
pub mod decoder;
pub mod error;
pub mod parser;
pub mod schema;

pub use attribute::{AttributeValue, DecodedEntity};
pub use decoder::{build_entity_index, EntityDecoder, EntityIndex};
pub use error::{Error, Result};
pub use parser::{parse_entity, EntityScanner, Token};
pub use schema::IfcType;
