// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity Decoder - On-demand entity parsing
//!
//! Records are located through a byte-offset index and decoded the first
//! time they are requested. Decoded entities are shared through `Arc`.

use crate::attribute::{AttributeValue, DecodedEntity};
use crate::error::{Error, Result};
use crate::parser::{parse_entity, record_end, EntityScanner};
use crate::schema::IfcType;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Entity id to `(start, end)` byte range of its record
pub type EntityIndex = FxHashMap<u32, (usize, usize)>;

/// Build the id index with a memchr scan for `#` followed by `id=`.
///
/// A record ends at the first `;` outside a quoted string.
pub fn build_entity_index(content: &str) -> EntityIndex {
    let bytes = content.as_bytes();
    let mut index = FxHashMap::with_capacity_and_hasher(bytes.len() / 50, Default::default());
    let mut pos = 0;

    while let Some(offset) = memchr::memchr(b'#', &bytes[pos..]) {
        let start = pos + offset;
        let digits = bytes[start + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let after_id = start + 1 + digits;
        // `#45=` and `#45 = ` are both valid
        let assign = after_id
            + bytes[after_id..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();

        let id = content[start + 1..after_id].parse::<u32>().ok();
        match id.filter(|_| bytes.get(assign) == Some(&b'=')) {
            Some(id) => {
                let Some(length) = record_end(&content[start..]) else {
                    break;
                };
                pos = start + length;
                index.insert(id, (start, pos));
            }
            None => pos = start + 1,
        }
    }

    index
}

/// Lazy entity decoder over one STEP file
pub struct EntityDecoder<'a> {
    content: &'a str,
    cache: FxHashMap<u32, Arc<DecodedEntity>>,
    entity_index: EntityIndex,
}

impl<'a> EntityDecoder<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            cache: FxHashMap::default(),
            entity_index: build_entity_index(content),
        }
    }

    fn decode_at(&mut self, start: usize, end: usize) -> Result<Arc<DecodedEntity>> {
        let line = &self.content[start..end];
        let (id, step_name, tokens) = parse_entity(line).map_err(|e| {
            Error::parse(
                start,
                format!("{}, input: {:?}", e, &line[..line.len().min(100)]),
            )
        })?;

        if let Some(entity) = self.cache.get(&id) {
            return Ok(Arc::clone(entity));
        }

        let attributes = tokens.iter().map(AttributeValue::from_token).collect();
        let entity = Arc::new(DecodedEntity::new(
            id,
            IfcType::from_step_name(step_name),
            step_name,
            attributes,
        ));
        self.cache.insert(id, Arc::clone(&entity));
        Ok(entity)
    }

    /// Decode entity by id; cached after the first call
    pub fn decode_by_id(&mut self, entity_id: u32) -> Result<Arc<DecodedEntity>> {
        if let Some(entity) = self.cache.get(&entity_id) {
            return Ok(Arc::clone(entity));
        }

        let (start, end) = self
            .entity_index
            .get(&entity_id)
            .copied()
            .ok_or(Error::EntityNotFound(entity_id))?;

        self.decode_at(start, end)
    }

    /// Follow an entity reference; `None` for `$`, `*` and non-references
    pub fn resolve_ref(&mut self, attr: &AttributeValue) -> Result<Option<Arc<DecodedEntity>>> {
        match attr.as_entity_ref() {
            Some(id) => Ok(Some(self.decode_by_id(id)?)),
            None => Ok(None),
        }
    }

    /// Ids of every record whose type derives from `declared`, in file order.
    ///
    /// Only type keywords are inspected; attributes stay undecoded.
    pub fn ids_of_type(&self, declared: IfcType) -> Vec<u32> {
        let mut scanner = EntityScanner::new(self.content);
        let mut ids = Vec::new();
        while let Some((id, step_name, _, _)) = scanner.next_entity() {
            if IfcType::from_step_name(step_name).is_subtype_of(declared) {
                ids.push(id);
            }
        }
        ids
    }

    /// Number of decoded entities held in the cache
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}
