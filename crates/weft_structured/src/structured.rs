//! The structured cell: composed JSON state with channel-based writes.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};
use weft_common::{Buffer, CellType, Checksum};
use weft_convert::value::canonical_json;
use weft_graph::{CellId, Manager, ScellId};

use crate::error::StructuredError;
use crate::paths;

/// A structured cell.
///
/// Holds an authoritative JSON value plus a set of inchannels written
/// through the graph. Joins overlay the channel values onto the
/// authoritative value and publish the result to the data cell, from
/// which outchannels are read with ordinary path expressions.
#[derive(Debug)]
pub struct StructuredCell {
    scell: ScellId,
    data_cell: CellId,
    schema_cell: Option<CellId>,
    auth: Value,
    channels: BTreeMap<Vec<String>, Checksum>,
    join_cache: HashMap<Checksum, Checksum>,
}

impl StructuredCell {
    /// Creates a structured cell, validating inchannel non-overlap and
    /// registering the channel maps in the graph.
    pub fn new(
        manager: &mut Manager,
        inchannels: Vec<Vec<String>>,
        outchannels: Vec<Vec<String>>,
    ) -> Result<Self, StructuredError> {
        paths::validate_inchannels(&inchannels)?;
        let data_cell = manager.register_cell(CellType::Mixed);
        let scell = manager.register_structured_cell(data_cell, inchannels, outchannels)?;
        Ok(Self {
            scell,
            data_cell,
            schema_cell: None,
            auth: Value::Null,
            channels: BTreeMap::new(),
            join_cache: HashMap::new(),
        })
    }

    /// The graph registration.
    pub fn scell(&self) -> ScellId {
        self.scell
    }

    /// The cell holding the joined value.
    pub fn data_cell(&self) -> CellId {
        self.data_cell
    }

    /// Attaches a schema cell. The slot is carried verbatim; validation
    /// is up to the embedder.
    pub fn set_schema_cell(&mut self, cell: Option<CellId>) {
        self.schema_cell = cell;
    }

    /// The attached schema cell, if any.
    pub fn schema_cell(&self) -> Option<CellId> {
        self.schema_cell
    }

    /// The authoritative value, before channel overlay.
    pub fn auth_value(&self) -> &Value {
        &self.auth
    }

    /// Writes the authoritative value at a path and re-joins.
    pub fn set_auth(
        &mut self,
        manager: &mut Manager,
        path: &[String],
        value: Value,
    ) -> Result<Checksum, StructuredError> {
        paths::set_at_path(&mut self.auth, path, value)?;
        self.join(manager)
    }

    /// Drains pending inchannel deltas from the manager and re-joins if
    /// anything changed.
    pub fn sync(&mut self, manager: &mut Manager) -> Result<Option<Checksum>, StructuredError> {
        let deltas = manager.take_deltas(self.scell);
        if deltas.is_empty() {
            return Ok(None);
        }
        for (path, checksum) in deltas {
            match checksum {
                Some(cs) => {
                    debug!(path = %paths::render(&path), %cs, "inchannel delta");
                    self.channels.insert(path, cs);
                }
                None => {
                    debug!(path = %paths::render(&path), "inchannel retracted");
                    self.channels.remove(&path);
                }
            }
        }
        self.join(manager).map(Some)
    }

    /// Overlays the channels on the authoritative value and publishes the
    /// joined buffer to the data cell. Identical joins are served from
    /// the join digest cache.
    pub fn join(&mut self, manager: &mut Manager) -> Result<Checksum, StructuredError> {
        let auth_bytes = canonical_json(&self.auth);
        let auth_checksum = Checksum::from_bytes(&auth_bytes);
        let digest = self.join_digest(auth_checksum);
        if let Some(joined) = self.join_cache.get(&digest) {
            if manager.cache().is_resident(*joined) {
                debug!(%digest, %joined, "join digest cache hit");
                manager.set_cell_checksum(self.data_cell, Some(*joined))?;
                return Ok(*joined);
            }
        }
        let mut value = self.auth.clone();
        for (path, checksum) in &self.channels {
            let buffer = manager.fingertip(*checksum)?;
            let member: Value = serde_json::from_slice(buffer.as_bytes()).map_err(|_| {
                StructuredError::NotJson {
                    path: paths::render(path),
                }
            })?;
            if let Err(err) = paths::set_at_path(&mut value, path, member) {
                warn!(path = %paths::render(path), "channel overlay blocked");
                return Err(err);
            }
        }
        let bytes = canonical_json(&value);
        let joined = Checksum::from_bytes(&bytes);
        manager.set_cell(self.data_cell, Buffer::new(bytes))?;
        self.join_cache.insert(digest, joined);
        debug!(%digest, %joined, "joined");
        Ok(joined)
    }

    /// The joined value currently published, if any.
    pub fn data_checksum(&self, manager: &Manager) -> Option<Checksum> {
        manager.graph().cell(self.data_cell).and_then(|c| c.checksum)
    }

    /// Tears down the registration and the data cell.
    pub fn destroy(self, manager: &mut Manager) {
        manager.destroy_structured_cell(self.scell);
        manager.destroy_cell(self.data_cell);
    }

    /// Digest over the authoritative checksum and the sorted channel
    /// states; keys the join cache.
    fn join_digest(&self, auth_checksum: Checksum) -> Checksum {
        let mut material = Vec::new();
        material.extend_from_slice(auth_checksum.as_raw());
        for (path, checksum) in &self.channels {
            material.extend_from_slice(paths::render(path).as_bytes());
            material.push(0);
            material.extend_from_slice(checksum.as_raw());
        }
        Checksum::from_bytes(&material)
    }
}
