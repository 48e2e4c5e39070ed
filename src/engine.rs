//! Engine Facade: composes the [`crate::catalog::Catalog`], the
//! [`crate::shardset::ShardSet`], the [`crate::governor::Governor`], and
//! the [`crate::alog::AppendLog`] behind a single entry point the wire
//! protocol dispatches into.
//!
//! `handle` runs every operation to completion synchronously — the only
//! suspension points in this crate are the socket reads/writes in
//! [`crate::protocol`] and the governor's sampling tick; the engine
//! itself never yields mid-operation, matching the cooperative
//! single-threaded scheduling model the rest of the crate assumes.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use rmpv::Value;

use crate::{
    alog::AppendLog,
    catalog::{Catalog, Schema},
    config::{Config, MemoryConfig},
    err_at,
    governor::{Governor, MemoryStats},
    protocol::{as_doc_id, decode_value, encode_value, map_get, Action, Response, Status},
    shardset::{DocId, ShardSet},
    where_expr::Where,
    Result,
};

pub struct Engine {
    config: Config,
    catalog: Mutex<Catalog>,
    shards: Arc<ShardSet>,
    governor: Arc<Governor>,
    log: Arc<AppendLog>,
}

impl Engine {
    pub fn open(config: Config) -> Result<Arc<Engine>> {
        std::fs::create_dir_all(&config.dir).ok();
        let log_path = config.dir.join(&config.log_file);
        let log = Arc::new(AppendLog::open_background(&log_path, config.log_flush_threshold, 1024)?);
        let governor = Governor::new(config.memory.clone());
        let shards = ShardSet::new(config.shard_capacity, Arc::clone(&governor), Arc::clone(&log));
        info!(target: "shardb::engine", "opened engine at {:?}", config.dir);
        Ok(Arc::new(Engine { config, catalog: Mutex::new(Catalog::new()), shards, governor, log }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Declare (or overwrite) a collection's schema.
    pub fn collection(&self, name: &str, schema: Schema) -> Response<()> {
        self.catalog.lock().set(name, schema)
    }

    pub fn catalog_get(&self, name: &str) -> Response<Schema> {
        self.catalog.lock().get(name)
    }

    pub fn catalog_names(&self) -> Vec<String> {
        self.catalog.lock().names()
    }

    // -- memory controls -------------------------------------------------

    pub fn start_memory_monitoring(&self) {
        self.governor.start_monitoring();
    }

    pub fn stop_memory_monitoring(&self) {
        self.governor.stop_monitoring();
    }

    pub fn restart_memory_monitoring(&self) {
        self.governor.stop_monitoring();
        self.shards.reset_brake();
        self.governor.start_monitoring();
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.governor.stats()
    }

    pub fn update_memory_config(&self, cfg: MemoryConfig) {
        self.governor.update_config(cfg);
    }

    pub fn reset_emergency_brake(&self) {
        self.shards.reset_brake();
    }

    /// Force one memory-sampling pass immediately rather than waiting for
    /// the periodic ticker.
    pub fn sample_memory_now(&self) {
        self.governor.sample_now();
    }

    /// Stop monitoring and flush/join the append log's background writer.
    /// Only actually closes the log if this is the last outstanding
    /// `Arc<Engine>` and the engine's own `ShardSet` is the log's last
    /// other referent — otherwise this is a no-op stop-monitoring call,
    /// since some other holder is still relying on the log.
    pub async fn close(self: Arc<Engine>) -> Result<()> {
        self.governor.stop_monitoring();
        let engine = match Arc::try_unwrap(self) {
            Ok(engine) => engine,
            Err(_) => return Ok(()),
        };
        drop(engine.shards);
        match Arc::try_unwrap(engine.log) {
            Ok(log) => log.close(),
            Err(_) => Ok(()),
        }
    }

    /// Dispatch one decoded request to the appropriate component,
    /// returning the `Response<Value>` the wire protocol will encode.
    pub async fn handle(&self, action: Action, collection: &str, payload: Value) -> Response<Value> {
        if !self.catalog.lock().exists(collection) {
            return Response::error();
        }
        match self.dispatch(action, collection, &payload) {
            Ok(resp) => resp,
            Err(_) => Response::error(),
        }
    }

    fn dispatch(&self, action: Action, collection: &str, payload: &Value) -> Result<Response<Value>> {
        match action {
            Action::Create => self.do_create(collection, payload),
            Action::Get => self.do_get(collection, payload),
            Action::Update => self.do_update(collection, payload),
            Action::Delete => self.do_delete(collection, payload),
            Action::CreateMany => self.do_create_many(collection, payload),
            Action::GetMany => self.do_get_many(collection, payload),
            Action::UpdateMany => self.do_update_many(collection, payload),
            Action::DeleteMany => self.do_delete_many(collection, payload),
            Action::Find => self.do_find(collection, payload),
        }
    }

    fn doc_value(id: DocId, bytes: &[u8]) -> Result<Value> {
        let doc = decode_value(bytes)?;
        Ok(Value::Map(vec![(Value::from("id"), Value::from(id)), (Value::from("doc"), doc)]))
    }

    fn require_id(payload: &Value) -> Result<DocId> {
        match map_get(payload, "id").and_then(as_doc_id) {
            Some(id) => Ok(id),
            None => err_at!(Invalid, msg: "missing or invalid id"),
        }
    }

    fn require_doc(payload: &Value) -> Result<Vec<u8>> {
        match map_get(payload, "doc") {
            Some(doc) => encode_value(doc),
            None => err_at!(Invalid, msg: "missing doc"),
        }
    }

    fn require_ids(payload: &Value) -> Result<Vec<DocId>> {
        let arr = match map_get(payload, "ids").and_then(Value::as_array) {
            Some(a) => a,
            None => return err_at!(Invalid, msg: "missing ids"),
        };
        arr.iter()
            .map(|v| as_doc_id(v).ok_or(()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .or_else(|_| err_at!(Invalid, msg: "ids must be integers"))
    }

    fn require_docs(payload: &Value) -> Result<Vec<Vec<u8>>> {
        let arr = match map_get(payload, "docs").and_then(Value::as_array) {
            Some(a) => a,
            None => return err_at!(Invalid, msg: "missing docs"),
        };
        arr.iter().map(encode_value).collect()
    }

    fn require_items(payload: &Value) -> Result<Vec<(DocId, Vec<u8>)>> {
        let arr = match map_get(payload, "items").and_then(Value::as_array) {
            Some(a) => a,
            None => return err_at!(Invalid, msg: "missing items"),
        };
        arr.iter()
            .map(|item| {
                let id = Engine::require_id(item)?;
                let doc = Engine::require_doc(item)?;
                Ok((id, doc))
            })
            .collect()
    }

    fn do_create(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let doc = Engine::require_doc(payload)?;
        let resp = self.shards.set(collection, doc);
        Ok(resp.map(|id| Value::Map(vec![(Value::from("id"), Value::from(id))])))
    }

    fn do_get(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let id = Engine::require_id(payload)?;
        let resp = self.shards.get(collection, id);
        match resp.data {
            Some((id, bytes)) => Ok(Response::with_status(Status::Ok, Some(Engine::doc_value(id, &bytes)?))),
            None => Ok(Response::error()),
        }
    }

    fn do_update(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let id = Engine::require_id(payload)?;
        let doc = Engine::require_doc(payload)?;
        let resp = self.shards.update(collection, id, doc);
        match resp.data {
            Some((id, bytes)) => Ok(Response::with_status(Status::Ok, Some(Engine::doc_value(id, &bytes)?))),
            None => Ok(Response::error()),
        }
    }

    fn do_delete(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let id = Engine::require_id(payload)?;
        Ok(self.shards.delete(collection, id).map(Value::from))
    }

    fn do_create_many(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let docs = Engine::require_docs(payload)?;
        let resp = self.shards.set_many(collection, docs, false);
        Ok(resp.map(|ids| {
            let ids = Value::Array(ids.into_iter().map(Value::from).collect());
            Value::Map(vec![(Value::from("ids"), ids)])
        }))
    }

    fn do_get_many(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let ids = Engine::require_ids(payload)?;
        let resp = self.shards.get_many(collection, &ids);
        let map = resp.data.unwrap_or_default();
        let mut entries = vec![];
        for (id, bytes) in map {
            entries.push((Value::from(id), decode_value(&bytes)?));
        }
        Ok(Response::ok(Value::Map(entries)))
    }

    fn do_update_many(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let items = Engine::require_items(payload)?;
        let resp = self.shards.update_many(collection, items);
        match resp.data {
            Some(updated) => {
                let mut pairs = vec![];
                for (id, bytes) in updated {
                    pairs.push(Engine::doc_value(id, &bytes)?);
                }
                Ok(Response::ok(Value::Map(vec![(Value::from("updated"), Value::Array(pairs))])))
            }
            None => Ok(Response::error()),
        }
    }

    fn do_delete_many(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let ids = Engine::require_ids(payload)?;
        let resp = self.shards.delete_many(collection, &ids);
        Ok(resp.map(|ids| {
            let ids = Value::Array(ids.into_iter().map(Value::from).collect());
            Value::Map(vec![(Value::from("deleted"), ids)])
        }))
    }

    fn do_find(&self, collection: &str, payload: &Value) -> Result<Response<Value>> {
        let where_val = match map_get(payload, "where") {
            Some(w) => w,
            None => return err_at!(Invalid, msg: "missing where"),
        };
        let pred = Where::parse(where_val)?;
        let resp = self.shards.find(collection, &pred);
        match resp.data {
            Some(matches) => {
                let mut pairs = vec![];
                for (id, bytes) in matches {
                    pairs.push(Engine::doc_value(id, &bytes)?);
                }
                Ok(Response::ok(Value::Array(pairs)))
            }
            None => Ok(Response::error()),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Engine").field("dir", &self.config.dir).finish()
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
