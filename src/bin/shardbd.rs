//! Binary entry point: wires up logging, opens the engine with its
//! default configuration, declares a couple of starter collections, and
//! serves the wire protocol until killed.
//!
//! No CLI flag or environment-variable parsing lives here; embedding
//! applications that need non-default configuration are expected to
//! construct [`shardb::Config`] themselves and call [`shardb::engine::Engine::open`]
//! directly.

use shardb::{
    catalog::{FieldSpec, FieldType, Modifier, Schema},
    engine::Engine,
    server, Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> shardb::Result<()> {
    env_logger::init();

    let config = Config::default();
    let engine = Engine::open(config)?;

    engine.collection(
        "documents",
        Schema::new().with_field("id", FieldSpec::new(FieldType::String, vec![Modifier::Unique])),
    );
    engine.start_memory_monitoring();

    server::serve(engine).await
}
