pub mod schema;

pub use schema::{
    BufferEngineConfig, BufferedStoreConfig, CacheConfig, Config, DispatcherConfig, HubsConfig,
    ObservabilityConfig, ServerConfig,
};
