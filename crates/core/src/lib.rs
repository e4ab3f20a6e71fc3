pub mod config;
pub mod generation;
pub mod metrics;
pub mod repository;
pub mod testing;
pub mod upstream;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, GenerationConfig,
    SanitizedConfig, ServerConfig, UpstreamConfig,
};
pub use generation::{
    ArtifactError, ArtifactKind, ArtifactPayload, ArtifactSlot, GenerationError, GenerationEvent,
    GenerationOrchestrator, GenerationToken, IssuedToken, Provenance, SessionSnapshot, SlotUpdate,
};
pub use repository::{parse_repository_url, ParseError, RepositoryRef};
pub use upstream::{HttpProcessingService, ProcessingService, UpstreamError};
