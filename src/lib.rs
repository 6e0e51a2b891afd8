pub mod api;
pub mod app;
pub mod audit;
pub mod cases;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod locks;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod risk;
pub mod rules;
pub mod storage;
pub mod velocity;
pub mod whitelist;
pub mod workflow;

pub use app::Services;
pub use config::Config;
pub use error::{FraudError, FraudResult};
pub use pipeline::{DetectionPipeline, PipelineOutcome};
pub use rules::RuleSet;
