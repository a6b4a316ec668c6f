pub mod schema;

pub use schema::{
    expand_path, ClassifierConfig, Config, DataConfig, EscalationConfig, GatewayConfig,
    HistoryConfig, ReliabilityConfig, ToolLoopSettings,
};
