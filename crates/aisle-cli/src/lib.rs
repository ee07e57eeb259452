//! Command-line surface and process wiring for the Aisle assistant server.

pub mod cli_args;
pub mod startup;
pub mod validation;

pub use cli_args::Cli;
pub use startup::{
    build_gateway_config, build_openai_config, build_orchestrator, build_orchestrator_config,
    build_tool_router, log_configuration_presence, run_server,
};
pub use validation::validate_cli;
