//! HTTP gateway for the Aisle shopping assistant: JSON-RPC chat endpoints,
//! SSE token streaming and tool catalog listing.

mod gateway_server;

pub use gateway_server::{
    build_gateway_router, run_gateway_server, GatewayConfig, DEFAULT_CORS_ORIGINS,
};
