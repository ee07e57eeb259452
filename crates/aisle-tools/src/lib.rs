//! Tool dispatch: JSON-RPC envelopes, registries, the fallback router and
//! the concrete product and visitor tools.
pub mod catalog_tools;
pub mod jsonrpc;
pub mod registry;
pub mod router;
pub mod visitor_tools;

pub use catalog_tools::{products_registry, ProductCatalog, ProductDeal, FETCH_PRODUCTS_TOOL};
pub use jsonrpc::{
    Envelope, ErrorCode, Notification, RequestId, RpcError, RpcOutcome, RpcRequest, RpcResponse,
    JSONRPC_VERSION,
};
pub use registry::{
    DuplicateToolPolicy, RegistryError, SchemaValidation, ToolDescriptor, ToolError,
    ToolExecutor, ToolProvider, ToolRegistry, ToolSpec,
};
pub use router::{RouterError, ToolCall, ToolRouter};
pub use visitor_tools::{
    visitor_id_argument, visitor_registry, VisitorProfile, VisitorRegistryError, VisitorService,
    VisitorServiceConfig, FETCH_VISITOR_DATA_TOOL,
};
