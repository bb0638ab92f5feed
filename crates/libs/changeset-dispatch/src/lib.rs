//! JSON-RPC method dispatcher (spec §4.7): the tool registry, the resource
//! URI reader, and the request/result framing that both transports
//! (`changeset-stdio`, `changeset-http`) drive. Neither transport knows
//! anything about `WorkflowEngine` directly — they build a `JsonRpcRequest`
//! from their own framing and hand it to `rpc::Dispatcher`.

pub mod resources;
pub mod rpc;
pub mod tools;

pub use rpc::{Dispatcher, JsonRpcErrorObj, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
