use serde::{Deserialize, Serialize};

pub type OperationName = String;
pub type RpcArgs = Vec<serde_json::Value>;

/// Result of an RPC (JSON value).
pub type RpcResult = serde_json::Value;

/// The unit of work passed through a middleware pipeline.
///
/// Created once per invocation and dropped when the pipeline returns.
/// Middleware may rewrite `args` before handing the envelope on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rpc {
    pub name: OperationName,
    pub args: RpcArgs,
}

impl Rpc {
    pub fn new(name: impl Into<String>, args: RpcArgs) -> Self {
        Rpc {
            name: name.into(),
            args,
        }
    }
}
