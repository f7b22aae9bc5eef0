/// Generates a typed wrapper with one async method per remote operation.
///
/// Each method forwards its arguments, in order, to
/// [`Invoke::call`](crate::Invoke::call) under the method's name. The
/// wrapper is generic over the invoker, so the same type works over a
/// [`Client`](crate::Client) and over a [`RetryProxy`](crate::RetryProxy).
///
/// ```
/// use ferrule_client::rpc_client;
///
/// rpc_client! {
///     /// Typed client for the user service.
///     pub struct UserClient {
///         fn get_user(id);
///         fn rename_user(id, name);
///         fn ping();
///     }
/// }
/// ```
///
/// ```rust,no_run
/// # use ferrule_client::{rpc_client, Client, RetryOptions};
/// # use serde_json::json;
/// # rpc_client! { pub struct UserClient { fn get_user(id); } }
/// # async fn example(client: Client) -> Result<(), ferrule_common::RpcError> {
/// let users = UserClient::new(client.clone());
/// let user = users.get_user(json!(1)).await?;
///
/// let retrying = UserClient::new(client.with_retry(RetryOptions::default()));
/// let user = retrying.get_user(json!(1)).await?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! rpc_client {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$op_meta:meta])*
                fn $op:ident ( $($arg:ident),* $(,)? );
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name<C = $crate::Client> {
            inner: C,
        }

        #[allow(dead_code)]
        impl<C: $crate::Invoke> $name<C> {
            $vis fn new(inner: C) -> Self {
                Self { inner }
            }

            $vis fn inner(&self) -> &C {
                &self.inner
            }

            $(
                $(#[$op_meta])*
                $vis async fn $op(
                    &self,
                    $($arg: $crate::__private::Value),*
                ) -> $crate::__private::Result<$crate::__private::Value> {
                    $crate::Invoke::call(&self.inner, stringify!($op), vec![$($arg),*]).await
                }
            )*
        }
    };
}
