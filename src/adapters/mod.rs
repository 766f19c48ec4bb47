/// Adapters from other connection styles to `MessageEndpointConnection`

pub mod async_connection;

pub use async_connection::{AsyncConnectionAdapter, AsyncMessageConnection};
