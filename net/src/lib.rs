pub use endpoint::{
    Endpoint,
    ParseEndpointError,
};
pub use stream::{
    ListenerOps,
    StreamOps,
};

mod endpoint;
mod stream;
