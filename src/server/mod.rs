// HTTP layer: the middleware, its bundle processor and a dev server
pub mod dev_server;
pub mod middleware;
pub mod processor;

pub use dev_server::*;
pub use middleware::*;
pub use processor::*;
