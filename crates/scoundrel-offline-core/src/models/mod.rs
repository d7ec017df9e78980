//! HTTP exchange models shared by the storage, network and worker layers.
//!
//! - `Request`: an intercepted request with its method, URL and mode
//! - `Response`: a fully buffered response, cheap to clone before storage
//! - `ResponseSource`: whether a response came from the network or a cache

pub mod request;
pub mod response;

pub use request::{Request, RequestMode};
pub use response::{Response, ResponseSource};
