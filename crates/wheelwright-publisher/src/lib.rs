//! Publishing for wheelwright: upload stored artifacts to a package index.

pub mod http;
pub mod publish;

pub use http::HttpIndexClient;
pub use publish::Publisher;
