pub mod file_system;
pub mod http_client;
pub mod http_handler;

pub use file_system::FileSystemAdapter;
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, build_router};
