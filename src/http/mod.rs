pub mod request;
pub mod response;

pub use request::{Method, Request, Version};
pub use response::Response;
