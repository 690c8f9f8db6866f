//! # hello-ports
//!
//! A dummy HTTP backend for exercising proxies and load balancers. It binds a
//! range of consecutive ports and answers every GET with
//! `Hello World ! '<path>'`, echoing the request target verbatim.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hello_ports::listener::{ListenerConfig, ListenerSet};
//!
//! // Serves 8000..=8003 until Ctrl-C.
//! ListenerSet::start(ListenerConfig::new(8000, 4)).unwrap();
//! ```
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use hello_ports::listener::{ListenerConfig, ListenerSet};
//!
//! # async fn run() -> hello_ports::ServerResult<()> {
//! let set = ListenerSet::bind(&ListenerConfig::new(17571, 4)).await?;
//! println!("listening on {:?}", set.local_addrs());
//! set.serve().await
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod listener;

pub use app::Server;
pub use error::{ServerError, ServerResult};
pub use http::{Method, Request, Response};
pub use listener::{ListenerConfig, ListenerSet};
