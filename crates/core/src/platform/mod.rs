//! The chat platform boundary: media in, status updates and artifacts out.

mod http;
mod traits;

pub use http::fetch_url;
pub use traits::{MediaHost, RequestPhase};
