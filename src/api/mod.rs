pub mod broker;
pub mod http;

pub use broker::{Brokerage, CancelResponse, SubmitResponse};
pub use http::HttpBroker;
