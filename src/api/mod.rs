pub mod openai;
pub mod runway;

pub use runway::{HttpRequest, HttpResponse, Method, RunwayTransport, Transport, TransportError};
