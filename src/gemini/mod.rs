pub mod ad_client;
pub mod retry;
pub mod transport;

pub use ad_client::{AdRequestClient, CANCELLED_MESSAGE, NO_IMAGE_MESSAGE};
pub use retry::{RetryState, Sleeper, StatusClass, TokioSleeper};
pub use transport::{HttpTransport, Transport, TransportResponse};
