//! HTTP building blocks shared by the services: the JSON envelope, the
//! error taxonomy, validating extractors and the middleware stack.

pub mod client;
pub mod error;
pub mod extract;
pub mod layers;
pub mod response;

pub use client::{client_info, client_ip};
pub use error::{ApiError, ApiResult, FieldErrors};
pub use extract::{ValidatedJson, ValidatedQuery};
pub use layers::{CSRF_HEADER, shutdown_signal, with_standard_layers};
pub use response::{ApiResponse, PageParams, Pagination};
