/// Middleware module
///
/// Cross-cutting HTTP concerns.

mod request_logger;

pub use request_logger::RequestLogger;
