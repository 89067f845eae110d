pub mod authenticator;
pub mod extractor;

// Re-export commonly used items
pub use authenticator::{DeviceAuthenticator, TokenAuthenticator};
pub use extractor::extract_bearer_token;
