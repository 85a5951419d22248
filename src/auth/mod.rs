pub mod credentials;
pub mod password;
pub mod token;

pub use credentials::{CredentialError, Registration};
pub use token::{AuthError, Identity, TokenKeys};
