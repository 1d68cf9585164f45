/// Authentication module
///
/// Password hashing, JWT issuing/validation, the refresh token ledger and the
/// service that ties them into login, refresh and logout.

mod claims;
mod credentials;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::{Claims, TokenKind};
pub use credentials::{CredentialStore, PgCredentialStore};
pub use jwt::{IssuedToken, TokenIssuer, TokenValidator};
pub use password::PasswordHasher;
pub use refresh_token::{hash_token, PgRefreshTokenStore, RefreshTokenStore, StoredRefreshToken};
pub use service::{AuthService, PgAuthService, TokenPair};
