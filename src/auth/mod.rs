pub mod gate;
pub mod identity;
pub mod revocation;
pub mod store;
pub mod token;

pub use gate::{AuthGate, RefreshError};
pub use identity::Identity;
pub use revocation::RevocationStore;
pub use store::{KvStore, MemoryStore, RedisStore, StoreError, StoreResult};
pub use token::{IssuedToken, TokenClaims, TokenCodec, TokenError, VerificationError, VerifiedToken};
