//! Trust core for `Trustgate`.
//!
//! Contains the pieces every service shares at its security boundary:
//! password verification, signed session tokens, the request authorization
//! gate, authenticated field encryption, and the blind index used for
//! equality search over encrypted fields. All operations are synchronous and
//! hold only immutable key material, so they can be shared freely across
//! request tasks.

pub mod blind_index;
pub mod crypto;
pub mod error;
pub mod field;
pub mod gate;
pub mod password;
pub mod secret;
pub mod session;

pub use blind_index::BlindIndexer;
pub use error::ErrorKind;
pub use field::{Envelope, FieldCipher};
pub use gate::{AccessRequest, AuthorizationGate, GateRequest, Principal};
pub use password::PasswordVerifier;
pub use secret::{MasterSecret, SigningSecret};
pub use session::SessionTokenCodec;
