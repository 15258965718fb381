use std::sync::Arc;

use jiff::Timestamp;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use linkhop_core::{Backend, StorageError, UserId, SYNTHETIC_OWNER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    user_id: i64,
    iat: i64,
}

/// Signs and verifies HS256 session tokens carrying a user id.
///
/// Tokens have no expiry.
#[derive(Clone)]
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn sign(&self, user_id: UserId) -> Result<String> {
        let claims = SessionClaims {
            user_id: user_id.get(),
            iat: Timestamp::now().as_second(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| RegistryError::Token(e.to_string()))
    }

    /// Checks the signature and returns the user id the token was issued to.
    pub fn verify(&self, token: &str) -> Result<UserId> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| UserId::new(data.claims.user_id))
            .map_err(|e| {
                debug!(error = %e, "rejected session token");
                RegistryError::Unauthorized
            })
    }
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub token: String,
    /// `true` when `token` was minted by this call and must be handed back
    /// to the client.
    pub issued: bool,
}

/// Maps session tokens to durable users.
///
/// A token is valid only if its signature checks out and the user it names
/// exists. Backends without a user table own every link through
/// [`SYNTHETIC_OWNER`].
#[derive(Clone)]
pub struct IdentityResolver {
    backend: Arc<dyn Backend>,
    signer: SessionSigner,
}

impl IdentityResolver {
    pub fn new(backend: Arc<dyn Backend>, signer: SessionSigner) -> Self {
        Self { backend, signer }
    }

    /// Returns the caller's identity, issuing a new one when the token is
    /// missing or invalid.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Session> {
        if let Some(token) = token {
            match self.owner_of(token).await {
                Ok(user_id) => {
                    return Ok(Session {
                        user_id,
                        token: token.to_owned(),
                        issued: false,
                    });
                }
                Err(RegistryError::Unauthorized) => {
                    debug!("session token rejected, issuing a new one");
                }
                Err(e) => return Err(e),
            }
        }

        self.issue().await
    }

    /// Like [`Self::resolve`] but never issues: a missing or invalid token is
    /// [`RegistryError::Unauthorized`].
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId> {
        let token = token.ok_or(RegistryError::Unauthorized)?;
        self.owner_of(token).await
    }

    /// Resolves the owner named by `token`.
    pub async fn owner_of(&self, token: &str) -> Result<UserId> {
        let user_id = self.signer.verify(token)?;

        match self.backend.find_user_by_id(user_id).await {
            Ok(Some(_)) => Ok(user_id),
            Ok(None) => {
                debug!(user_id = %user_id, "session names an unknown user");
                Err(RegistryError::Unauthorized)
            }
            Err(StorageError::Unsupported(_)) if user_id == SYNTHETIC_OWNER => Ok(user_id),
            Err(StorageError::Unsupported(_)) => Err(RegistryError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    async fn issue(&self) -> Result<Session> {
        let user_id = match self.backend.create_user().await {
            Ok(user) => user.id,
            Err(StorageError::Unsupported(_)) => SYNTHETIC_OWNER,
            Err(e) => return Err(e.into()),
        };

        let token = self.signer.sign(user_id)?;

        match self.backend.set_user_token(user_id, &token).await {
            Ok(()) | Err(StorageError::Unsupported(_)) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "user created without a session token");
                return Err(e.into());
            }
        }

        info!(user_id = %user_id, "issued session");
        Ok(Session {
            user_id,
            token,
            issued: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linkhop_core::{BatchReport, NewLink, ShortCode, User};
    use linkhop_storage::InMemoryBackend;
    use std::sync::Mutex;

    /// Backend with a user table and nothing else.
    #[derive(Default)]
    struct UsersBackend {
        users: Mutex<Vec<User>>,
        reject_tokens: bool,
    }

    #[async_trait]
    impl Backend for UsersBackend {
        async fn restore(&self) -> linkhop_core::Result<()> {
            Ok(())
        }

        async fn add(&self, _link: NewLink) -> linkhop_core::Result<()> {
            Ok(())
        }

        async fn add_batch(&self, _links: Vec<NewLink>) -> linkhop_core::Result<BatchReport> {
            Ok(BatchReport::default())
        }

        async fn get(&self, code: &ShortCode) -> linkhop_core::Result<String> {
            Err(StorageError::NotFound(code.to_string()))
        }

        async fn delete_batch(
            &self,
            _owner: UserId,
            _codes: &[ShortCode],
        ) -> linkhop_core::Result<usize> {
            Ok(0)
        }

        async fn create_user(&self) -> linkhop_core::Result<User> {
            let mut users = self.users.lock().unwrap();
            let user = User {
                id: UserId::new(users.len() as i64 + 100),
                token: None,
            };
            users.push(user.clone());
            Ok(user)
        }

        async fn find_user_by_id(&self, id: UserId) -> linkhop_core::Result<Option<User>> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.id == id).cloned())
        }

        async fn set_user_token(&self, id: UserId, token: &str) -> linkhop_core::Result<()> {
            if self.reject_tokens {
                return Err(StorageError::Query("token column is read-only".into()));
            }
            let mut users = self.users.lock().unwrap();
            match users.iter_mut().find(|u| u.id == id) {
                Some(user) => {
                    user.token = Some(token.to_owned());
                    Ok(())
                }
                None => Err(StorageError::NotFound(id.to_string())),
            }
        }
    }

    fn signer() -> SessionSigner {
        SessionSigner::new(b"test-secret")
    }

    #[test]
    fn signer_round_trip_and_tamper_detection() {
        let signer = signer();
        let token = signer.sign(UserId::new(7)).unwrap();

        assert_eq!(signer.verify(&token).unwrap(), UserId::new(7));
        assert_eq!(
            SessionSigner::new(b"other-secret").verify(&token),
            Err(RegistryError::Unauthorized)
        );
        assert_eq!(signer.verify("garbage"), Err(RegistryError::Unauthorized));
    }

    #[tokio::test]
    async fn missing_token_creates_user() {
        let backend = Arc::new(UsersBackend::default());
        let resolver = IdentityResolver::new(backend.clone(), signer());

        let session = resolver.resolve(None).await.unwrap();

        assert!(session.issued);
        assert_eq!(session.user_id, UserId::new(100));
        let stored = backend.users.lock().unwrap()[0].token.clone();
        assert_eq!(stored.as_deref(), Some(session.token.as_str()));
    }

    #[tokio::test]
    async fn failed_token_write_issues_no_session() {
        let backend = Arc::new(UsersBackend {
            reject_tokens: true,
            ..Default::default()
        });
        let resolver = IdentityResolver::new(backend.clone(), signer());

        let err = resolver.resolve(None).await.unwrap_err();

        assert!(matches!(err, RegistryError::Storage(StorageError::Query(_))));
        let users = backend.users.lock().unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].token.is_none());
    }

    #[tokio::test]
    async fn valid_token_is_reused() {
        let resolver = IdentityResolver::new(Arc::new(UsersBackend::default()), signer());
        let first = resolver.resolve(None).await.unwrap();

        let second = resolver.resolve(Some(&first.token)).await.unwrap();

        assert!(!second.issued);
        assert_eq!(second.user_id, first.user_id);
        assert_eq!(second.token, first.token);
    }

    #[tokio::test]
    async fn orphaned_token_is_replaced() {
        let resolver = IdentityResolver::new(Arc::new(UsersBackend::default()), signer());
        let orphan = signer().sign(UserId::new(999)).unwrap();

        let session = resolver.resolve(Some(&orphan)).await.unwrap();

        assert!(session.issued);
        assert_ne!(session.user_id, UserId::new(999));
    }

    #[tokio::test]
    async fn authenticate_never_issues() {
        let backend = Arc::new(UsersBackend::default());
        let resolver = IdentityResolver::new(backend.clone(), signer());

        assert_eq!(
            resolver.authenticate(None).await,
            Err(RegistryError::Unauthorized)
        );
        assert_eq!(
            resolver.authenticate(Some("not-a-token")).await,
            Err(RegistryError::Unauthorized)
        );
        assert!(backend.users.lock().unwrap().is_empty());

        let session = resolver.resolve(None).await.unwrap();
        assert_eq!(
            resolver.authenticate(Some(&session.token)).await.unwrap(),
            session.user_id
        );
    }

    #[tokio::test]
    async fn backends_without_users_share_the_synthetic_owner() {
        let resolver = IdentityResolver::new(Arc::new(InMemoryBackend::new()), signer());

        let session = resolver.resolve(None).await.unwrap();
        assert!(session.issued);
        assert_eq!(session.user_id, SYNTHETIC_OWNER);

        let again = resolver.resolve(Some(&session.token)).await.unwrap();
        assert!(!again.issued);
        assert_eq!(again.user_id, SYNTHETIC_OWNER);

        let foreign = signer().sign(UserId::new(5)).unwrap();
        assert_eq!(
            resolver.owner_of(&foreign).await,
            Err(RegistryError::Unauthorized)
        );
    }
}
