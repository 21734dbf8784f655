use crate::domain::models::StoredSession;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;
use tracing::warn;

pub const DEFAULT_CREDENTIAL_SERVICE: &str = "review-scheduler.session";
pub const DEFAULT_SESSION_ACCOUNT: &str = "default";
const SESSION_PAYLOAD_VERSION: u32 = 1;

pub trait CredentialStore: Send + Sync {
    fn save_session(&self, session: &StoredSession) -> Result<(), InfraError>;
    fn load_session(&self) -> Result<Option<StoredSession>, InfraError>;
    fn delete_session(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service_name: String,
    account_name: String,
}

impl KeyringSessionStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_SERVICE, DEFAULT_SESSION_ACCOUNT)
    }
}

impl CredentialStore for KeyringSessionStore {
    fn save_session(&self, session: &StoredSession) -> Result<(), InfraError> {
        let payload = encode_session_payload(session)?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_session(&self) -> Result<Option<StoredSession>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        match decode_session_payload(&payload) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                warn!(error = %error, "discarding unreadable stored session");
                self.delete_session()?;
                Ok(None)
            }
        }
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SessionPayload {
    version: u32,
    #[serde(flatten)]
    session: StoredSession,
}

pub(crate) fn encode_session_payload(session: &StoredSession) -> Result<String, InfraError> {
    session.validate().map_err(InfraError::Validation)?;
    serde_json::to_string(&SessionPayload {
        version: SESSION_PAYLOAD_VERSION,
        session: session.clone(),
    })
    .map_err(|error| InfraError::Credential(error.to_string()))
}

/// Older or foreign payloads are rejected rather than guessed at; the caller
/// treats them as signed out.
pub(crate) fn decode_session_payload(payload: &str) -> Result<StoredSession, InfraError> {
    let parsed: SessionPayload = serde_json::from_str(payload)
        .map_err(|error| InfraError::Credential(format!("malformed session payload: {error}")))?;
    if parsed.version != SESSION_PAYLOAD_VERSION {
        return Err(InfraError::Credential(format!(
            "unsupported session payload version {}",
            parsed.version
        )));
    }
    parsed.session.validate().map_err(InfraError::Credential)?;
    Ok(parsed.session)
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<StoredSession>>,
}

impl InMemoryCredentialStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<StoredSession>>, InfraError> {
        self.session
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_session(&self, session: &StoredSession) -> Result<(), InfraError> {
        session.validate().map_err(InfraError::Validation)?;
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<StoredSession>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}
