//! Port for interactive login challenges.

use async_trait::async_trait;

/// Answers the interactive challenges a login may raise.
///
/// Implementations usually prompt a human. Calls are serialized: the worker
/// blocks on each challenge until its answer arrives, so no two challenges
/// are ever outstanding at once. Answers must be a single line.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// A two-factor code from the account's authenticator app.
    ///
    /// `previous_incorrect` is true when an earlier answer was rejected.
    async fn device_code(&self, previous_incorrect: bool) -> anyhow::Result<String>;

    /// The code sent to the account's email address.
    async fn email_code(&self, email: &str, previous_incorrect: bool) -> anyhow::Result<String>;

    /// Whether the login was confirmed on another device.
    async fn confirm_device(&self) -> anyhow::Result<bool>;
}
