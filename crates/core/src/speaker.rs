use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use crate::types::SpeakRequest;

/// The external capability that voices the patient's replies.
///
/// A `Sync` request resolves once the utterance has been spoken, an `Async`
/// request resolves as soon as the utterance has been accepted. Either way the
/// caller awaits the call before issuing the next one.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, request: SpeakRequest) -> Result<()>;

    /// Cuts the current utterance short.
    async fn interrupt(&self) -> Result<()>;

    /// Releases the speech session. No further calls are made afterwards.
    async fn stop(&self) -> Result<()>;
}
