//! Sync pass orchestration
//!
//! A pass walks `Idle -> Authorizing -> Paging -> Resolving -> Committing ->
//! Done`. Any error moves it to `Failed` and nothing after that point runs.
//! The checkpoint is written exactly once, in `Committing`, and only after
//! every message was resolved.

use anyhow::anyhow;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

use super::history::list_changes_since;
use super::resolve::resolve_all_with_stats;
use crate::error::SyncError;
use crate::gmail::{ProviderFactory, TokenManager};
use crate::models::MailObject;
use crate::store::CredentialStore;

/// Stage of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Authorizing,
    Paging,
    Resolving,
    Committing,
    Done,
    Failed,
}

impl SyncPhase {
    /// The stage that follows this one on success; `None` once terminal
    pub fn next(self) -> Option<SyncPhase> {
        match self {
            SyncPhase::Idle => Some(SyncPhase::Authorizing),
            SyncPhase::Authorizing => Some(SyncPhase::Paging),
            SyncPhase::Paging => Some(SyncPhase::Resolving),
            SyncPhase::Resolving => Some(SyncPhase::Committing),
            SyncPhase::Committing => Some(SyncPhase::Done),
            SyncPhase::Done | SyncPhase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

/// Statistics from a successful sync pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Checkpoint the pass started from
    pub previous_checkpoint: u64,
    /// Checkpoint committed at the end of the pass
    pub new_checkpoint: u64,
    /// History records returned across all pages
    pub history_records: usize,
    /// Number of messages fetched from Gmail
    pub messages_fetched: usize,
    /// Attachments decoded from inline data
    pub attachments_inline: usize,
    /// Attachments fetched by attachment ID
    pub attachments_fetched: usize,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Mail plus statistics from one pass
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub mail: Vec<MailObject>,
    pub report: SyncReport,
}

/// Tracks the phase of one pass for logging
struct Pass<'a> {
    email: &'a str,
    phase: SyncPhase,
}

impl<'a> Pass<'a> {
    fn new(email: &'a str) -> Self {
        Self {
            email,
            phase: SyncPhase::Idle,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            debug!("[SYNC] {}: {:?} -> {:?}", self.email, self.phase, next);
            self.phase = next;
        }
    }

    fn fail(&mut self, err: &SyncError) {
        warn!("[SYNC] {}: failed during {:?}: {}", self.email, self.phase, err);
        self.phase = SyncPhase::Failed;
    }
}

/// Composes token handling, history paging and resolution into one pass
pub struct SyncOrchestrator {
    tokens: TokenManager,
    store: Arc<dyn CredentialStore>,
    factory: Box<dyn ProviderFactory>,
}

impl SyncOrchestrator {
    pub fn new(
        tokens: TokenManager,
        store: Arc<dyn CredentialStore>,
        factory: Box<dyn ProviderFactory>,
    ) -> Self {
        Self {
            tokens,
            store,
            factory,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Fetch all mail added since the user's checkpoint and advance the
    /// checkpoint to `new_checkpoint`
    ///
    /// On any error the fetched mail is dropped and, unless the commit
    /// itself failed, the stored checkpoint is unchanged.
    pub fn sync(&self, user_email: &str, new_checkpoint: u64) -> Result<Vec<MailObject>, SyncError> {
        self.sync_with_report(user_email, new_checkpoint)
            .map(|outcome| outcome.mail)
    }

    /// [`SyncOrchestrator::sync`], also returning pass statistics
    pub fn sync_with_report(
        &self,
        user_email: &str,
        new_checkpoint: u64,
    ) -> Result<SyncOutcome, SyncError> {
        let start = Instant::now();
        let mut pass = Pass::new(user_email);

        match self.run(&mut pass, new_checkpoint) {
            Ok(mut outcome) => {
                outcome.report.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "[SYNC] {}: {} messages, {} attachments, checkpoint {} -> {} in {}ms",
                    user_email,
                    outcome.mail.len(),
                    outcome.report.attachments_inline + outcome.report.attachments_fetched,
                    outcome.report.previous_checkpoint,
                    outcome.report.new_checkpoint,
                    outcome.report.duration_ms
                );
                Ok(outcome)
            }
            Err(err) => {
                pass.fail(&err);
                Err(err)
            }
        }
    }

    fn run(&self, pass: &mut Pass<'_>, new_checkpoint: u64) -> Result<SyncOutcome, SyncError> {
        let email = pass.email;

        pass.advance();
        let user = self
            .store
            .find_user_by_email(email)
            .map_err(SyncError::Store)?
            .ok_or_else(|| SyncError::UserNotFound(email.to_string()))?;

        let handle = self
            .tokens
            .rehydrate(&user)
            .map_err(|e| SyncError::from_auth(email, e))?;
        let Some(credential) = handle.client.into_credential() else {
            return Err(SyncError::Unauthorized(email.to_string()));
        };
        let credential = self
            .tokens
            .refresh_if_needed(user.id, credential)
            .map_err(|e| SyncError::from_auth(email, e))?;
        let provider = self.factory.connect(&credential);

        pass.advance();
        let records = list_changes_since(provider.as_ref(), user.history_id)?;

        pass.advance();
        let (mail, stats) = resolve_all_with_stats(provider.as_ref(), &records)?;

        pass.advance();
        if new_checkpoint < user.history_id {
            warn!(
                "[SYNC] {}: checkpoint moves backwards ({} -> {})",
                email, user.history_id, new_checkpoint
            );
        }
        let committed = self
            .store
            .set_checkpoint(user.id, new_checkpoint)
            .and_then(|updated| {
                if updated {
                    Ok(())
                } else {
                    Err(anyhow!("no user row with id {}", user.id))
                }
            });
        if let Err(source) = committed {
            // The resolved mail is dropped; a retry re-fetches it from the old checkpoint
            return Err(SyncError::CheckpointCommitFailed {
                user_id: user.id,
                checkpoint: new_checkpoint,
                source,
            });
        }

        pass.advance();
        Ok(SyncOutcome {
            report: SyncReport {
                previous_checkpoint: user.history_id,
                new_checkpoint,
                history_records: records.len(),
                messages_fetched: stats.messages_fetched,
                attachments_inline: stats.attachments_inline,
                attachments_fetched: stats.attachments_fetched,
                duration_ms: 0,
            },
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GmailCredentials;
    use crate::gmail::TokenEndpoint;
    use crate::models::{TokenResponse, User};
    use crate::store::InMemoryCredentialStore;
    use crate::sync::fakes::{
        ScriptedFactory, ScriptedProvider, text_message, record, remote_part, with_parts,
    };

    const TOKEN: &str = r#"{"access_token":"ya29.stored","refresh_token":"1//r"}"#;

    struct NoEndpoint;

    impl TokenEndpoint for NoEndpoint {
        fn exchange_code(&self, _: &GmailCredentials, _: &str) -> anyhow::Result<TokenResponse> {
            Err(anyhow!("no token endpoint in this test"))
        }

        fn refresh(&self, _: &GmailCredentials, _: &str) -> anyhow::Result<TokenResponse> {
            Err(anyhow!("no token endpoint in this test"))
        }
    }

    fn orchestrator(
        store: Arc<InMemoryCredentialStore>,
        provider: ScriptedProvider,
    ) -> SyncOrchestrator {
        let credentials = GmailCredentials::new("id", "secret", "http://localhost").unwrap();
        let tokens = TokenManager::new(credentials, store.clone(), Arc::new(NoEndpoint));
        SyncOrchestrator::new(tokens, store, Box::new(ScriptedFactory::new(provider)))
    }

    fn store_with_user(token: &str, history_id: u64) -> (Arc<InMemoryCredentialStore>, i64) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let user = store
            .insert_user(
                User::new("user@example.com")
                    .with_token(token)
                    .with_history_id(history_id),
            )
            .unwrap();
        (store, user.id)
    }

    fn checkpoint(store: &InMemoryCredentialStore, id: i64) -> u64 {
        store.find_user_by_id(id).unwrap().unwrap().history_id
    }

    #[test]
    fn test_phases_advance_in_order() {
        let mut phase = SyncPhase::Idle;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                SyncPhase::Idle,
                SyncPhase::Authorizing,
                SyncPhase::Paging,
                SyncPhase::Resolving,
                SyncPhase::Committing,
                SyncPhase::Done,
            ]
        );
        assert!(SyncPhase::Failed.is_terminal());
    }

    #[test]
    fn test_successful_sync_commits_checkpoint() {
        let (store, id) = store_with_user(TOKEN, 100);
        let provider = ScriptedProvider::new()
            .with_pages(vec![vec![record("101", &["a"])], vec![record("102", &["b"])]])
            .with_message(text_message("a", "first"))
            .with_message(text_message("b", "second"));

        let outcome = orchestrator(store.clone(), provider.clone())
            .sync_with_report("user@example.com", 150)
            .unwrap();

        let bodies: Vec<&str> = outcome.mail.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(outcome.report.previous_checkpoint, 100);
        assert_eq!(outcome.report.new_checkpoint, 150);
        assert_eq!(outcome.report.history_records, 2);
        assert_eq!(outcome.report.messages_fetched, 2);
        assert_eq!(checkpoint(&store, id), 150);
        assert_eq!(provider.calls()[0], "history:100:");
    }

    #[test]
    fn test_unknown_user() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let provider = ScriptedProvider::new();
        let result = orchestrator(store, provider.clone()).sync("nobody@example.com", 5);
        assert!(matches!(result, Err(SyncError::UserNotFound(_))));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_sentinel_token_is_unauthorized() {
        let (store, id) = store_with_user(" ", 100);
        let provider = ScriptedProvider::new();

        let result = orchestrator(store.clone(), provider.clone()).sync("user@example.com", 150);
        assert!(matches!(result, Err(SyncError::Unauthorized(_))));
        assert!(provider.calls().is_empty());
        assert_eq!(checkpoint(&store, id), 100);
    }

    #[test]
    fn test_corrupt_token() {
        let (store, id) = store_with_user("{{{", 100);
        let result = orchestrator(store.clone(), ScriptedProvider::new()).sync("user@example.com", 150);
        assert!(matches!(result, Err(SyncError::CredentialCorrupt { .. })));
        assert_eq!(checkpoint(&store, id), 100);
    }

    #[test]
    fn test_page_failure_keeps_checkpoint() {
        let (store, id) = store_with_user(TOKEN, 100);
        let provider = ScriptedProvider::new()
            .with_pages(vec![vec![record("101", &["a"])], vec![record("102", &["b"])]])
            .with_message(text_message("a", "first"))
            .failing_page("page-1");

        let result = orchestrator(store.clone(), provider.clone()).sync("user@example.com", 150);
        assert!(matches!(result, Err(SyncError::PageFetchFailed { .. })));
        assert_eq!(provider.calls_of("message"), 0);
        assert_eq!(checkpoint(&store, id), 100);
    }

    #[test]
    fn test_attachment_failure_keeps_checkpoint() {
        let (store, id) = store_with_user(TOKEN, 100);
        let provider = ScriptedProvider::new()
            .with_pages(vec![vec![record("101", &["a"])]])
            .with_message(with_parts(text_message("a", "first"), vec![remote_part("x.pdf", "att")]))
            .failing_attachment("att");

        let result = orchestrator(store.clone(), provider).sync("user@example.com", 150);
        assert!(matches!(result, Err(SyncError::AttachmentFetchFailed { .. })));
        assert_eq!(checkpoint(&store, id), 100);
    }

    #[test]
    fn test_expired_token_refresh_failure_stops_before_paging() {
        let expired = r#"{"access_token":"ya29.old","refresh_token":"1//r","expires_at":1}"#;
        let (store, id) = store_with_user(expired, 100);
        let provider = ScriptedProvider::new();

        let result = orchestrator(store.clone(), provider.clone()).sync("user@example.com", 150);
        assert!(matches!(result, Err(SyncError::TokenRefreshFailed { .. })));
        assert!(result.unwrap_err().requires_reauthorization());
        assert!(provider.calls().is_empty());
        assert_eq!(checkpoint(&store, id), 100);
    }

    #[test]
    fn test_provider_receives_stored_access_token() {
        let (store, _) = store_with_user(TOKEN, 100);
        let factory = ScriptedFactory::new(ScriptedProvider::new());
        let seen = factory.tokens_seen.clone();
        let credentials = GmailCredentials::new("id", "secret", "http://localhost").unwrap();
        let tokens = TokenManager::new(credentials, store.clone(), Arc::new(NoEndpoint));
        let orchestrator = SyncOrchestrator::new(tokens, store, Box::new(factory));

        let mail = orchestrator.sync("user@example.com", 101).unwrap();
        assert!(mail.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["ya29.stored".to_string()]);
    }
}
