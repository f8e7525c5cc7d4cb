//! History paging

use log::{debug, error};

use crate::error::SyncError;
use crate::gmail::api::HistoryRecord;
use crate::gmail::{HistoryExpiredError, MailProvider};

/// List every history record since `start_history_id`, across all pages
///
/// Records are returned in provider order as one unit: a failure on any
/// page discards everything fetched so far.
pub fn list_changes_since(
    provider: &dyn MailProvider,
    start_history_id: u64,
) -> Result<Vec<HistoryRecord>, SyncError> {
    let mut records = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let response = provider
            .list_history(start_history_id, page_token.as_deref())
            .map_err(|source| {
                if source.downcast_ref::<HistoryExpiredError>().is_some() {
                    error!(
                        "[HISTORY] History id {} is no longer available; a full resync is needed",
                        start_history_id
                    );
                } else {
                    error!(
                        "[HISTORY] Failed to fetch page {} from {}: {:#}",
                        pages + 1,
                        start_history_id,
                        source
                    );
                }
                SyncError::PageFetchFailed {
                    start_history_id,
                    source,
                }
            })?;
        pages += 1;

        if let Some(history) = response.history {
            records.extend(history);
        }

        match response.next_page_token {
            Some(token) if !token.is_empty() => {
                // A repeated token would page forever
                if page_token.as_deref() == Some(token.as_str()) {
                    error!("[HISTORY] Provider repeated page token {:?}", token);
                    return Err(SyncError::PageFetchFailed {
                        start_history_id,
                        source: anyhow::anyhow!("page token {:?} returned twice in a row", token),
                    });
                }
                page_token = Some(token);
            }
            _ => break,
        }
    }

    debug!(
        "[HISTORY] {} records in {} pages since {}",
        records.len(),
        pages,
        start_history_id
    );
    Ok(records)
}
