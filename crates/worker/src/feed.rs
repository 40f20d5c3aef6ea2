use ledger::{LedgerError, RequestQuery, RequestSource, WithdrawRequest};

/// Pagination state of one worker over one request query.
///
/// A full page is followed by the next one; after a short page the listing
/// starts over, since requests handled meanwhile have left the filter.
#[derive(Debug, Clone)]
pub struct RequestFeed {
    query: RequestQuery,
    cursor: Option<String>,
    last_len: usize,
}

impl RequestFeed {
    pub const fn new(query: RequestQuery) -> Self {
        Self {
            query,
            cursor: None,
            last_len: 0,
        }
    }

    pub async fn next_page<S: RequestSource>(
        &mut self,
        source: &S,
    ) -> Result<Vec<WithdrawRequest>, LedgerError> {
        let full = self.last_len >= self.query.limit as usize;
        let page = match self.cursor.as_deref() {
            Some(cursor) if full => source.next(&self.query, cursor).await?,
            _ => source.list(&self.query).await?,
        };

        self.last_len = page.requests.len();
        self.cursor = page.next;
        Ok(page.requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{watched_asset, withdraw_request, MockLedger};
    use ledger::TaskSet;

    fn feed(limit: u32) -> RequestFeed {
        RequestFeed::new(RequestQuery::awaiting_transfer(&watched_asset("USDT"), limit))
    }

    #[tokio::test]
    async fn test_short_page_relists() {
        let ledger = MockLedger::default();
        ledger.insert(withdraw_request(1, TaskSet::TRANSFER_ATTEMPT));

        let mut feed = feed(2);
        assert_eq!(feed.next_page(&ledger).await.unwrap().len(), 1);
        assert_eq!(feed.next_page(&ledger).await.unwrap().len(), 1);
        assert_eq!(ledger.list_calls(), 2);
        assert_eq!(ledger.next_calls(), 0);
    }

    #[tokio::test]
    async fn test_full_page_advances() {
        let ledger = MockLedger::default();
        for id in 1..=3 {
            ledger.insert(withdraw_request(id, TaskSet::TRANSFER_ATTEMPT));
        }

        let mut feed = feed(2);
        let first: Vec<u64> = feed.next_page(&ledger).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(first, vec![1, 2]);

        let second: Vec<u64> = feed.next_page(&ledger).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(second, vec![3]);
        assert_eq!(ledger.next_calls(), 1);

        // Short page: back to the start.
        let third: Vec<u64> = feed.next_page(&ledger).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(third, vec![1, 2]);
        assert_eq!(ledger.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_listing_error_keeps_position() {
        let ledger = MockLedger::default();
        ledger.insert(withdraw_request(1, TaskSet::TRANSFER_ATTEMPT));
        ledger.fail_listing(true);

        let mut feed = feed(10);
        assert!(feed.next_page(&ledger).await.is_err());

        ledger.fail_listing(false);
        assert_eq!(feed.next_page(&ledger).await.unwrap().len(), 1);
    }
}
