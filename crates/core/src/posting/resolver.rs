//! Chart-of-accounts lookup with ordered fallback codes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_shared::AccountCodes;
use tracing::debug;

use super::store::LedgerStore;
use crate::ledger::{Account, LedgerError};

/// One logical account: a canonical code plus aliases tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    /// Canonical code.
    pub primary: String,
    /// Aliases tried after `primary`.
    pub fallbacks: Vec<String>,
}

impl AccountRef {
    /// An exact code with no aliases.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            primary: code.into(),
            fallbacks: Vec::new(),
        }
    }

    /// A canonical code with aliases.
    pub fn with_fallbacks<I, S>(primary: impl Into<String>, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            primary: primary.into(),
            fallbacks: fallbacks.into_iter().map(Into::into).collect(),
        }
    }

    /// Every code in lookup order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

impl From<&AccountCodes> for AccountRef {
    fn from(codes: &AccountCodes) -> Self {
        Self {
            primary: codes.primary.clone(),
            fallbacks: codes.fallbacks.clone(),
        }
    }
}

/// Resolves account codes against the store.
#[derive(Clone)]
pub struct AccountResolver {
    store: Arc<dyn LedgerStore>,
}

impl AccountResolver {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Tries `primary`, then each fallback in order.
    ///
    /// Fails with `AccountNotFound` listing every code tried.
    pub async fn resolve(&self, primary: &str, fallbacks: &[String]) -> Result<Account, LedgerError> {
        let mut attempted = Vec::with_capacity(1 + fallbacks.len());

        for code in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            if let Some(account) = self.store.find_account_by_code(code).await? {
                if code != primary {
                    debug!(primary, resolved = code, "account resolved through fallback code");
                }
                return Ok(account);
            }
            attempted.push(code.to_string());
        }

        Err(LedgerError::AccountNotFound { attempted })
    }

    /// Resolves an [`AccountRef`].
    pub async fn resolve_ref(&self, account: &AccountRef) -> Result<Account, LedgerError> {
        self.resolve(&account.primary, &account.fallbacks).await
    }
}
