use serde::{Deserialize, Serialize};

/// Default number of convergence attempts for an `AutoCommit` update.
pub const DEFAULT_AUTOCOMMIT_RETRY_MAX: usize = 2;
/// Default upper bound for the namespace part of a fully-qualified name.
pub const DEFAULT_MAX_NAMESPACE_LEN: usize = 128;
/// Default upper bound for the bare-name part of a fully-qualified name.
pub const DEFAULT_MAX_NAME_LEN: usize = 128;

/// Tunables for a [`Datastore`](crate::datastore::Datastore).
///
/// # Examples
///
/// ```no_run
/// use switchyard::config::DatastoreConfig;
///
/// let config = DatastoreConfig::default()
///     .autocommit_retry_max(3)
///     .max_name_len(64);
/// assert_eq!(config.autocommit_retry_max, 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatastoreConfig {
    /// How many times an `AutoCommit` update runs the commit logic before the
    /// failure is surfaced. The first attempt applies the requested change,
    /// later attempts apply the previous committed state as a fallback.
    pub autocommit_retry_max: usize,
    pub max_namespace_len: usize,
    pub max_name_len: usize,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            autocommit_retry_max: DEFAULT_AUTOCOMMIT_RETRY_MAX,
            max_namespace_len: DEFAULT_MAX_NAMESPACE_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl DatastoreConfig {
    #[must_use]
    pub fn autocommit_retry_max(mut self, attempts: usize) -> Self {
        self.autocommit_retry_max = attempts;
        self
    }

    #[must_use]
    pub fn max_namespace_len(mut self, len: usize) -> Self {
        self.max_namespace_len = len;
        self
    }

    #[must_use]
    pub fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Effective retry bound; never below one attempt.
    pub fn retry_bound(&self) -> usize {
        self.autocommit_retry_max.max(1)
    }

    /// Longest accepted fully-qualified name (`namespace` + `:` + `name`).
    pub fn max_fullname_len(&self) -> usize {
        self.max_namespace_len + 1 + self.max_name_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatastoreConfig::default();
        assert_eq!(config.autocommit_retry_max, 2);
        assert_eq!(config.max_fullname_len(), 257);
    }

    #[test]
    fn test_retry_bound_is_at_least_one() {
        let config = DatastoreConfig::default().autocommit_retry_max(0);
        assert_eq!(config.retry_bound(), 1);
    }
}
