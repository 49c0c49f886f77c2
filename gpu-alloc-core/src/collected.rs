//! Best-effort collection results
//!
//! Collaborators never fail a collection cycle. They hand back whatever they
//! could gather together with the reason the query degraded, if it did.

/// Value gathered from a collaborator plus an optional soft-failure reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected<T> {
    value: T,
    failure: Option<String>,
}

impl<T> Collected<T> {
    /// Query succeeded
    pub fn ok(value: T) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    /// Query failed; `value` is the fallback handed to the caller
    pub fn failed(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            failure: Some(reason.into()),
        }
    }

    /// Whether the query failed
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }

    /// Failure reason, if the query failed
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Borrow the collected value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Take the collected value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Split into the value and the failure reason
    pub fn into_parts(self) -> (T, Option<String>) {
        (self.value, self.failure)
    }
}

impl<T: Default> Collected<T> {
    /// Query failed and nothing was gathered
    pub fn empty_failure(reason: impl Into<String>) -> Self {
        Self::failed(T::default(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_is_not_degraded() {
        let collected = Collected::ok(vec![1, 2]);
        assert!(!collected.is_degraded());
        assert!(collected.failure().is_none());
        assert_eq!(collected.into_value(), vec![1, 2]);
    }

    #[test]
    fn test_empty_failure_keeps_reason() {
        let collected: Collected<Vec<u32>> = Collected::empty_failure("socket unreachable");
        assert!(collected.is_degraded());
        assert!(collected.value().is_empty());

        let (value, failure) = collected.into_parts();
        assert!(value.is_empty());
        assert_eq!(failure.as_deref(), Some("socket unreachable"));
    }
}
