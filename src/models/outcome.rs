use serde::Serialize;

/// Why a result was produced on a fallback path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum DegradeReason {
    /// The background worker could not be created; all calls run in-process
    WorkerUnavailable(String),
    /// The worker round trip failed for this call; it was re-run in-process
    RoundTripFailed(String),
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::WorkerUnavailable(e) => write!(f, "worker unavailable: {}", e),
            DegradeReason::RoundTripFailed(e) => write!(f, "worker round trip failed: {}", e),
        }
    }
}

/// Tagged result for operations that never fail outright.
///
/// `Degraded` still carries a correct value; it only records that the
/// preferred execution path was not taken. `Unavailable` means the storage
/// substrate could not be used and callers should behave as if it were empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded(T, DegradeReason),
    Unavailable,
}

impl<T> Outcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(..))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Outcome::Unavailable)
    }

    pub fn degrade_reason(&self) -> Option<&DegradeReason> {
        match self {
            Outcome::Degraded(_, reason) => Some(reason),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Degraded(v, reason) => Outcome::Degraded(f(v), reason),
            Outcome::Unavailable => Outcome::Unavailable,
        }
    }

    /// Tag a value produced on a fallback path. `Unavailable` and already
    /// degraded outcomes are left as they are.
    pub fn degrade(self, reason: DegradeReason) -> Self {
        match self {
            Outcome::Ok(v) => Outcome::Degraded(v, reason),
            other => other,
        }
    }

    /// Value if one was produced
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Ok(v) | Outcome::Degraded(v, _) => Some(v),
            Outcome::Unavailable => None,
        }
    }
}

impl<T: Default> Outcome<T> {
    /// Value, or the empty default when storage was unavailable
    pub fn into_inner(self) -> T {
        self.value().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_reads_as_empty() {
        let outcome: Outcome<Vec<u8>> = Outcome::Unavailable;
        assert!(outcome.is_unavailable());
        assert!(outcome.into_inner().is_empty());
    }

    #[test]
    fn test_map_keeps_reason() {
        let outcome = Outcome::Degraded(2, DegradeReason::RoundTripFailed("closed".into()));
        let mapped = outcome.map(|v| v * 10);
        assert_eq!(
            mapped.degrade_reason(),
            Some(&DegradeReason::RoundTripFailed("closed".into()))
        );
        assert_eq!(mapped.into_inner(), 20);
    }
}
