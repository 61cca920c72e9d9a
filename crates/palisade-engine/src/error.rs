use palisade_core::DomainError;

/// What store implementations report back to the engine.
///
/// `NotFound` names the missing entity kind; everything else is an opaque
/// backend failure the engine wraps with operation context.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("backend failure: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend(source.into())
    }
}

/// The engine's error taxonomy.
///
/// Callers map these to their own transport codes; the engine contributes
/// only the kind. A missing capability bit is never reported from
/// resolution itself — resolution computes a value, callers decide.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("store failure while {context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl AccessError {
    /// Adapter for `map_err`: keeps store-level `NotFound` as `NotFound`
    /// and wraps backend failures with the operation context.
    pub(crate) fn wrap(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::NotFound(what) => Self::NotFound(what),
            backend @ StoreError::Backend(_) => Self::Store {
                context,
                source: backend,
            },
        }
    }
}

impl From<DomainError> for AccessError {
    fn from(err: DomainError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessError, StoreError};

    #[test]
    fn wrap_preserves_not_found_and_contextualizes_backend_failures() {
        let not_found = AccessError::wrap("fetching user roles")(StoreError::NotFound("role"));
        assert!(matches!(not_found, AccessError::NotFound("role")));

        let backend = AccessError::wrap("fetching user roles")(StoreError::backend(
            std::io::Error::other("connection reset"),
        ));
        match backend {
            AccessError::Store { context, .. } => assert_eq!(context, "fetching user roles"),
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[test]
    fn domain_errors_become_bad_requests() {
        let err: AccessError = palisade_core::DomainError::InvalidRoleName.into();
        assert!(matches!(err, AccessError::BadRequest(_)));
    }
}
