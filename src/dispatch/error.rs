use thiserror::Error;

/// Failures that abort a whole batch. Per-address problems never end up here.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to start worker pool: {source}")]
    PoolBuild {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
    #[error("result sink failed: {source}")]
    Sink {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DispatchError {
    pub(crate) fn sink<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sink {
            source: Box::new(source),
        }
    }
}
