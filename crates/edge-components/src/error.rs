//! Component and dispatch errors.

use edge_cache::CodecError;
use http::StatusCode;

/// Errors raised by a component provider's render contract.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider has nothing to render for this request.
    #[error("fragment not found: {0}")]
    NotFound(String),

    /// Fragment delivery is switched off for this item.
    #[error("fragment disabled: {0}")]
    Disabled(String),

    /// Rendering failed.
    #[error("render failed: {0}")]
    Render(String),
}

/// Errors raised while dispatching a fragment request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The path could not be decoded.
    #[error(transparent)]
    MalformedRequest(#[from] CodecError),

    /// The path decoded but names no registered component.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// The provider's render contract failed.
    #[error("component {key} failed to render: {source}")]
    ProviderRenderFailure {
        key: String,
        #[source]
        source: ProviderError,
    },

    /// The provider panicked while rendering.
    #[error("component {0} panicked while rendering")]
    ProviderPanicked(String),
}

impl DispatchError {
    /// Status of the minimal fragment emitted for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) | Self::UnknownComponent(_) => StatusCode::NOT_FOUND,
            Self::ProviderRenderFailure {
                source: ProviderError::NotFound(_) | ProviderError::Disabled(_),
                ..
            } => StatusCode::NOT_FOUND,
            Self::ProviderRenderFailure { .. } | Self::ProviderPanicked(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Errors raised while persisting block settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Writing settings failed; the change was rolled back.
    #[error("settings persistence failed: {0}")]
    PersistenceFailure(String),

    /// Stored settings could not be read.
    #[error("stored settings are corrupt: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let malformed = DispatchError::from(CodecError::Malformed("x".into()));
        assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DispatchError::UnknownComponent("x".into()).status(),
            StatusCode::NOT_FOUND
        );

        let disabled = DispatchError::ProviderRenderFailure {
            key: "block".into(),
            source: ProviderError::Disabled("user:login".into()),
        };
        assert_eq!(disabled.status(), StatusCode::NOT_FOUND);

        let failed = DispatchError::ProviderRenderFailure {
            key: "block".into(),
            source: ProviderError::Render("boom".into()),
        };
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            DispatchError::ProviderPanicked("block".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
