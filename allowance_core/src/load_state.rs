use crate::error::EventsError;

/// Result state of one asynchronous input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Pending,
    Ready(T),
    Failed(EventsError),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Pending
    }
}

impl<T> LoadState<T> {
    pub fn from_result(result: Result<T, EventsError>) -> Self {
        match result {
            Ok(value) => LoadState::Ready(value),
            Err(e) => LoadState::Failed(e),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&EventsError> {
        match self {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> LoadState<&T> {
        match self {
            LoadState::Pending => LoadState::Pending,
            LoadState::Ready(value) => LoadState::Ready(value),
            LoadState::Failed(e) => LoadState::Failed(e.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadState<U> {
        match self {
            LoadState::Pending => LoadState::Pending,
            LoadState::Ready(value) => LoadState::Ready(f(value)),
            LoadState::Failed(e) => LoadState::Failed(e),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, EventsError>) -> LoadState<U> {
        match self {
            LoadState::Pending => LoadState::Pending,
            LoadState::Ready(value) => LoadState::from_result(f(value)),
            LoadState::Failed(e) => LoadState::Failed(e),
        }
    }

    /// Combine two states. A failure on the left wins over one on the right,
    /// and any failure wins over pending.
    pub fn zip<U>(self, other: LoadState<U>) -> LoadState<(T, U)> {
        match (self, other) {
            (LoadState::Failed(e), _) | (_, LoadState::Failed(e)) => LoadState::Failed(e),
            (LoadState::Ready(a), LoadState::Ready(b)) => LoadState::Ready((a, b)),
            _ => LoadState::Pending,
        }
    }

    pub fn status(&self) -> LoadStatus {
        LoadStatus {
            is_loading: self.is_loading(),
            error: self.error().cloned(),
        }
    }
}

/// Reduced loading/error view over any number of inputs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadStatus {
    pub is_loading: bool,
    pub error: Option<EventsError>,
}

impl LoadStatus {
    /// Loading is OR-ed, the first error in merge order is kept
    pub fn merge(self, other: LoadStatus) -> LoadStatus {
        LoadStatus {
            is_loading: self.is_loading || other.is_loading,
            error: self.error.or(other.error),
        }
    }

    /// True when every merged input finished without error
    pub fn is_settled_ok(&self) -> bool {
        !self.is_loading && self.error.is_none()
    }
}

impl FromIterator<LoadStatus> for LoadStatus {
    fn from_iter<I: IntoIterator<Item = LoadStatus>>(iter: I) -> Self {
        iter.into_iter().fold(LoadStatus::default(), LoadStatus::merge)
    }
}
