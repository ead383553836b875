/// Outcome of the most recent mutating action on a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus<T> {
    Idle,
    Loading,
    Success(T),
    Error(String),
}

impl<T> Default for OperationStatus<T> {
    fn default() -> Self {
        OperationStatus::Idle
    }
}

impl<T> OperationStatus<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, OperationStatus::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationStatus::Error(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            OperationStatus::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationStatus::Error(message) => Some(message),
            _ => None,
        }
    }
}
