use serde::{Deserialize, Serialize};

/// Stored form of a resolved asynchronous result.
///
/// The execute path awaits the user future and persists the resolved value
/// wrapped in this type; the retrieval path unwraps it into an
/// already-resolved future. The wrapper is serde-transparent, so its byte
/// form is exactly the inner value's: the sync/async distinction lives in
/// the function's signature, not in the stored bytes. It is only ever
/// unwrapped explicitly and never compared structurally to raw values.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AwaitableValue<T> {
    pub value: T,
}

impl<T> AwaitableValue<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
