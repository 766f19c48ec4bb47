use std::fmt;
use bytes::Bytes;

/// An immutable unit of exchange between the bridge and the application.
///
/// The payload is owned by the message; cloning shares the same buffer and
/// nothing can mutate it after construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    data: Bytes,
}

impl Message {
    /// Creates a message that takes ownership of `data`
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Creates a message from a borrowed buffer whose lifetime the caller
    /// cannot guarantee
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cheap handle to the payload
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Self::from_data(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::from_data(data)
    }
}

impl From<Message> for Bytes {
    fn from(message: Message) -> Self {
        message.data
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("len", &self.data.len()).finish()
    }
}
