//! Stream transport abstraction and in-process mock.
//!
//! This module provides the interface between the network stream protocol
//! (resolve advertised streams, open inlets, pull timestamped chunks) and the
//! rest of the bridge. The protocol implementation itself lives outside this
//! crate behind [`StreamTransport`] and [`Inlet`].

mod mock;
mod stream_info;

pub use mock::{MockInlet, MockOutlet, MockTransport};
pub use stream_info::StreamInfo;

use crate::{InletError, InletOptions};

/// A live connection to one advertised stream.
///
/// Every method is called from background tasks only, never from the render
/// path. Implementations must not block in [`pull_chunk`](Inlet::pull_chunk).
pub trait Inlet: Send {
    /// Metadata of the connected stream.
    fn info(&self) -> &StreamInfo;

    /// Pulls up to `timestamps.len()` frames without blocking.
    ///
    /// Frames are written channel-interleaved into `samples`, which holds at
    /// least `timestamps.len() * channel_count` values. Returns the number of
    /// frames written; `Ok(0)` means nothing was ready.
    ///
    /// Returns [`InletError::Lost`] once the source is gone for good.
    fn pull_chunk(&mut self, samples: &mut [f32], timestamps: &mut [f64])
        -> Result<usize, InletError>;

    /// Closes the connection. Further pulls report [`InletError::Lost`].
    fn close(&mut self);
}

/// Discovery and connection side of a stream protocol.
pub trait StreamTransport: Send {
    /// Returns the streams currently advertised. Must not block.
    fn resolve(&mut self) -> Vec<StreamInfo>;

    /// Opens an inlet to the given stream.
    fn open(
        &mut self,
        info: &StreamInfo,
        options: &InletOptions,
    ) -> Result<Box<dyn Inlet>, InletError>;
}

impl<T: StreamTransport + ?Sized> StreamTransport for Box<T> {
    fn resolve(&mut self) -> Vec<StreamInfo> {
        (**self).resolve()
    }

    fn open(
        &mut self,
        info: &StreamInfo,
        options: &InletOptions,
    ) -> Result<Box<dyn Inlet>, InletError> {
        (**self).open(info, options)
    }
}
