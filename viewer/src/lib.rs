pub mod auth;
pub mod decode;
pub mod poller;
pub mod source;
pub mod wall;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthContext, AuthUpdater};
pub use decode::{DecodedFrame, FrameDecoder, JpegDecoder};
pub use poller::{FrameFeed, FrameState, FrameStatus, Phase, PollerHandle, PollerOptions};
pub use source::{FetchError, FrameRequest, FrameSource, HttpFrameSource};
pub use wall::LiveWall;
