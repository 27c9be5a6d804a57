mod encode;
mod handlers;
mod server;
mod stats;

pub use encode::{encode_jpeg, multipart_part, BOUNDARY, MJPEG_CONTENT_TYPE};
pub use server::{ServerState, StreamServer, StreamServerBuilder};
pub use stats::{ConnectionGuard, StreamStats, StreamStatsSnapshot};
