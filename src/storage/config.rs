use super::persistence::FrameCompression;

/// Configuration shared by a session, its entries and its subsessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pending rows per point entry before a write is forced (0 = only on flush)
    pub flush_threshold: usize,
    /// How image frames are stored
    pub frame_compression: FrameCompression,
    /// fsync files as part of every flush
    pub sync_on_flush: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 256,
            frame_compression: FrameCompression::Lz4,
            sync_on_flush: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_threshold(mut self, rows: usize) -> Self {
        self.flush_threshold = rows;
        self
    }

    pub fn with_frame_compression(mut self, compression: FrameCompression) -> Self {
        self.frame_compression = compression;
        self
    }

    pub fn with_sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }

    /// Overlay `CHRONOSCOPE_FLUSH_THRESHOLD`, `CHRONOSCOPE_FRAME_COMPRESSION`
    /// (`lz4` or `none`) and `CHRONOSCOPE_SYNC` (`true`/`false`) on top of `self`
    pub fn from_env(self) -> Self {
        let mut config = self;
        if let Some(rows) = std::env::var("CHRONOSCOPE_FLUSH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.flush_threshold = rows;
        }
        match std::env::var("CHRONOSCOPE_FRAME_COMPRESSION").as_deref() {
            Ok("none") => config.frame_compression = FrameCompression::None,
            Ok("lz4") => config.frame_compression = FrameCompression::Lz4,
            Ok(other) => tracing::warn!("ignoring unknown frame compression '{}'", other),
            Err(_) => {}
        }
        if let Some(sync) = std::env::var("CHRONOSCOPE_SYNC")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.sync_on_flush = sync;
        }
        config
    }
}
