use adscreen_common::FetchStatus;

/// Running counters for one retriever run. Owned by the run and updated as
/// each identifier settles; nothing here is global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ids_processed: u32,
    pub image_urls_found: u32,
    /// Snapshots that could not be fetched; these IDs stay pending.
    pub snapshot_errors: u32,
    pub downloads_succeeded: u32,
    pub downloads_failed: u32,
    pub images_undecodable: u32,
    pub images_uploaded: u32,
    pub chunks_committed: u32,
    pub failures_by_status: [u32; 3], // UnknownError, Timeout, NotFound
}

impl RunStats {
    pub(crate) fn record_download_failure(&mut self, status: FetchStatus) {
        self.downloads_failed += 1;
        match status {
            FetchStatus::UnknownError => self.failures_by_status[0] += 1,
            FetchStatus::Timeout => self.failures_by_status[1] += 1,
            FetchStatus::NotFound => self.failures_by_status[2] += 1,
            FetchStatus::Success => {}
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Retriever Stats ===")?;
        writeln!(f, "Archive IDs processed: {}", self.ids_processed)?;
        writeln!(f, "Image URLs found:      {}", self.image_urls_found)?;
        writeln!(f, "Snapshot errors:       {}", self.snapshot_errors)?;
        writeln!(f, "Downloads succeeded:   {}", self.downloads_succeeded)?;
        writeln!(f, "Downloads failed:      {}", self.downloads_failed)?;
        writeln!(f, "  Unknown error: {}", self.failures_by_status[0])?;
        writeln!(f, "  Timeout:       {}", self.failures_by_status[1])?;
        writeln!(f, "  Not found:     {}", self.failures_by_status[2])?;
        writeln!(f, "Images undecodable:    {}", self.images_undecodable)?;
        writeln!(f, "Images uploaded:       {}", self.images_uploaded)?;
        write!(f, "Chunks committed:      {}", self.chunks_committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_failures_are_bucketed() {
        let mut stats = RunStats::default();
        stats.record_download_failure(FetchStatus::Timeout);
        stats.record_download_failure(FetchStatus::Timeout);
        stats.record_download_failure(FetchStatus::NotFound);
        assert_eq!(stats.downloads_failed, 3);
        assert_eq!(stats.failures_by_status, [0, 2, 1]);
    }

    #[test]
    fn display_lists_every_counter() {
        let stats = RunStats {
            ids_processed: 40,
            image_urls_found: 31,
            ..Default::default()
        };
        let out = stats.to_string();
        assert!(out.contains("Archive IDs processed: 40"));
        assert!(out.contains("Image URLs found:      31"));
        assert!(out.contains("Chunks committed:      0"));
    }
}
