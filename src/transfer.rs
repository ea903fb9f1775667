//! File upload/download over the chain's terminal transport.
//!
//! The wire protocol is the sftp subsystem, driven through `russh-sftp` as a
//! black box. Transfers reuse the chain's already-authenticated terminal
//! session and perform no authentication of their own; each operation opens
//! one subsystem channel and releases it before returning, so the chain
//! stays usable after a failed transfer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::chain::TunnelChain;
use crate::error::{Error, Result};

/// Bytes moved per chunk. Progress events fire at chunk boundaries.
const TRANSFER_CHUNK: usize = 64 * 1024;

/// Progress of one transfer, delivered to a [`ProgressHandler`] at chunk
/// boundaries. Purely observational.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub filename: String,
    pub total_bytes: u64,
    pub sent_bytes: u64,
    /// `host:port` of the terminal hop carrying the transfer.
    pub peer: String,
}

/// Receives periodic transfer progress events.
#[async_trait]
pub trait ProgressHandler: Send + Sync {
    async fn on_progress(&self, progress: TransferProgress);
}

/// Moves single files over an initialized chain's terminal transport.
pub struct FileTransfer {
    chain: TunnelChain,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl FileTransfer {
    /// Take ownership of an initialized chain for file transfer use.
    pub fn new(chain: TunnelChain) -> Self {
        Self {
            chain,
            progress: None,
        }
    }

    /// Register a progress observer.
    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    pub fn chain(&self) -> &TunnelChain {
        &self.chain
    }

    /// Upload a local file to `dest_path` on the terminal hop.
    ///
    /// The local path is checked before any transport activity; a missing
    /// source returns [`Error::SourceNotFound`] without touching the chain.
    pub async fn upload(&self, source_path: impl AsRef<Path>, dest_path: &str) -> Result<()> {
        let source = source_path.as_ref();
        let meta = tokio::fs::metadata(source)
            .await
            .map_err(|_| Error::SourceNotFound(source.to_path_buf()))?;
        if !meta.is_file() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }
        let total = meta.len();
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        let (sftp, peer) = self.open_sftp().await?;
        let result = self
            .upload_stream(&sftp, source, dest_path, &filename, total, &peer)
            .await;
        // Channel before transport: the subsystem channel is released here
        // whether or not the copy succeeded.
        let _ = sftp.close().await;

        result?;
        info!("uploaded {filename} ({total} bytes) to {peer}:{dest_path}");
        Ok(())
    }

    /// Download `remote_path` from the terminal hop into `local_path`.
    pub async fn download(&self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<()> {
        let local = local_path.as_ref();
        let filename = remote_path
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or(remote_path)
            .to_string();

        let (sftp, peer) = self.open_sftp().await?;
        let result = self
            .download_stream(&sftp, remote_path, local, &filename, &peer)
            .await;
        let _ = sftp.close().await;

        let total = result?;
        info!("downloaded {filename} ({total} bytes) from {peer}:{remote_path}");
        Ok(())
    }

    /// Release the file-copy channel, then close the whole chain.
    pub async fn close(&mut self) {
        // Subsystem channels are per-operation and already released; what
        // remains is the chain itself, leaf to root.
        self.chain.close().await;
    }

    async fn open_sftp(&self) -> Result<(SftpSession, String)> {
        let transport = self.chain.transport()?;
        let channel = transport.open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        debug!("sftp subsystem open on {}", transport.address());
        Ok((sftp, transport.address()))
    }

    async fn upload_stream(
        &self,
        sftp: &SftpSession,
        source: &Path,
        dest_path: &str,
        filename: &str,
        total: u64,
        peer: &str,
    ) -> Result<()> {
        let mut local = tokio::fs::File::open(source).await?;
        let mut remote = sftp
            .open_with_flags(
                dest_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await?;

        let mut sent: u64 = 0;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        loop {
            let n = local.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            remote
                .write_all(&buf[..n])
                .await
                .map_err(|e| Error::Protocol(e.to_string()))?;
            sent += n as u64;
            self.report(filename, total, sent, peer).await;
        }

        remote
            .shutdown()
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn download_stream(
        &self,
        sftp: &SftpSession,
        remote_path: &str,
        local_path: &Path,
        filename: &str,
        peer: &str,
    ) -> Result<u64> {
        let total = sftp
            .metadata(remote_path)
            .await
            .map(|attrs| attrs.size.unwrap_or(0))?;
        let mut remote = sftp.open_with_flags(remote_path, OpenFlags::READ).await?;
        let mut local = tokio::fs::File::create(local_path).await?;

        let mut received: u64 = 0;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        loop {
            let n = remote
                .read(&mut buf)
                .await
                .map_err(|e| Error::Protocol(e.to_string()))?;
            if n == 0 {
                break;
            }
            local.write_all(&buf[..n]).await?;
            received += n as u64;
            self.report(filename, total, received, peer).await;
        }

        local.flush().await?;
        Ok(received)
    }

    async fn report(&self, filename: &str, total: u64, sent: u64, peer: &str) {
        if let Some(handler) = &self.progress {
            handler
                .on_progress(TransferProgress {
                    filename: filename.to_string(),
                    total_bytes: total,
                    sent_bytes: sent,
                    peer: peer.to_string(),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::HopInfo;

    fn uninitialized_transfer() -> FileTransfer {
        let chain =
            TunnelChain::from_hops([HopInfo::new("gateway", 22, "user", "pw").unwrap()]);
        FileTransfer::new(chain)
    }

    #[tokio::test]
    async fn test_upload_missing_source_checked_before_transport() {
        // The chain is not initialized, so any transport activity would
        // surface as Error::Chain. A missing source must win.
        let transfer = uninitialized_transfer();
        let result = transfer
            .upload("definitely-missing-file.txt", "/tmp/x")
            .await;
        assert!(matches!(result, Err(Error::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_upload_existing_source_reaches_transport_check() {
        let path = std::env::temp_dir().join("hopchain_upload_order_test.txt");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let transfer = uninitialized_transfer();
        let result = transfer.upload(&path, "/tmp/x").await;
        assert!(matches!(result, Err(Error::Chain(_))));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_download_requires_initialized_chain() {
        let transfer = uninitialized_transfer();
        let result = transfer.download("/etc/hostname", "/tmp/hostname").await;
        assert!(matches!(result, Err(Error::Chain(_))));
    }

    #[test]
    fn test_progress_event_fields() {
        let progress = TransferProgress {
            filename: "data.bin".to_string(),
            total_bytes: 2048,
            sent_bytes: 1024,
            peer: "10.0.0.5:22".to_string(),
        };
        assert_eq!(progress.total_bytes, 2048);
        assert_eq!(progress.sent_bytes, 1024);
    }
}
