//! Newline-delimited JSON transport adapter.
//!
//! One JSON request per line, one JSON response line per request, over a
//! persistent connection. Because replies are written in request order, a
//! connection doubles as the paired bidirectional stream the download
//! operation needs. Each connection runs in its own task; dropping the
//! connection cancels nothing but the connection itself.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use fragtrack_core::FragmentStore;
use fragtrack_rpc::proto::{ErrorCode, Request, Response, WireError};
use fragtrack_rpc::{TrackerService, TransferService};

pub struct Daemon {
    tracker: Arc<TrackerService>,
    transfer: TransferService,
}

impl Daemon {
    pub fn new(store_capacity: u64) -> Self {
        let store = Arc::new(FragmentStore::with_capacity(store_capacity));
        let tracker = Arc::new(TrackerService::new(
            Arc::new(fragtrack_core::Sha256Provider),
            store,
        ));
        let transfer = TransferService::new(Arc::clone(&tracker));
        Self { tracker, transfer }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "listening");
        loop {
            let (socket, peer) = listener.accept().await?;
            debug!(%peer, "peer connected");
            let daemon = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = daemon.handle(socket).await {
                    warn!(%peer, %err, "connection ended with error");
                }
            });
        }
    }

    async fn handle(&self, socket: TcpStream) -> io::Result<()> {
        let (reader, writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut out = BufWriter::new(writer);

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.dispatch(request).await,
                Err(err) => Response::Error(WireError {
                    code: ErrorCode::InvalidArgument,
                    message: format!("malformed request: {err}"),
                }),
            };
            let encoded = serde_json::to_vec(&response).map_err(io::Error::other)?;
            out.write_all(&encoded).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::GetNetworkInfo => Response::NetworkInfo(self.tracker.network_info()),
            Request::GetUploadStatus { file_hash } => {
                match self.tracker.upload_status(&file_hash) {
                    Ok(status) => Response::UploadStatus { status },
                    Err(err) => Response::Error(err.into()),
                }
            }
            Request::InitiateUpload {
                size,
                file_hash,
                fragment_count,
            } => match self
                .tracker
                .initiate_upload(size, &file_hash, fragment_count)
                .await
            {
                Ok(()) => Response::Ok,
                Err(err) => Response::Error(err.into()),
            },
            Request::UploadFragment { info, data } => {
                match self.tracker.upload_fragment(&info, &data).await {
                    Ok(status) => Response::UploadStatus { status },
                    Err(err) => Response::Error(err.into()),
                }
            }
            Request::FinalizeUpload { file_hash } => {
                match self.tracker.finalize_upload(&file_hash).await {
                    Ok(status) => Response::UploadStatus { status },
                    Err(err) => Response::Error(err.into()),
                }
            }
            Request::AbortUpload { file_hash } => {
                match self.tracker.abort_upload(&file_hash).await {
                    Ok(()) => Response::Ok,
                    Err(err) => Response::Error(err.into()),
                }
            }
            Request::GetFileDistribution { file_hash } => {
                match self.tracker.file_distribution(&file_hash) {
                    Ok(dist) => Response::FileDistribution(dist),
                    Err(err) => Response::Error(err.into()),
                }
            }
            Request::DownloadFileFragment(req) => {
                Response::Fragment(self.transfer.download_one(req))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragtrack_core::{HashProvider, Sha256Provider, UploadStatus};
    use fragtrack_rpc::proto::{FragmentDownloadReply, FragmentUploadInfo};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn spawn_daemon() -> std::net::SocketAddr {
        let daemon = Arc::new(Daemon::new(1024 * 1024));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(daemon.serve(listener));
        addr
    }

    async fn roundtrip(
        stream: &mut BufReader<TcpStream>,
        request: &Request,
    ) -> Response {
        let line = serde_json::to_string(request).unwrap();
        stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        stream.get_mut().write_all(b"\n").await.unwrap();
        let mut reply = String::new();
        stream.read_line(&mut reply).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn full_publish_and_download_cycle_over_the_wire() {
        let addr = spawn_daemon().await;
        let mut conn = BufReader::new(TcpStream::connect(addr).await.unwrap());

        let hasher = Sha256Provider;
        let fragments: Vec<&[u8]> = vec![b"wire-one", b"wire-two"];
        let whole: Vec<u8> = fragments.concat();
        let file = hasher.compute(&whole);

        let resp = roundtrip(
            &mut conn,
            &Request::InitiateUpload {
                size: whole.len() as u64,
                file_hash: file.clone(),
                fragment_count: Some(2),
            },
        )
        .await;
        assert!(matches!(resp, Response::Ok));

        for f in &fragments {
            let resp = roundtrip(
                &mut conn,
                &Request::UploadFragment {
                    info: FragmentUploadInfo {
                        file_hash: file.clone(),
                        fragment_hash: hasher.compute(f),
                        length: f.len() as u64,
                        endpoint: "peer-1:7000".to_string(),
                    },
                    data: f.to_vec(),
                },
            )
            .await;
            assert!(matches!(resp, Response::UploadStatus { .. }));
        }

        let resp = roundtrip(&mut conn, &Request::GetUploadStatus { file_hash: file.clone() }).await;
        assert!(matches!(
            resp,
            Response::UploadStatus { status: UploadStatus::Complete }
        ));

        let Response::FileDistribution(dist) =
            roundtrip(&mut conn, &Request::GetFileDistribution { file_hash: file.clone() }).await
        else {
            panic!("expected a distribution");
        };
        assert_eq!(dist.fragment_order.len(), 2);

        // download over the same connection, replies paired in order
        for (hash, f) in dist.fragment_order.iter().zip(&fragments) {
            let resp = roundtrip(
                &mut conn,
                &Request::DownloadFileFragment(
                    fragtrack_rpc::proto::FragmentDownloadRequest {
                        fragment_hash: hash.clone(),
                    },
                ),
            )
            .await;
            match resp {
                Response::Fragment(FragmentDownloadReply::Data { data, .. }) => {
                    assert_eq!(&data, f);
                }
                other => panic!("expected fragment data, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn malformed_line_yields_an_error_response_and_keeps_the_connection() {
        let addr = spawn_daemon().await;
        let mut conn = BufReader::new(TcpStream::connect(addr).await.unwrap());

        conn.get_mut().write_all(b"{nope\n").await.unwrap();
        let mut reply = String::new();
        conn.read_line(&mut reply).await.unwrap();
        let resp: Response = serde_json::from_str(&reply).unwrap();
        assert!(matches!(
            resp,
            Response::Error(WireError { code: ErrorCode::InvalidArgument, .. })
        ));

        // connection still serves requests
        let resp = roundtrip(&mut conn, &Request::GetNetworkInfo).await;
        assert!(matches!(resp, Response::NetworkInfo(_)));
    }

    #[tokio::test]
    async fn unknown_file_error_crosses_the_wire_with_its_code() {
        let addr = spawn_daemon().await;
        let mut conn = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let file = Sha256Provider.compute(b"never initiated");
        let resp = roundtrip(&mut conn, &Request::GetUploadStatus { file_hash: file }).await;
        assert!(matches!(
            resp,
            Response::Error(WireError { code: ErrorCode::UnknownFile, .. })
        ));
    }
}
