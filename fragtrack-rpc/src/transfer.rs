//! Peer Transfer Service: distribution lookups and fragment byte streaming.
//!
//! The download exchange is lazy and 1:1: each incoming request is answered
//! with exactly one reply, produced as the request arrives, so an unbounded
//! stream needs no buffering. Unknown or missing fragments yield a per-item
//! error reply; the stream itself ends only when the request stream does.
//! Streaming is read-only with respect to tracker state, so cancellation
//! (dropping the stream) needs no rollback.

use std::sync::Arc;

use futures_core::Stream;
use tokio_stream::StreamExt;
use tracing::debug;

use fragtrack_core::{FileDistribution, FragmentStore, HashProvider, Result};

use crate::proto::{
    ErrorCode, FragmentDownloadReply, FragmentDownloadRequest, WireError,
};
use crate::tracker::TrackerService;

pub struct TransferService {
    tracker: Arc<TrackerService>,
    store: Arc<FragmentStore>,
    hasher: Arc<dyn HashProvider>,
}

impl TransferService {
    pub fn new(tracker: Arc<TrackerService>) -> Self {
        let store = tracker.store();
        let hasher = tracker.hasher();
        Self {
            tracker,
            store,
            hasher,
        }
    }

    /// Fragment order and holder map for a file; delegates to the tracker's
    /// index.
    pub fn file_distribution(&self, file_hash: &str) -> Result<FileDistribution> {
        self.tracker.file_distribution(file_hash)
    }

    /// Bidirectional fragment download: maps the request stream onto a reply
    /// stream, one reply per request, in request order.
    pub fn download_file_fragment<S>(
        &self,
        requests: S,
    ) -> impl Stream<Item = FragmentDownloadReply> + Send + 'static
    where
        S: Stream<Item = FragmentDownloadRequest> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let hasher = Arc::clone(&self.hasher);
        requests.map(move |req| Self::serve_one(&store, hasher.as_ref(), req))
    }

    /// Single request/reply step, for transports that frame the exchange
    /// themselves.
    pub fn download_one(&self, req: FragmentDownloadRequest) -> FragmentDownloadReply {
        Self::serve_one(&self.store, self.hasher.as_ref(), req)
    }

    fn serve_one(
        store: &FragmentStore,
        hasher: &dyn HashProvider,
        req: FragmentDownloadRequest,
    ) -> FragmentDownloadReply {
        if !hasher.validate(&req.fragment_hash) {
            return FragmentDownloadReply::Error {
                fragment_hash: req.fragment_hash.clone(),
                error: WireError {
                    code: ErrorCode::InvalidArgument,
                    message: format!("invalid fragment hash format: {:?}", req.fragment_hash),
                },
            };
        }
        let fragment_hash = hasher.normalize(&req.fragment_hash);

        match store.get(&fragment_hash) {
            Some(bytes) => {
                debug!(fragment = %fragment_hash, len = bytes.len(), "serving fragment");
                FragmentDownloadReply::Data {
                    fragment_hash,
                    data: bytes.to_vec(),
                }
            }
            None => FragmentDownloadReply::Error {
                fragment_hash: fragment_hash.clone(),
                error: WireError {
                    code: ErrorCode::UnknownFragment,
                    message: format!("fragment {fragment_hash} is not available here"),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::FragmentUploadInfo;
    use fragtrack_core::Sha256Provider;

    fn hx(data: &[u8]) -> String {
        Sha256Provider.compute(data)
    }

    async fn seeded_transfer(fragments: &[&[u8]]) -> (Arc<TrackerService>, TransferService, String) {
        let tracker = Arc::new(TrackerService::default());
        let whole: Vec<u8> = fragments.concat();
        let file = hx(&whole);
        tracker
            .initiate_upload(whole.len() as u64, &file, Some(fragments.len() as u64))
            .await
            .unwrap();
        for f in fragments {
            let info = FragmentUploadInfo {
                file_hash: file.clone(),
                fragment_hash: hx(f),
                length: f.len() as u64,
                endpoint: "peer-1:7000".to_string(),
            };
            tracker.upload_fragment(&info, f).await.unwrap();
        }
        let transfer = TransferService::new(Arc::clone(&tracker));
        (tracker, transfer, file)
    }

    #[tokio::test]
    async fn replies_pair_with_requests_in_order() {
        let fragments: Vec<&[u8]> = vec![b"one-", b"two-", b"three"];
        let (_tracker, transfer, file) = seeded_transfer(&fragments).await;

        // any request order, including repeats
        let order = transfer.file_distribution(&file).unwrap().fragment_order;
        let requests: Vec<_> = order
            .iter()
            .rev()
            .chain(order.iter().take(1))
            .map(|h| FragmentDownloadRequest {
                fragment_hash: h.clone(),
            })
            .collect();
        let want: Vec<String> = requests.iter().map(|r| r.fragment_hash.clone()).collect();

        let replies: Vec<_> = transfer
            .download_file_fragment(tokio_stream::iter(requests))
            .collect()
            .await;

        assert_eq!(replies.len(), want.len());
        for (reply, hash) in replies.iter().zip(&want) {
            match reply {
                FragmentDownloadReply::Data {
                    fragment_hash,
                    data,
                } => {
                    assert_eq!(fragment_hash, hash);
                    assert_eq!(&hx(data), hash);
                }
                FragmentDownloadReply::Error { .. } => panic!("expected data for {hash}"),
            }
        }
    }

    #[tokio::test]
    async fn missing_fragment_is_a_per_item_error_and_stream_survives() {
        let fragments: Vec<&[u8]> = vec![b"present!"];
        let (_tracker, transfer, _file) = seeded_transfer(&fragments).await;

        let present = hx(b"present!");
        let absent = hx(b"never registered");
        let requests = vec![
            FragmentDownloadRequest {
                fragment_hash: absent.clone(),
            },
            FragmentDownloadRequest {
                fragment_hash: present.clone(),
            },
        ];

        let replies: Vec<_> = transfer
            .download_file_fragment(tokio_stream::iter(requests))
            .collect()
            .await;

        assert!(matches!(
            &replies[0],
            FragmentDownloadReply::Error { fragment_hash, .. } if *fragment_hash == absent
        ));
        assert!(matches!(
            &replies[1],
            FragmentDownloadReply::Data { fragment_hash, .. } if *fragment_hash == present
        ));
    }

    #[tokio::test]
    async fn malformed_request_hash_is_a_per_item_error() {
        let (_tracker, transfer, _file) = seeded_transfer(&[b"bytes"]).await;
        let replies: Vec<_> = transfer
            .download_file_fragment(tokio_stream::iter(vec![FragmentDownloadRequest {
                fragment_hash: "bogus".to_string(),
            }]))
            .collect()
            .await;
        assert!(matches!(
            &replies[0],
            FragmentDownloadReply::Error { error, .. } if error.code == ErrorCode::InvalidArgument
        ));
    }

    #[tokio::test]
    async fn empty_request_stream_completes_immediately() {
        let (_tracker, transfer, _file) = seeded_transfer(&[b"bytes"]).await;
        let replies: Vec<_> = transfer
            .download_file_fragment(tokio_stream::iter(
                Vec::<FragmentDownloadRequest>::new(),
            ))
            .collect()
            .await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn round_trip_reassembles_the_original_file() {
        let fragments: Vec<&[u8]> = vec![b"the quick ", b"brown fox ", b"jumps over"];
        let (_tracker, transfer, file) = seeded_transfer(&fragments).await;

        let dist = transfer.file_distribution(&file).unwrap();
        assert_eq!(
            dist.fragment_order,
            fragments.iter().map(|f| hx(f)).collect::<Vec<_>>()
        );

        let requests: Vec<_> = dist
            .fragment_order
            .iter()
            .map(|h| FragmentDownloadRequest {
                fragment_hash: h.clone(),
            })
            .collect();
        let replies: Vec<_> = transfer
            .download_file_fragment(tokio_stream::iter(requests))
            .collect()
            .await;

        let mut rebuilt = Vec::new();
        for reply in replies {
            match reply {
                FragmentDownloadReply::Data { data, .. } => rebuilt.extend_from_slice(&data),
                FragmentDownloadReply::Error { .. } => panic!("expected all fragments"),
            }
        }
        assert_eq!(rebuilt, fragments.concat());
        assert_eq!(hx(&rebuilt), file);
    }
}
