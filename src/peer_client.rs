//! Outbound RPC client for peer exchanges.
//!
//! Each verb opens a fresh connection to the target, sends one framed
//! request and reads one framed response, with every phase bounded by the
//! configured timeout. Transport errors, decode errors and remote-side
//! failures all surface as the single peer-failure kind; the caller only
//! needs to know the peer could not be exchanged with.
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{QuillonError, Result};
use crate::wire::{self, MixRequest, MixResponse};

#[derive(Clone, Debug)]
pub struct PeerClient {
    rpc_timeout: Duration,
}

impl PeerClient {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self { rpc_timeout }
    }

    /// Invoke the remote model's pull with our argument; returns its diff.
    pub async fn pull(&self, peer: SocketAddr, argument: &[u8]) -> Result<Vec<u8>> {
        let request = MixRequest::Pull {
            argument: argument.to_vec(),
        };
        match self.call(peer, "pull", &request).await? {
            MixResponse::Diff(diff) => Ok(diff),
            other => Err(unexpected_response(peer, "pull", &other)),
        }
    }

    /// Fetch the remote node's current pull argument.
    pub async fn get_pull_argument(&self, peer: SocketAddr) -> Result<Vec<u8>> {
        match self.call(peer, "get_pull_argument", &MixRequest::GetPullArgument).await? {
            MixResponse::Argument(argument) => Ok(argument),
            other => Err(unexpected_response(peer, "get_pull_argument", &other)),
        }
    }

    /// Apply our diff to the remote model.
    pub async fn push(&self, peer: SocketAddr, diff: &[u8]) -> Result<()> {
        let request = MixRequest::Push {
            diff: diff.to_vec(),
        };
        match self.call(peer, "push", &request).await? {
            MixResponse::Pushed => Ok(()),
            other => Err(unexpected_response(peer, "push", &other)),
        }
    }

    /// Ask the remote node to run one forced mix cycle.
    pub async fn do_mix(&self, peer: SocketAddr) -> Result<bool> {
        match self.call(peer, "do_mix", &MixRequest::DoMix).await? {
            MixResponse::MixCompleted(completed) => Ok(completed),
            other => Err(unexpected_response(peer, "do_mix", &other)),
        }
    }

    async fn call(
        &self,
        peer: SocketAddr,
        verb: &str,
        request: &MixRequest,
    ) -> Result<MixResponse> {
        let payload = wire::serialize(request)
            .map_err(|e| peer_failure(peer, verb, &format!("encode: {}", e)))?;

        // One timeout bounds the whole exchange: connect, send, receive.
        let exchange = async {
            let mut stream = TcpStream::connect(peer)
                .await
                .map_err(|e| peer_failure(peer, verb, &format!("connect: {}", e)))?;
            debug!(%peer, verb, "opened mix connection");

            wire::write_frame(&mut stream, &payload)
                .await
                .map_err(|e| peer_failure(peer, verb, &format!("send: {}", e)))?;
            wire::read_frame(&mut stream)
                .await
                .map_err(|e| peer_failure(peer, verb, &format!("receive: {}", e)))
        };
        let frame = match timeout(self.rpc_timeout, exchange).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(peer_failure(peer, verb, "timeout")),
        };

        match wire::deserialize::<MixResponse>(&frame) {
            Ok(MixResponse::Error(message)) => Err(peer_failure(peer, verb, &message)),
            Ok(response) => Ok(response),
            Err(e) => Err(peer_failure(peer, verb, &format!("decode: {}", e))),
        }
    }
}

fn peer_failure(peer: SocketAddr, verb: &str, detail: &str) -> QuillonError {
    QuillonError::Peer(format!("{}: {}: {}", peer, verb, detail))
}

fn unexpected_response(peer: SocketAddr, verb: &str, response: &MixResponse) -> QuillonError {
    peer_failure(
        peer,
        verb,
        &format!("unexpected response variant: {:?}", response),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot peer stub answering every request with a fixed response.
    async fn scripted_peer(response: MixResponse) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _request = wire::read_frame(&mut stream).await.unwrap();
            let payload = wire::serialize(&response).unwrap();
            wire::write_frame(&mut stream, &payload).await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn test_pull_returns_remote_diff() {
        let addr = scripted_peer(MixResponse::Diff(vec![7, 8, 9])).await;
        let client = PeerClient::new(Duration::from_secs(1));

        let diff = client.pull(addr, &[1, 2]).await.unwrap();
        assert_eq!(diff, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_push_acknowledged() {
        let addr = scripted_peer(MixResponse::Pushed).await;
        let client = PeerClient::new(Duration::from_secs(1));
        client.push(addr, &[1, 2, 3]).await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_as_peer_failure() {
        let addr = scripted_peer(MixResponse::Error("model on fire".to_string())).await;
        let client = PeerClient::new(Duration::from_secs(1));

        let err = client.get_pull_argument(addr).await.unwrap_err();
        match err {
            QuillonError::Peer(message) => assert!(message.contains("model on fire")),
            other => panic!("Expected Peer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_variant_is_peer_failure() {
        let addr = scripted_peer(MixResponse::Pushed).await;
        let client = PeerClient::new(Duration::from_secs(1));

        let err = client.pull(addr, &[]).await.unwrap_err();
        assert!(matches!(err, QuillonError::Peer(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_peer_failure() {
        // Bind then drop to obtain an address nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PeerClient::new(Duration::from_secs(1));
        let err = client.push(addr, &[1]).await.unwrap_err();
        assert!(matches!(err, QuillonError::Peer(_)));
    }

    #[tokio::test]
    async fn test_unresponsive_peer_times_out() {
        // Accepts the connection and reads the request, but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _request = wire::read_frame(&mut stream).await;
            std::future::pending::<()>().await;
        });

        let client = PeerClient::new(Duration::from_millis(200));
        let err = client.pull(addr, &[]).await.unwrap_err();
        match err {
            QuillonError::Peer(message) => assert!(message.contains("timeout")),
            other => panic!("Expected Peer error, got {:?}", other),
        }
    }
}
