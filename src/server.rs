//! TCP server exposing the mix RPC surface to peers and operators.
//!
//! Each accepted connection is served on its own task: read a framed
//! request, dispatch the verb to the mixer, write a framed response.
//! Failures are answered with an error envelope; nothing a peer sends can
//! take the node down.
use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{QuillonError, Result};
use crate::mixer::PushMixer;
use crate::wire::{self, MixRequest, MixResponse};

pub struct MixServer {
    listener: TcpListener,
    mixer: PushMixer,
}

impl MixServer {
    pub async fn bind(addr: SocketAddr, mixer: PushMixer) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| QuillonError::Io(e))?;
        Ok(Self { listener, mixer })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(QuillonError::from)
    }

    /// Spawn the accept loop. The returned handle can be aborted to stop
    /// accepting; in-flight connections finish on their own tasks.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        let mixer = self.mixer.clone();
                        tokio::spawn(async move {
                            if let Err(error) = serve_connection(stream, mixer).await {
                                debug!(%peer_addr, %error, "mix connection ended with error");
                            }
                        });
                    }
                    Err(error) => {
                        warn!(%error, "mix accept failed");
                    }
                }
            }
        })
    }
}

/// Serve framed requests on one connection until the peer hangs up.
async fn serve_connection(mut stream: TcpStream, mixer: PushMixer) -> Result<()> {
    loop {
        let frame = match wire::read_frame(&mut stream).await {
            Ok(frame) => frame,
            // Clean hangup between frames.
            Err(QuillonError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = match wire::deserialize::<MixRequest>(&frame) {
            Ok(request) => dispatch(&mixer, request).await,
            Err(error) => MixResponse::Error(error.to_string()),
        };

        let payload = wire::serialize(&response)?;
        wire::write_frame(&mut stream, &payload).await?;
    }
}

async fn dispatch(mixer: &PushMixer, request: MixRequest) -> MixResponse {
    match request {
        MixRequest::Pull { argument } => match mixer.handle_pull(&argument).await {
            Ok(diff) => MixResponse::Diff(diff),
            Err(error) => MixResponse::Error(error.to_string()),
        },
        MixRequest::GetPullArgument => match mixer.handle_get_pull_argument().await {
            Ok(argument) => MixResponse::Argument(argument),
            Err(error) => MixResponse::Error(error.to_string()),
        },
        MixRequest::Push { diff } => match mixer.handle_push(&diff).await {
            Ok(()) => MixResponse::Pushed,
            Err(error) => MixResponse::Error(error.to_string()),
        },
        MixRequest::DoMix => MixResponse::MixCompleted(mixer.do_mix().await),
    }
}
