use crate::activity::ActivityTracker;
use crate::error::HashmailError;
use crate::framing::read_frame;
use crate::framing::write_frame;
use crate::mailbox::MailboxConfig;
use crate::mailbox::StreamId;
use crate::registry::MailboxRegistry;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;

pub mod pb {
    tonic::include_proto!("hashmail");
}

use pb::hashmail_server::Hashmail;
use pb::hashmail_server::HashmailServer;
use pb::CipherBox;
use pb::CipherBoxAuth;
use pb::CipherBoxDesc;
use pb::CipherInitResp;
use pb::DelCipherBoxResp;
use pb::Empty;

/// The gRPC front for the mailbox registry (§4.7). Every RPC is a thin
/// adapter: identity and auth parsing, then delegation to the
/// transport-agnostic registry/mailbox/framing core.
pub struct HashmailService {
    registry: MailboxRegistry,
    activity: Arc<ActivityTracker>,
    default_config: MailboxConfig,
}

impl HashmailService {
    pub fn new(
        registry: MailboxRegistry,
        activity: Arc<ActivityTracker>,
        default_config: MailboxConfig,
    ) -> Self {
        Self {
            registry,
            activity,
            default_config,
        }
    }

    pub fn into_server(self) -> HashmailServer<Self> {
        HashmailServer::new(self)
    }
}

fn to_stream_id(bytes: &[u8]) -> Result<StreamId, Status> {
    bytes
        .try_into()
        .map_err(|_| Status::invalid_argument("stream_id must be 64 bytes"))
}

fn map_err(err: HashmailError) -> Status {
    match err {
        HashmailError::AlreadyExists => Status::already_exists("stream already exists"),
        HashmailError::NotFound => Status::not_found("stream not found"),
        HashmailError::AlreadyInUse => Status::failed_precondition("sub-stream already occupied"),
        HashmailError::Canceled => Status::cancelled("canceled"),
        HashmailError::Closed => Status::unavailable("pipe closed"),
        HashmailError::Malformed(msg) => Status::invalid_argument(msg),
    }
}

fn require_desc(desc: Option<CipherBoxDesc>) -> Result<CipherBoxDesc, Status> {
    desc.ok_or_else(|| Status::invalid_argument("missing descriptor"))
}

#[tonic::async_trait]
impl Hashmail for HashmailService {
    async fn new_cipher_box(
        &self,
        request: Request<CipherBoxAuth>,
    ) -> Result<Response<CipherInitResp>, Status> {
        // The auth validator for stream init/teardown is unconditionally a
        // no-op; see DESIGN.md's open-question decisions.
        let desc = require_desc(request.into_inner().desc)?;
        let stream_id = to_stream_id(&desc.stream_id)?;
        self.registry
            .new_cipher_box(stream_id, self.default_config)
            .map_err(map_err)?;
        Ok(Response::new(CipherInitResp {}))
    }

    async fn del_cipher_box(
        &self,
        request: Request<CipherBoxAuth>,
    ) -> Result<Response<DelCipherBoxResp>, Status> {
        let desc = require_desc(request.into_inner().desc)?;
        let stream_id = to_stream_id(&desc.stream_id)?;
        self.registry.del_cipher_box(&stream_id).map_err(map_err)?;
        Ok(Response::new(DelCipherBoxResp {}))
    }

    async fn send_stream(
        &self,
        request: Request<Streaming<CipherBox>>,
    ) -> Result<Response<Empty>, Status> {
        let mut inbound = request.into_inner();
        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("empty send stream"))?;
        let desc = require_desc(first.desc.clone())?;
        let stream_id = to_stream_id(&desc.stream_id)?;
        let mailbox = self
            .registry
            .get(&stream_id)
            .ok_or_else(|| Status::not_found("stream not found"))?;
        let mut writer = mailbox.take_write().map_err(map_err)?;

        if !first.payload.is_empty() {
            mailbox.rate_limiter.acquire().await;
            write_frame(&mut *writer, &first.payload).await.map_err(map_err)?;
        }

        while let Some(frame) = inbound.message().await? {
            mailbox.rate_limiter.acquire().await;
            write_frame(&mut *writer, &frame.payload).await.map_err(map_err)?;
        }
        let _ = writer.shutdown().await;
        Ok(Response::new(Empty {}))
    }

    type RecvStreamStream = ReceiverStream<Result<CipherBox, Status>>;

    async fn recv_stream(
        &self,
        request: Request<CipherBoxDesc>,
    ) -> Result<Response<Self::RecvStreamStream>, Status> {
        let desc = request.into_inner();
        let stream_id = to_stream_id(&desc.stream_id)?;
        let mailbox = self
            .registry
            .get(&stream_id)
            .ok_or_else(|| Status::not_found("stream not found"))?;
        let mut reader = mailbox.take_read().map_err(map_err)?;

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let activity = self.activity.clone();
        let response_desc = CipherBoxDesc {
            stream_id: stream_id.to_vec(),
        };
        tokio::spawn(async move {
            loop {
                match read_frame(&mut *reader).await {
                    Ok(payload) => {
                        activity.record_read(&stream_id);
                        let frame = CipherBox {
                            desc: Some(response_desc.clone()),
                            payload,
                        };
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(HashmailError::Closed) => break,
                    Err(err) => {
                        let _ = tx.send(Err(map_err(err))).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
