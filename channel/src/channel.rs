use crate::codec::{Decoded, MessageCodec};
use crate::error::ChannelError;
use crate::message::Message;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

/// Capacity of each of the inbound and outbound queues.
pub const QUEUE_CAPACITY: usize = 128;

/// Pause before reading again after end of stream, see [`Channel::reopening`].
pub const EOF_BACKOFF: Duration = Duration::from_millis(100);

/// One end of a control channel.
///
/// `In` is what this end receives, `Out` is what it sends. The host uses
/// `Channel<GuestMessage, HostMessage>`, the guest the mirror image.
///
/// Responses carry no request identifier, so a caller must keep at most one
/// request outstanding and match the reply by kind.
pub struct Channel<In, Out> {
    inbound: mpsc::Receiver<In>,
    outbound: mpsc::Sender<Out>,
}

impl<In: Message, Out: Message> Channel<In, Out> {
    /// Start the inbound and outbound pumps over the given stream halves.
    ///
    /// [`recv`](Self::recv) yields `None` once the reader hits end of stream.
    /// Must be called from within a tokio runtime. Returns immediately.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(reader, writer, false)
    }

    /// Like [`new`](Self::new), but end of stream is not the end of the
    /// channel: the reader is polled again after [`EOF_BACKOFF`].
    ///
    /// A virtio serial port reads EOF whenever the host side is
    /// disconnected and delivers data again once it reconnects. Only a read
    /// error stops the inbound pump.
    pub fn reopening<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(reader, writer, true)
    }

    fn spawn<R, W>(reader: R, writer: W, reread_on_eof: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);

        let frames = FramedRead::new(reader, MessageCodec::<In, Out>::new());
        let sink = FramedWrite::new(writer, MessageCodec::<In, Out>::new());

        tokio::spawn(inbound_pump(frames, inbound_tx, reread_on_eof));
        tokio::spawn(outbound_pump(sink, outbound_rx));

        Self {
            inbound: inbound_rx,
            outbound: outbound_tx,
        }
    }

    /// Queue a message for sending. Waits while the outbound queue is full.
    pub async fn send(&self, msg: Out) -> Result<(), ChannelError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Next inbound message, or `None` once the inbound pump has stopped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<In> {
        self.inbound.recv().await
    }
}

async fn inbound_pump<R, In, Out>(
    mut frames: FramedRead<R, MessageCodec<In, Out>>,
    tx: mpsc::Sender<In>,
    reread_on_eof: bool,
) where
    R: AsyncRead + Unpin,
    In: Message,
{
    loop {
        let Some(item) = frames.next().await else {
            if !reread_on_eof || tx.is_closed() {
                break;
            }
            tracing::debug!("Control channel at EOF, reading again");
            tokio::time::sleep(EOF_BACKOFF).await;
            // Fresh decoder state for the next connection.
            frames = FramedRead::new(frames.into_inner(), MessageCodec::new());
            continue;
        };

        let decoded: Decoded<In> = match item {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Control channel read failed: {}", e);
                break;
            }
        };

        match decoded {
            Ok(msg) => {
                tracing::debug!(kind = msg.kind(), "Recv msg: {:?}", msg);
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Skipping malformed frame: {}", e),
        }
    }

    tracing::debug!("Inbound pump stopped");
}

async fn outbound_pump<W, In, Out>(
    mut sink: FramedWrite<W, MessageCodec<In, Out>>,
    mut rx: mpsc::Receiver<Out>,
) where
    W: AsyncWrite + Unpin,
    Out: Message,
{
    while let Some(msg) = rx.recv().await {
        tracing::debug!(kind = msg.kind(), "Send msg: {:?}", msg);
        if let Err(e) = sink.send(msg).await {
            tracing::warn!("Control channel write failed: {}", e);
        }
    }

    tracing::debug!("Outbound pump stopped");
}
