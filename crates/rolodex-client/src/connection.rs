//! Connection driver.
//!
//! One background task owns the TCP stream. Callers hand it frames to write
//! together with a reply channel registered under the outgoing message ID;
//! the driver reads frames, decodes them, and routes each response to the
//! channel registered for its ID. Terminal responses evict the registration,
//! so overlapping operations on one connection never see each other's
//! messages.

use bytes::BytesMut;
use rolodex_core::{Error, Result};
use rolodex_proto::message::UNSOLICITED_ID;
use rolodex_proto::{frame_len, Control, LdapMessage, ProtocolOp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

type Reply = mpsc::UnboundedSender<Result<LdapMessage>>;
type Pending = HashMap<i32, Reply>;

enum DriverCommand {
    /// Write a frame and route responses for `id` to `reply`.
    Send {
        id: i32,
        frame: Vec<u8>,
        reply: Reply,
    },
    /// Write a frame that expects no response.
    Notify { frame: Vec<u8> },
    /// Stop routing responses for `id`.
    Unregister { id: i32 },
    /// Shut the transport down.
    Close,
}

/// Handle to a live connection driver.
#[derive(Debug)]
pub(crate) struct Connection {
    commands: mpsc::UnboundedSender<DriverCommand>,
    next_id: AtomicI32,
    closed: AtomicBool,
    driver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Dials `host:port` and spawns the driver task.
    pub(crate) async fn open(host: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        let socket = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Timeout(format!("connecting to {host}:{port} timed out")))?
            .map_err(|err| Error::Connection(format!("connect to {host}:{port} failed: {err}")))?;
        debug!(host, port, "connected to directory server");

        let (commands, receiver) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(socket, receiver));
        Ok(Self {
            commands,
            next_id: AtomicI32::new(1),
            closed: AtomicBool::new(false),
            driver: Some(driver),
        })
    }

    /// Sends `op` under a fresh message ID and returns the handle that
    /// receives every response to it.
    pub(crate) fn send(&self, op: ProtocolOp, controls: Vec<Control>) -> Result<OpHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = LdapMessage::with_controls(id, op, controls).encode();
        let (reply, responses) = mpsc::unbounded_channel();
        self.commands
            .send(DriverCommand::Send { id, frame, reply })
            .map_err(|_| Error::SessionClosed)?;
        Ok(OpHandle {
            id,
            responses,
            commands: self.commands.clone(),
            finished: false,
        })
    }

    /// Tells the driver to stop, optionally sending an UnbindRequest first.
    /// Idempotent; later calls and the `Drop` impl are no-ops.
    pub(crate) fn shutdown(&self, unbind: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if unbind {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let frame = LdapMessage::new(id, ProtocolOp::UnbindRequest).encode();
            let _ = self.commands.send(DriverCommand::Notify { frame });
        }
        let _ = self.commands.send(DriverCommand::Close);
    }

    /// Shuts down with an unbind and waits for the driver to finish its
    /// final writes.
    pub(crate) async fn close(mut self) {
        self.shutdown(true);
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

/// Receives the responses routed to one message ID.
pub(crate) struct OpHandle {
    id: i32,
    responses: mpsc::UnboundedReceiver<Result<LdapMessage>>,
    commands: mpsc::UnboundedSender<DriverCommand>,
    finished: bool,
}

impl OpHandle {
    /// Next response for this operation. [`Error::SessionClosed`] when the
    /// driver has gone away.
    pub(crate) async fn recv(&mut self) -> Result<LdapMessage> {
        match self.responses.recv().await {
            Some(Ok(message)) => {
                if message.op.is_terminal() {
                    self.finished = true;
                }
                Ok(message)
            }
            Some(Err(err)) => {
                self.finished = true;
                Err(err)
            }
            None => {
                self.finished = true;
                Err(Error::SessionClosed)
            }
        }
    }
}

impl Drop for OpHandle {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.commands.send(DriverCommand::Unregister { id: self.id });
        }
    }
}

async fn drive(socket: TcpStream, mut commands: mpsc::UnboundedReceiver<DriverCommand>) {
    let (mut reader, mut writer) = socket.into_split();
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut pending = Pending::new();

    let failure = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DriverCommand::Send { id, frame, reply }) => {
                    pending.insert(id, reply);
                    if let Err(err) = writer.write_all(&frame).await {
                        break Some(Error::Connection(format!("write failed: {err}")));
                    }
                }
                Some(DriverCommand::Notify { frame }) => {
                    if let Err(err) = writer.write_all(&frame).await {
                        break Some(Error::Connection(format!("write failed: {err}")));
                    }
                }
                Some(DriverCommand::Unregister { id }) => {
                    pending.remove(&id);
                }
                Some(DriverCommand::Close) | None => break None,
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break Some(Error::SessionClosed),
                Ok(_) => {
                    if let Err(err) = dispatch(&mut buf, &mut pending) {
                        break Some(err);
                    }
                }
                Err(err) => break Some(Error::Connection(format!("read failed: {err}"))),
            },
        }
    };

    if let Some(err) = failure {
        warn!(error = %err, "connection driver stopped");
        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
    finish(reader, writer).await;
}

/// Sends a FIN and drops both halves.
async fn finish(reader: OwnedReadHalf, mut writer: OwnedWriteHalf) {
    let _ = writer.shutdown().await;
    drop(reader);
}

/// Decodes and routes every complete frame buffered so far.
fn dispatch(buf: &mut BytesMut, pending: &mut Pending) -> Result<()> {
    loop {
        let frame = match frame_len(buf)? {
            Some(len) if buf.len() >= len => buf.split_to(len),
            _ => return Ok(()),
        };
        let message = LdapMessage::decode(&frame)?;
        route(message, pending)?;
    }
}

/// Routes one message to the channel registered for its ID.
fn route(message: LdapMessage, pending: &mut Pending) -> Result<()> {
    if message.id == UNSOLICITED_ID {
        if let ProtocolOp::ExtendedResponse(ref response) = message.op {
            if response.is_disconnection_notice() {
                warn!(
                    code = %response.result.code,
                    message = %response.result.message,
                    "server sent a disconnection notice"
                );
                return Err(Error::SessionClosed);
            }
        }
        debug!(op = message.op.name(), "ignoring unsolicited notification");
        return Ok(());
    }

    let id = message.id;
    let terminal = message.op.is_terminal();
    let delivered = match pending.get(&id) {
        Some(reply) => reply.send(Ok(message)).is_ok(),
        None => {
            debug!(id, op = message.op.name(), "dropping response for unknown message ID");
            return Ok(());
        }
    };
    if terminal || !delivered {
        pending.remove(&id);
    }
    Ok(())
}
